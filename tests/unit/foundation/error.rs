use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReelError::invalid_input("x")
            .to_string()
            .contains("invalid input:")
    );
    assert!(
        ReelError::decode("x")
            .to_string()
            .contains("decode failure:")
    );
    assert!(
        ReelError::protocol("x")
            .to_string()
            .contains("encoder protocol violation:")
    );
    assert!(
        ReelError::fault("x")
            .to_string()
            .contains("encoder/muxer fault:")
    );
}

#[test]
fn kinds_map_to_stable_codes() {
    assert_eq!(ReelError::invalid_input("x").kind().code(), "INVALID_INPUT");
    assert_eq!(ReelError::decode("x").kind().code(), "DECODE_FAILURE");
    assert_eq!(
        ReelError::protocol("x").kind().code(),
        "ENCODER_PROTOCOL_VIOLATION"
    );
    assert_eq!(ReelError::fault("x").kind().code(), "ENCODER_OR_MUXER_FAULT");
}

#[test]
fn other_preserves_source_and_counts_as_fault() {
    let base = std::io::Error::other("boom");
    let err = ReelError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), ErrorKind::EncoderOrMuxerFault);
}

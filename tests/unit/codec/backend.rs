use super::*;

#[test]
fn encoder_format_takes_static_settings_from_config() {
    let cfg = EncoderConfig::default();
    let fmt = EncoderFormat::new(&cfg, Dimensions::new(100, 100), Fps::new(2).unwrap());
    assert_eq!(fmt.codec, CodecKind::H264);
    assert_eq!(fmt.bitrate, 2_000_000);
    assert_eq!(fmt.gop_frames, 1);
    assert_eq!(fmt.codec.mime(), "video/avc");
}

#[test]
fn input_buffer_fill_reuses_allocation() {
    let mut buf = InputBuffer::new(3, Vec::with_capacity(64));
    buf.fill(&[1, 2, 3]);
    assert_eq!(buf.data(), &[1, 2, 3]);
    buf.fill(&[9]);
    assert_eq!(buf.data(), &[9]);
    buf.clear();
    assert!(buf.data().is_empty());
    assert_eq!(buf.slot(), 3);
    assert!(buf.into_data().capacity() >= 64);
}

#[test]
fn output_buffer_size_tracks_payload() {
    let out = OutputBuffer::new(
        0,
        vec![0; 17],
        PresentationTime(500_000),
        BufferFlags {
            key_frame: true,
            end_of_stream: false,
        },
    );
    assert_eq!(out.info().size, 17);
    assert_eq!(out.info().pts, PresentationTime(500_000));
    assert!(out.info().flags.key_frame);
    assert!(!BufferFlags::NONE.end_of_stream);
    assert!(BufferFlags::END_OF_STREAM.end_of_stream);
}

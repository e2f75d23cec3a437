use super::*;

const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1f, 0xac, 0xd9];
const PPS: &[u8] = &[0x68, 0xeb, 0xe3, 0xcb];
// first_mb_in_slice == 0 (top bit set).
const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33];
const P_SLICE: &[u8] = &[0x41, 0x9a, 0x02, 0x04];

fn annexb(nals: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

#[test]
fn splitter_groups_parameter_sets_with_the_following_slice() {
    let stream = annexb(&[SPS, PPS, IDR, P_SLICE, SPS, PPS, IDR]);
    let mut splitter = AccessUnitSplitter::new();
    let mut units = splitter.push(&stream);
    units.extend(splitter.finish());

    assert_eq!(units.len(), 3);
    assert_eq!(units[0], annexb(&[SPS, PPS, IDR]));
    assert_eq!(units[1], annexb(&[P_SLICE]));
    assert_eq!(units[2], annexb(&[SPS, PPS, IDR]));
}

#[test]
fn splitter_handles_arbitrary_chunk_boundaries() {
    let stream = annexb(&[SPS, PPS, IDR, IDR, IDR]);
    for chunk in [1usize, 2, 3, 5, 7] {
        let mut splitter = AccessUnitSplitter::new();
        let mut units = Vec::new();
        for part in stream.chunks(chunk) {
            units.extend(splitter.push(part));
        }
        units.extend(splitter.finish());
        assert_eq!(units.len(), 3, "chunk={chunk}");
        assert_eq!(units[0], annexb(&[SPS, PPS, IDR]));
        assert_eq!(units[2], annexb(&[IDR]));
    }
}

#[test]
fn splitter_keeps_multi_slice_pictures_together() {
    // Second slice of the same picture: first_mb_in_slice != 0 (top bit clear).
    let second_slice: &[u8] = &[0x65, 0x40, 0x11];
    let stream = annexb(&[SPS, PPS, IDR, second_slice, IDR]);
    let mut splitter = AccessUnitSplitter::new();
    let mut units = splitter.push(&stream);
    units.extend(splitter.finish());
    assert_eq!(units.len(), 2);
    assert_eq!(units[0], annexb(&[SPS, PPS, IDR, second_slice]));
}

#[test]
fn splitter_finish_on_empty_stream_yields_nothing() {
    let mut splitter = AccessUnitSplitter::new();
    assert!(splitter.push(&[]).is_empty());
    assert!(splitter.finish().is_empty());
}

#[test]
fn splitter_drops_bytes_before_the_first_start_code() {
    let mut stream = vec![0xde, 0xad];
    stream.extend(annexb(&[SPS, PPS, IDR, P_SLICE]));
    let mut splitter = AccessUnitSplitter::new();
    let mut units = splitter.push(&stream);
    units.extend(splitter.finish());
    assert_eq!(units, vec![annexb(&[SPS, PPS, IDR]), annexb(&[P_SLICE])]);
}

#[test]
fn large_unit_is_scanned_once_across_reads() {
    let mut big_idr = vec![0x65, 0x88];
    big_idr.extend(std::iter::repeat_n(0x5a, 256 * 1024));
    let stream = annexb(&[SPS, PPS, &big_idr, P_SLICE]);

    let mut splitter = AccessUnitSplitter::new();
    let mut units = Vec::new();
    for part in stream.chunks(64 * 1024) {
        units.extend(splitter.push(part));
        // Completed NAL units are released and the search resumes near the end.
        assert!(splitter.scanned + 3 >= splitter.pending.len());
        assert_eq!(splitter.nal_start, Some(4));
    }
    units.extend(splitter.finish());

    assert_eq!(units.len(), 2);
    assert_eq!(units[0], annexb(&[SPS, PPS, &big_idr]));
    assert_eq!(units[1], annexb(&[P_SLICE]));
    assert!(splitter.pending.is_empty());
}

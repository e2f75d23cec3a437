//! Access-unit framing for H.264 Annex-B byte streams.
//!
//! Encoders writing to a pipe emit NAL units separated by start codes (`00 00 01` or
//! `00 00 00 01`) with no picture boundaries. The muxer wants one access unit (one picture)
//! per sample, so the stream is regrouped here. Parameter-set extraction and sample
//! conversion are left to `muxide`.

use muxide::codec::find_start_code;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

mod nal_type {
    pub const NON_IDR_SLICE: u8 = 1;
    pub const IDR_SLICE: u8 = 5;
    pub const SEI: u8 = 6;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
    pub const AUD: u8 = 9;
}

fn is_vcl(ty: u8) -> bool {
    ty == nal_type::NON_IDR_SLICE || ty == nal_type::IDR_SLICE
}

fn trim_trailing_zeros(nal: &[u8]) -> &[u8] {
    let end = nal.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &nal[..end]
}

/// Incremental splitter turning an Annex-B byte stream into access units.
///
/// Bytes arrive in arbitrary chunks (pipe reads). A NAL unit is only classified once the
/// next start code is seen, so the tail of the stream stays buffered until
/// [`AccessUnitSplitter::finish`]. Each byte is scanned for start codes once, no matter how
/// many reads a large NAL unit spans.
///
/// A new access unit starts, once the current one holds a slice, at an AUD/SPS/PPS/SEI unit
/// or at a slice whose `first_mb_in_slice` is zero.
#[derive(Debug, Default)]
pub struct AccessUnitSplitter {
    pending: Vec<u8>,
    /// Payload offset in `pending` of the NAL unit being collected.
    nal_start: Option<usize>,
    /// Offset in `pending` where the next start-code search resumes.
    scanned: usize,
    current: Vec<u8>,
    current_has_vcl: bool,
}

impl AccessUnitSplitter {
    /// Create an empty splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every access unit completed by them, in stream order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);
        let mut out = Vec::new();

        let mut consumed = 0;
        while let Some((pos, len)) = find_start_code(&data, self.scanned) {
            if let Some(start) = self.nal_start {
                self.accept_nal(&data[start..pos], &mut out);
            }
            consumed = pos;
            self.nal_start = Some(pos + len);
            self.scanned = pos + len;
        }
        // A start code may straddle two reads.
        self.scanned = self.scanned.max(data.len().saturating_sub(3));

        if consumed > 0 {
            data.drain(..consumed);
            self.scanned -= consumed;
            self.nal_start = self.nal_start.map(|start| start - consumed);
        }
        self.pending = data;
        out
    }

    /// Flush the buffered tail at end of stream and return the remaining access units.
    pub fn finish(&mut self) -> Vec<Vec<u8>> {
        let data = std::mem::take(&mut self.pending);
        self.scanned = 0;
        let mut out = Vec::new();
        if let Some(start) = self.nal_start.take() {
            self.accept_nal(&data[start..], &mut out);
        }
        let tail = std::mem::take(&mut self.current);
        self.current_has_vcl = false;
        if !tail.is_empty() {
            out.push(tail);
        }
        out
    }

    fn accept_nal(&mut self, nal: &[u8], out: &mut Vec<Vec<u8>>) {
        let nal = trim_trailing_zeros(nal);
        let Some(&header) = nal.first() else {
            return;
        };

        let ty = header & 0x1f;
        let starts_new = self.current_has_vcl
            && match ty {
                nal_type::AUD | nal_type::SPS | nal_type::PPS | nal_type::SEI | 14..=18 => true,
                t if is_vcl(t) => first_mb_in_slice_is_zero(nal),
                _ => false,
            };
        if starts_new {
            out.push(std::mem::take(&mut self.current));
            self.current_has_vcl = false;
        }

        self.current.extend_from_slice(&START_CODE);
        self.current.extend_from_slice(nal);
        if is_vcl(ty) {
            self.current_has_vcl = true;
        }
    }
}

/// `first_mb_in_slice` is the first ue(v) of the slice header; its value is zero exactly
/// when the first bit is set.
fn first_mb_in_slice_is_zero(nal: &[u8]) -> bool {
    nal.get(1).is_some_and(|b| b & 0x80 != 0)
}

#[cfg(test)]
#[path = "../../tests/unit/codec/annexb.rs"]
mod tests;

//! H.264 encoding: the buffer-exchange encoder seam and its `ffmpeg` implementation.

/// Access-unit framing of Annex-B byte streams.
pub mod annexb;
/// Encoder backend trait and buffer/event types.
pub mod backend;
/// `ffmpeg`-process encoder backend.
pub mod ffmpeg;

use std::time::Duration;

use crate::config::EncoderConfig;
use crate::foundation::core::{Dimensions, Fps, PresentationTime};
use crate::foundation::error::ReelResult;

pub use muxide::codec::h264::AvcConfig;

/// Compressed video codecs the pipeline can drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// H.264 / AVC.
    #[default]
    H264,
}

impl CodecKind {
    /// MIME type of the elementary stream.
    pub fn mime(self) -> &'static str {
        match self {
            CodecKind::H264 => "video/avc",
        }
    }
}

/// Encoder configuration handed to [`EncoderBackend::configure`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderFormat {
    /// Codec to produce.
    pub codec: CodecKind,
    /// Input (and output) resolution.
    pub dimensions: Dimensions,
    /// Target average bitrate in bits per second.
    pub bitrate: u32,
    /// Nominal frame rate.
    pub fps: Fps,
    /// Maximum distance between key frames, in frames.
    pub gop_frames: u32,
}

impl EncoderFormat {
    /// Build the format for one run from the static encoder settings.
    pub fn new(cfg: &EncoderConfig, dimensions: Dimensions, fps: Fps) -> Self {
        Self {
            codec: cfg.codec,
            dimensions,
            bitrate: cfg.bitrate,
            fps,
            gop_frames: cfg.gop_frames(fps),
        }
    }
}

/// Negotiated output format reported once the encoder knows its parameter sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    /// Codec of the elementary stream.
    pub codec: CodecKind,
    /// Coded resolution.
    pub dimensions: Dimensions,
    /// SPS/PPS needed by the container.
    pub avc: AvcConfig,
}

/// How long a dequeue call may wait for a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Return at once.
    Immediate,
    /// Wait at most this long.
    Bounded(Duration),
    /// Wait until a buffer shows up.
    Forever,
}

/// Per-buffer flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// The buffer holds a key frame.
    pub key_frame: bool,
    /// Last buffer of the stream.
    pub end_of_stream: bool,
}

impl BufferFlags {
    /// Flags of a plain frame.
    pub const NONE: Self = Self {
        key_frame: false,
        end_of_stream: false,
    };

    /// Flags of the end-of-stream marker.
    pub const END_OF_STREAM: Self = Self {
        key_frame: false,
        end_of_stream: true,
    };
}

/// Timing and flags attached to an output buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    /// Presentation timestamp of the sample.
    pub pts: PresentationTime,
    /// Payload size in bytes.
    pub size: usize,
    /// Key frame / end-of-stream flags.
    pub flags: BufferFlags,
}

/// An input buffer owned by the caller between dequeue and queue.
#[derive(Debug)]
pub struct InputBuffer {
    slot: usize,
    data: Vec<u8>,
}

impl InputBuffer {
    /// Wrap a pooled allocation belonging to `slot`.
    pub fn new(slot: usize, data: Vec<u8>) -> Self {
        Self { slot, data }
    }

    /// Pool slot of this buffer.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Replace the contents with `bytes`, reusing the allocation.
    pub fn fill(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
    }

    /// Clear the contents (zero-length buffer).
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Current contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Give back the allocation.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// An encoded buffer handed out by the encoder; must be released after use.
#[derive(Debug)]
pub struct OutputBuffer {
    slot: usize,
    data: Vec<u8>,
    info: BufferInfo,
}

impl OutputBuffer {
    /// Build an output buffer. `info.size` is taken from `data`.
    pub fn new(slot: usize, data: Vec<u8>, pts: PresentationTime, flags: BufferFlags) -> Self {
        let info = BufferInfo {
            pts,
            size: data.len(),
            flags,
        };
        Self { slot, data, info }
    }

    /// Pool slot of this buffer.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Encoded payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Timing and flags.
    pub fn info(&self) -> &BufferInfo {
        &self.info
    }
}

/// Result of one output dequeue.
#[derive(Debug)]
pub enum OutputEvent {
    /// The encoder negotiated (or renegotiated) its output format.
    FormatChanged(OutputFormat),
    /// An encoded buffer is ready.
    Buffer(OutputBuffer),
    /// Nothing became available within the wait.
    TryAgainLater,
}

/// Platform video encoder with an asynchronous buffer-exchange protocol.
///
/// Call order: `configure`, `start`, any number of input/output exchanges, `stop`, `release`.
/// Input buffers are dequeued, filled and queued back with a timestamp; output events are
/// polled and every [`OutputBuffer`] is handed back with `release_output_buffer`.
/// `release` must tolerate being called in any state and more than once.
pub trait EncoderBackend {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Apply the stream configuration.
    fn configure(&mut self, format: &EncoderFormat) -> ReelResult<()>;

    /// Begin accepting input.
    fn start(&mut self) -> ReelResult<()>;

    /// Acquire a free input buffer. `Ok(None)` means none became free within `wait`.
    fn dequeue_input_buffer(&mut self, wait: Wait) -> ReelResult<Option<InputBuffer>>;

    /// Submit a filled input buffer.
    fn queue_input_buffer(
        &mut self,
        buffer: InputBuffer,
        pts: PresentationTime,
        flags: BufferFlags,
    ) -> ReelResult<()>;

    /// Poll for the next output event.
    fn dequeue_output_buffer(&mut self, wait: Wait) -> ReelResult<OutputEvent>;

    /// Return an output buffer to the encoder.
    fn release_output_buffer(&mut self, buffer: OutputBuffer) -> ReelResult<()>;

    /// Halt encoding and surface any failure the encoder hit on its own.
    fn stop(&mut self) -> ReelResult<()>;

    /// Free every resource. Infallible and idempotent.
    fn release(&mut self);
}

#[cfg(test)]
#[path = "../../tests/unit/codec/backend.rs"]
mod tests;

//! framereel turns an ordered list of still images into an H.264 MP4.
//!
//! Each image is decoded, converted to NV12 and pushed through a hardware-style encoder
//! driven by a buffer-exchange protocol; encoded access units are muxed into a single-track
//! MP4. Frame `i` of the input list is shown at `i * (1_000_000 / fps)` microseconds, and
//! images that fail to decode leave a gap instead of shifting later frames.
//!
//! - Build a [`ConversionRequest`] and a [`PipelineConfig`]
//! - Call [`convert_images_to_video`] (system `ffmpeg` encoder) or [`convert_with_backend`]
//! - Inspect the returned [`ConversionReport`] or the categorised [`ReelError`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Encoder seam, access-unit framing and the `ffmpeg` backend.
pub mod codec;
/// Pipeline and encoder settings.
pub mod config;
/// Pixel format conversion.
pub mod convert;
/// Encoder lifecycle driver.
pub mod encoder;
/// MP4 container output via `muxide`.
pub mod mux;
/// End-to-end conversion.
pub mod pipeline;
/// Input image decoding.
pub mod source;

pub use crate::foundation::core::{Dimensions, Fps, FrameIndex, MICROS_PER_SEC, PresentationTime};
pub use crate::foundation::error::{ErrorKind, ReelError, ReelResult};

pub use crate::codec::backend::{
    BufferFlags, BufferInfo, CodecKind, EncoderBackend, EncoderFormat, InputBuffer, OutputBuffer,
    OutputEvent, OutputFormat, Wait,
};
pub use crate::codec::ffmpeg::{FfmpegBackend, is_ffmpeg_on_path};
pub use crate::config::{DEFAULT_FPS, EncoderConfig, PipelineConfig};
pub use crate::convert::yuv::{PixelLayout, nv12_len, rgb_to_nv12};
pub use crate::encoder::driver::{DrainMode, DrainStats, EncoderDriver, EncoderState, PollMode};
pub use crate::mux::sink::{MuxerSink, TrackIndex};
pub use crate::pipeline::{
    ConversionReport, ConversionRequest, convert_images_to_video, convert_with_backend,
};
pub use crate::source::frames::{Frame, FrameSource, SourceEvent};

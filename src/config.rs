use std::path::{Path, PathBuf};

use crate::codec::backend::CodecKind;
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

/// Frame rate used when the caller does not pick one.
pub const DEFAULT_FPS: u32 = 2;

/// Static encoder settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    /// Output codec.
    pub codec: CodecKind,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Seconds between key frames.
    pub i_frame_interval_secs: u32,
    /// Force every frame to be a key frame.
    ///
    /// With the default `i_frame_interval_secs` of 1 and the default 2 fps, most frames
    /// already are; this makes it exact for any rate.
    pub key_frame_every_frame: bool,
    /// `ffmpeg` executable (name on `PATH` or absolute path).
    pub ffmpeg_path: PathBuf,
    /// `ffmpeg` encoder name (`libx264`, `h264_nvenc`, `h264_vaapi`, `h264_videotoolbox`, ...).
    pub ffmpeg_encoder: String,
    /// Number of input buffers circulating between the driver and the encoder.
    pub input_buffer_count: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: CodecKind::H264,
            bitrate: 2_000_000,
            i_frame_interval_secs: 1,
            key_frame_every_frame: true,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffmpeg_encoder: "libx264".to_owned(),
            input_buffer_count: 4,
        }
    }
}

impl EncoderConfig {
    /// Key frame distance in frames for `fps`.
    pub fn gop_frames(&self, fps: Fps) -> u32 {
        if self.key_frame_every_frame {
            return 1;
        }
        fps.get().saturating_mul(self.i_frame_interval_secs).max(1)
    }

    /// Reject settings no encoder can honour.
    pub fn validate(&self) -> ReelResult<()> {
        if self.bitrate == 0 {
            return Err(ReelError::invalid_input("encoder bitrate must be > 0"));
        }
        if self.input_buffer_count == 0 {
            return Err(ReelError::invalid_input(
                "encoder input_buffer_count must be > 0",
            ));
        }
        if self.ffmpeg_encoder.trim().is_empty() {
            return Err(ReelError::invalid_input(
                "encoder ffmpeg_encoder must not be empty",
            ));
        }
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(ReelError::invalid_input(
                "encoder ffmpeg_path must not be empty",
            ));
        }
        Ok(())
    }
}

/// Settings for one conversion run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Encoder settings.
    pub encoder: EncoderConfig,
    /// Frame rate used when a request does not carry one.
    pub default_fps: u32,
    /// Poll interval of the final blocking drain, in milliseconds.
    pub drain_poll_interval_ms: u64,
    /// Give up on the final drain after this many milliseconds without end-of-stream.
    pub drain_deadline_ms: u64,
    /// Replace an existing output file.
    pub overwrite: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            default_fps: DEFAULT_FPS,
            drain_poll_interval_ms: 10,
            drain_deadline_ms: 30_000,
            overwrite: true,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn from_json_file(path: &Path) -> ReelResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            ReelError::invalid_input(format!("config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> ReelResult<()> {
        self.encoder.validate()?;
        Fps::new(self.default_fps)?;
        if self.drain_poll_interval_ms == 0 {
            return Err(ReelError::invalid_input(
                "drain_poll_interval_ms must be > 0",
            ));
        }
        if self.drain_deadline_ms < self.drain_poll_interval_ms {
            return Err(ReelError::invalid_input(
                "drain_deadline_ms must be >= drain_poll_interval_ms",
            ));
        }
        Ok(())
    }

    /// Frame rate for a request: the explicit value if any, else `default_fps`.
    pub fn resolve_fps(&self, requested: Option<u32>) -> ReelResult<Fps> {
        Fps::new(requested.unwrap_or(self.default_fps))
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;

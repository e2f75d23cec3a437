use crate::foundation::error::{ReelError, ReelResult};

/// Microseconds per second; the unit of every presentation timestamp.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// 0-based position of a frame in the caller's input list.
///
/// Skipped frames keep their slot: the index is never re-packed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Integer frames-per-second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps(u32);

impl Fps {
    /// Create a validated FPS value.
    ///
    /// The frame duration must stay at least one microsecond, otherwise consecutive
    /// timestamps would collide.
    pub fn new(fps: u32) -> ReelResult<Self> {
        if fps == 0 {
            return Err(ReelError::invalid_input("fps must be > 0"));
        }
        if u64::from(fps) > MICROS_PER_SEC {
            return Err(ReelError::invalid_input(format!(
                "fps must be <= {MICROS_PER_SEC}, got {fps}"
            )));
        }
        Ok(Self(fps))
    }

    /// Raw frames-per-second value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Spacing between two consecutive frame slots, truncated to whole microseconds.
    pub fn frame_duration_us(self) -> u64 {
        MICROS_PER_SEC / u64::from(self.0)
    }
}

impl std::fmt::Display for Fps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presentation timestamp in microseconds.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
    serde::Deserialize,
)]
pub struct PresentationTime(pub u64);

impl PresentationTime {
    /// Timestamp of the frame slot `index`: `index * (1_000_000 / fps)`.
    pub fn for_index(index: FrameIndex, fps: Fps) -> Self {
        Self(index.0.saturating_mul(fps.frame_duration_us()))
    }

    /// Value in microseconds.
    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Value in seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_SEC as f64
    }
}

/// Frame size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Build a dimensions value (unvalidated).
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of an NV12 (4:2:0) buffer of this size.
    pub fn nv12_len(self) -> usize {
        crate::convert::yuv::nv12_len(self.width, self.height)
    }

    /// Check that a 4:2:0 encoder can accept this size.
    pub fn validate_for_encoding(self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::invalid_input(
                "frame width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(ReelError::invalid_input(format!(
                "frame width/height must be even for 4:2:0 output, got {self}"
            )));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(ReelError::invalid_input(format!(
                "frame {self} exceeds the container's 16-bit size fields"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;

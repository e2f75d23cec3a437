use std::path::{Path, PathBuf};

use crate::convert::yuv::{PixelLayout, rgb_to_nv12};
use crate::foundation::core::{Dimensions, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};

/// One decoded input image, tagged with its slot in the input list.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Position of the source path in the caller's list.
    pub index: FrameIndex,
    /// Decoded size.
    pub dimensions: Dimensions,
    /// Interleaved RGB8 pixels, row-major, no padding.
    pub rgb: Vec<u8>,
}

impl Frame {
    /// Convert to NV12, consuming the decoded bitmap so it is freed right away.
    pub fn into_nv12(self) -> Vec<u8> {
        rgb_to_nv12(
            &self.rgb,
            PixelLayout::Rgb8,
            self.dimensions.width,
            self.dimensions.height,
        )
    }
}

/// Decode a single image file into an RGB8 [`Frame`].
///
/// The format is sniffed from the file contents; the extension is ignored.
pub fn decode_frame(path: &Path, index: FrameIndex) -> ReelResult<Frame> {
    let bytes = std::fs::read(path)
        .map_err(|e| ReelError::decode(format!("'{}': {e}", path.display())))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| ReelError::decode(format!("'{}': {e}", path.display())))?;
    let rgb = img.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame {
        index,
        dimensions: Dimensions::new(width, height),
        rgb: rgb.into_raw(),
    })
}

/// Outcome of pulling the next slot from a [`FrameSource`].
#[derive(Debug)]
pub enum SourceEvent {
    /// The image decoded.
    Decoded(Frame),
    /// The image could not be decoded; the slot stays empty.
    Skipped {
        /// Slot of the failed image.
        index: FrameIndex,
        /// Path that failed.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },
}

/// Decodes input images lazily, one slot at a time, in list order.
///
/// The first decoded image fixes the run's resolution. Later images are not checked against
/// it; feeding an encoder frames of another size is undefined.
#[derive(Debug)]
pub struct FrameSource<'a> {
    paths: &'a [PathBuf],
    cursor: usize,
    resolution: Option<Dimensions>,
}

impl<'a> FrameSource<'a> {
    /// Create a source over `paths`.
    pub fn new(paths: &'a [PathBuf]) -> Self {
        Self {
            paths,
            cursor: 0,
            resolution: None,
        }
    }

    /// Number of slots (decodable or not).
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Return `true` when there are no slots.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolution fixed by the first decoded frame, if any frame decoded yet.
    pub fn resolution(&self) -> Option<Dimensions> {
        self.resolution
    }

    /// Decode the next slot. Returns `None` once every path has been visited.
    pub fn next_frame(&mut self) -> Option<SourceEvent> {
        let path = self.paths.get(self.cursor)?;
        let index = FrameIndex(self.cursor as u64);
        self.cursor += 1;

        match decode_frame(path, index) {
            Ok(frame) => {
                if self.resolution.is_none() {
                    tracing::info!(dimensions = %frame.dimensions, "video dimensions");
                    self.resolution = Some(frame.dimensions);
                }
                Some(SourceEvent::Decoded(frame))
            }
            Err(err) => {
                tracing::warn!(
                    index = index.0,
                    path = %path.display(),
                    error = %err,
                    "failed to load image, skipping frame"
                );
                Some(SourceEvent::Skipped {
                    index,
                    path: path.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }
}

impl Iterator for FrameSource<'_> {
    type Item = SourceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/frames.rs"]
mod tests;

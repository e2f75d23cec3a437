//! Pixel conversion from decoded bitmaps into encoder input layouts.

/// RGB(A) to NV12 (4:2:0, interleaved chroma) conversion.
pub mod yuv;

/// Interleaved 8-bit input layouts accepted by the converter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// `R G B` per pixel.
    Rgb8,
    /// `R G B A` per pixel; alpha is ignored.
    Rgba8,
}

impl PixelLayout {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb8 => 3,
            PixelLayout::Rgba8 => 4,
        }
    }
}

/// Byte length of an NV12 buffer: full-resolution luma plus half as many chroma bytes.
pub fn nv12_len(width: u32, height: u32) -> usize {
    (width as usize * height as usize) * 3 / 2
}

/// Convert interleaved RGB(A) pixels into a freshly allocated NV12 buffer.
///
/// See [`rgb_to_nv12_into`] for the layout.
pub fn rgb_to_nv12(pixels: &[u8], layout: PixelLayout, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0u8; nv12_len(width, height)];
    rgb_to_nv12_into(&mut out, pixels, layout, width, height);
    out
}

/// Convert interleaved RGB(A) pixels into `dst` as NV12.
///
/// Layout: `width*height` luma bytes, then one `U,V` pair per 2x2 block taken from the pixel
/// at the block's even row / even column, in row-major order. Broadcast-range integer
/// coefficients (BT.601); results are stored with 8-bit truncation and no extra clamping.
///
/// `dst` must be [`nv12_len`] bytes. With odd dimensions the chroma pairs that do not fit are
/// dropped, so the output length never changes.
pub fn rgb_to_nv12_into(
    dst: &mut [u8],
    pixels: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
) {
    let width = width as usize;
    let height = height as usize;
    let bpp = layout.bytes_per_pixel();
    debug_assert_eq!(dst.len(), nv12_len(width as u32, height as u32));
    debug_assert!(pixels.len() >= width * height * bpp);

    if width == 0 || height == 0 {
        return;
    }

    let (y_plane, uv_plane) = dst.split_at_mut(width * height);
    let mut uv = 0usize;

    for (j, row) in pixels.chunks_exact(width * bpp).take(height).enumerate() {
        let y_row = &mut y_plane[j * width..(j + 1) * width];
        for (i, px) in row.chunks_exact(bpp).enumerate() {
            let r = i32::from(px[0]);
            let g = i32::from(px[1]);
            let b = i32::from(px[2]);

            y_row[i] = luma(r, g, b);

            if j % 2 == 0 && i % 2 == 0 && uv + 1 < uv_plane.len() {
                uv_plane[uv] = chroma_u(r, g, b);
                uv_plane[uv + 1] = chroma_v(r, g, b);
                uv += 2;
            }
        }
    }
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/convert/yuv.rs"]
mod tests;

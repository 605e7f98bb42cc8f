//! Conversions between `image::GrayImage` and core matrices.

use image::GrayImage;
use stmd_core::Matrix;

/// Convert an 8-bit grayscale image into a `[0, 1]`-normalized frame.
pub fn frame_from_gray(img: &GrayImage) -> Matrix {
    let data = img.as_raw().iter().map(|&p| f32::from(p) / 255.0).collect();
    Matrix {
        w: img.width() as usize,
        h: img.height() as usize,
        data,
    }
}

/// Render a response map as an 8-bit image, scaled by the map maximum.
/// Useful for eyeballing pipeline output; an all-zero map renders black.
pub fn response_to_gray(m: &Matrix) -> GrayImage {
    let max = m.max_value();
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    let data = m
        .data
        .iter()
        .map(|&v| (v.max(0.0) * scale).round().min(255.0) as u8)
        .collect();
    GrayImage::from_vec(m.w as u32, m.h as u32, data).expect("matching buffer size")
}

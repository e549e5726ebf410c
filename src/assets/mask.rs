//! Decode and circular masking

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::{TextureError, MAX_SOURCE_SIDE};

/// Decode image bytes to RGBA, downscaling so neither side exceeds
/// `MAX_SOURCE_SIDE`
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, TextureError> {
    let img = image::load_from_memory(bytes).map_err(|e| TextureError::Decode(e.to_string()))?;
    let img = if img.width() > MAX_SOURCE_SIDE || img.height() > MAX_SOURCE_SIDE {
        img.resize(MAX_SOURCE_SIDE, MAX_SOURCE_SIDE, FilterType::Triangle)
    } else {
        img
    };
    Ok(img.to_rgba8())
}

/// Center-crop to a square, scale to `size` and cut out a circle.
/// Edge pixels get partial alpha.
pub fn circular_cover(src: &RgbaImage, size: u32) -> RgbaImage {
    let size = size.max(1);
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    }

    let side = w.min(h);
    let square = imageops::crop_imm(src, (w - side) / 2, (h - side) / 2, side, side).to_image();
    let mut out = if side == size {
        square
    } else {
        imageops::resize(&square, size, size, FilterType::Triangle)
    };

    let r = size as f32 * 0.5;
    for (x, y, px) in out.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - r;
        let dy = y as f32 + 0.5 - r;
        let coverage = (r - (dx * dx + dy * dy).sqrt() + 0.5).clamp(0.0, 1.0);
        px.0[3] = (px.0[3] as f32 * coverage).round() as u8;
    }
    out
}

#[cfg(test)]
pub(crate) fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

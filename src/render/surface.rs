//! Software RGBA pixel surface
//!
//! Row-major, 4 bytes per pixel in R, G, B, A order. Every primitive clips
//! against the surface and alpha-blends over what is already there.

use std::path::Path;

use image::RgbaImage;

use super::RenderError;

/// Straight-alpha RGBA color
pub type Color = [u8; 4];

/// Blend one channel; (x + 1 + (x >> 8)) >> 8 approximates x / 255
#[inline]
fn blend_channel(src: u8, dst: u8, alpha: u16) -> u8 {
    let result = src as u16 * alpha + dst as u16 * (255 - alpha);
    ((result + 1 + (result >> 8)) >> 8) as u8
}

pub struct PixelSurface {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            pixels: vec![0; (width * height * 4) as usize],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    pub fn clear(&mut self, color: Color) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Option<Color> {
        let i = self.offset(x, y)?;
        Some([self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]])
    }

    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Color) {
        let Some(i) = self.offset(x, y) else {
            return;
        };
        let a = color[3] as u16;
        if a == 0 {
            return;
        }
        let dst = &mut self.pixels[i..i + 4];
        if a == 255 {
            dst.copy_from_slice(&color);
            return;
        }
        dst[0] = blend_channel(color[0], dst[0], a);
        dst[1] = blend_channel(color[1], dst[1], a);
        dst[2] = blend_channel(color[2], dst[2], a);
        dst[3] = dst[3].max(color[3]);
    }

    /// Blended horizontal span, inclusive
    pub fn hline(&mut self, x1: i32, x2: i32, y: i32, color: Color) {
        if y < 0 || y >= self.height as i32 {
            return;
        }
        let (x1, x2) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let x1 = x1.max(0);
        let x2 = x2.min(self.width as i32 - 1);
        for x in x1..=x2 {
            self.blend_pixel(x, y, color);
        }
    }

    /// Filled disc by horizontal spans
    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        if radius <= 0.0 {
            return;
        }
        let top = (cy - radius).floor() as i32;
        let bottom = (cy + radius).ceil() as i32;
        for y in top..=bottom {
            let dy = y as f32 + 0.5 - cy;
            let span = radius * radius - dy * dy;
            if span < 0.0 {
                continue;
            }
            let half = span.sqrt();
            self.hline((cx - half).round() as i32, (cx + half).round() as i32 - 1, y, color);
        }
    }

    /// Ring between `radius - thickness` and `radius`
    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, thickness: f32, color: Color) {
        if radius <= 0.0 || thickness <= 0.0 {
            return;
        }
        let inner = (radius - thickness).max(0.0);
        let top = (cy - radius).floor() as i32;
        let bottom = (cy + radius).ceil() as i32;
        for y in top..=bottom {
            let dy = y as f32 + 0.5 - cy;
            let outer_span = radius * radius - dy * dy;
            if outer_span < 0.0 {
                continue;
            }
            let outer = outer_span.sqrt();
            let left = (cx - outer).round() as i32;
            let right = (cx + outer).round() as i32 - 1;

            let inner_span = inner * inner - dy * dy;
            if inner_span <= 0.0 {
                self.hline(left, right, y, color);
                continue;
            }
            let hole = inner_span.sqrt();
            self.hline(left, (cx - hole).round() as i32 - 1, y, color);
            self.hline((cx + hole).round() as i32, right, y, color);
        }
    }

    /// Scanline polygon fill
    pub fn fill_polygon(&mut self, vertices: &[(f32, f32)], color: Color) {
        if vertices.len() < 3 {
            return;
        }

        let mut min_y = f32::MAX;
        let mut max_y = f32::MIN;
        for (_, y) in vertices {
            min_y = min_y.min(*y);
            max_y = max_y.max(*y);
        }
        let min_y = (min_y as i32).max(0);
        let max_y = (max_y as i32).min(self.height as i32 - 1);

        let mut intersections = Vec::with_capacity(vertices.len());
        let n = vertices.len();
        for y in min_y..=max_y {
            intersections.clear();
            let yf = y as f32 + 0.5;
            for i in 0..n {
                let (x1, y1) = vertices[i];
                let (x2, y2) = vertices[(i + 1) % n];
                if (y1 <= yf && y2 > yf) || (y2 <= yf && y1 > yf) {
                    let x = x1 + (yf - y1) / (y2 - y1) * (x2 - x1);
                    intersections.push(x as i32);
                }
            }
            intersections.sort_unstable();
            for pair in intersections.chunks_exact(2) {
                self.hline(pair[0], pair[1], y, color);
            }
        }
    }

    /// Draw `texture` scaled into the disc of `radius` at (cx, cy), nearest
    /// sampling, multiplied by `alpha`
    pub fn draw_texture_circle(&mut self, texture: &RgbaImage, cx: f32, cy: f32, radius: f32, alpha: u8) {
        let (tw, th) = texture.dimensions();
        if radius <= 0.0 || tw == 0 || th == 0 {
            return;
        }
        let diameter = radius * 2.0;
        let left = (cx - radius).floor() as i32;
        let top = (cy - radius).floor() as i32;
        let right = (cx + radius).ceil() as i32;
        let bottom = (cy + radius).ceil() as i32;

        for y in top.max(0)..bottom.min(self.height as i32) {
            let v = (y as f32 + 0.5 - (cy - radius)) / diameter;
            if !(0.0..1.0).contains(&v) {
                continue;
            }
            let ty = ((v * th as f32) as u32).min(th - 1);
            for x in left.max(0)..right.min(self.width as i32) {
                let u = (x as f32 + 0.5 - (cx - radius)) / diameter;
                if !(0.0..1.0).contains(&u) {
                    continue;
                }
                let tx = ((u * tw as f32) as u32).min(tw - 1);
                let mut px = texture.get_pixel(tx, ty).0;
                px[3] = ((px[3] as u16 * alpha as u16) / 255) as u8;
                self.blend_pixel(x, y, px);
            }
        }
    }

    pub fn to_image(&self) -> Result<RgbaImage, RenderError> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or(RenderError::Buffer)
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        self.to_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| RenderError::Save {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Color = [255, 0, 0, 255];

    #[test]
    fn test_clear_and_get() {
        let mut s = PixelSurface::new(4, 4);
        s.clear([1, 2, 3, 255]);
        assert_eq!(s.get_pixel(3, 3), Some([1, 2, 3, 255]));
        assert_eq!(s.get_pixel(4, 0), None);
    }

    #[test]
    fn test_blend_half() {
        let mut s = PixelSurface::new(1, 1);
        s.clear([0, 0, 0, 255]);
        s.blend_pixel(0, 0, [255, 255, 255, 128]);
        let px = s.get_pixel(0, 0).unwrap();
        assert!((126..=130).contains(&px[0]));
    }

    #[test]
    fn test_fill_circle_clips() {
        let mut s = PixelSurface::new(20, 20);
        s.fill_circle(0.0, 0.0, 8.0, RED);
        assert_eq!(s.get_pixel(1, 1), Some(RED));
        assert_eq!(s.get_pixel(15, 15), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_ring_has_hole() {
        let mut s = PixelSurface::new(40, 40);
        s.stroke_circle(20.0, 20.0, 15.0, 3.0, RED);
        assert_eq!(s.get_pixel(20, 20), Some([0, 0, 0, 0]));
        assert_eq!(s.get_pixel(20, 6), Some(RED));
    }

    #[test]
    fn test_polygon_fill() {
        let mut s = PixelSurface::new(20, 20);
        s.fill_polygon(&[(0.0, 0.0), (19.0, 0.0), (10.0, 19.0)], RED);
        assert_eq!(s.get_pixel(10, 2), Some(RED));
        assert_eq!(s.get_pixel(1, 18), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_texture_circle_scales() {
        let tex = RgbaImage::from_pixel(16, 16, Rgba([0, 255, 0, 255]));
        let mut s = PixelSurface::new(100, 100);
        s.draw_texture_circle(&tex, 50.0, 50.0, 30.0, 255);
        assert_eq!(s.get_pixel(50, 50), Some([0, 255, 0, 255]));
        assert_eq!(s.get_pixel(50, 25), Some([0, 255, 0, 255]));
        assert_eq!(s.get_pixel(10, 10), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_png_roundtrip_to_disk() {
        let mut s = PixelSurface::new(8, 8);
        s.clear(RED);
        let path = std::env::temp_dir().join(format!("bubble-arena-{}.png", uuid::Uuid::new_v4()));
        s.save_png(&path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.get_pixel(3, 3).0, RED);
        std::fs::remove_file(&path).ok();
    }
}

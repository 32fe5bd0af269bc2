use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array2;

use crate::error::Result;

/// Convert a scalar image to 8-bit grey RGB, mapping `[vmin, vmax]` linearly
/// to `[0, 255]`. Row 0 of `data` becomes the bottom row of the image.
pub fn grey_image(data: &Array2<f64>, vmin: f64, vmax: f64) -> RgbImage {
    let (h, w) = data.dim();
    let span = if vmax > vmin { vmax - vmin } else { 1.0 };
    let mut img = RgbImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let v = data[[row, col]];
            let level = if v.is_finite() {
                (((v - vmin) / span).clamp(0.0, 1.0) * 255.0) as u8
            } else {
                0
            };
            img.put_pixel(col as u32, (h - 1 - row) as u32, Rgb([level, level, level]));
        }
    }
    img
}

/// Draw a one-pixel circle outline centered on a 0-based pixel position in
/// data coordinates (y up).
pub fn draw_circle(img: &mut RgbImage, cx: f64, cy: f64, radius: f64, color: Rgb<u8>) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let steps = ((2.0 * std::f64::consts::PI * radius).ceil() as usize).max(16) * 2;
    for i in 0..steps {
        let t = i as f64 / steps as f64 * 2.0 * std::f64::consts::PI;
        let x = (cx + radius * t.cos()).round() as i64;
        let y = (cy + radius * t.sin()).round() as i64;
        if x >= 0 && x < w && y >= 0 && y < h {
            img.put_pixel(x as u32, (h - 1 - y) as u32, color);
        }
    }
}

/// Place `right` to the right of `left`, top-aligned.
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let w = left.width() + right.width();
    let h = left.height().max(right.height());
    let mut out = RgbImage::new(w, h);
    for (x, y, p) in left.enumerate_pixels() {
        out.put_pixel(x, y, *p);
    }
    for (x, y, p) in right.enumerate_pixels() {
        out.put_pixel(left.width() + x, y, *p);
    }
    out
}

/// Save an RGB image as 8-bit PNG.
pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

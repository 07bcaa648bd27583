use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Asynchronously decode an image file using spawn_blocking.
///
/// Decoding is CPU-intensive for large images and would stall the runtime.
pub async fn load_image_async(path: impl AsRef<Path>) -> Result<DynamicImage> {
    let path: PathBuf = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::open(&path).with_context(|| format!("Failed to load image {}", path.display()))
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Asynchronously encode an image to PNG bytes using spawn_blocking.
pub async fn encode_png_async(img: DynamicImage) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let mut png_bytes = Vec::new();
        let mut cursor = Cursor::new(&mut png_bytes);
        img.write_to(&mut cursor, ImageFormat::Png)
            .context("Failed to encode image as PNG")?;
        Ok(png_bytes)
    })
    .await
    .context("Failed to spawn blocking task for PNG encoding")?
}

/// Copy out a tile of an RGB image.
pub fn crop_rgb(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> RgbImage {
    image::imageops::crop_imm(img, x, y, width, height).to_image()
}

/// Mean luminance (0-255, Rec. 601 weights) of the pixels inside `bbox`.
///
/// Returns `None` when the box does not overlap the image.
pub fn mean_luminance(img: &RgbaImage, bbox: [i32; 4]) -> Option<f32> {
    let (w, h) = img.dimensions();
    let x1 = bbox[0].clamp(0, w as i32) as u32;
    let y1 = bbox[1].clamp(0, h as i32) as u32;
    let x2 = bbox[2].clamp(0, w as i32) as u32;
    let y2 = bbox[3].clamp(0, h as i32) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let mut sum = 0.0f64;
    for y in y1..y2 {
        for x in x1..x2 {
            sum += luminance(img.get_pixel(x, y)) as f64;
        }
    }
    Some((sum / ((x2 - x1) as f64 * (y2 - y1) as f64)) as f32)
}

pub fn luminance(p: &Rgba<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

/// Convert to the RGB8 layout OCR engines expect.
pub fn to_rgb(img: &RgbaImage) -> RgbImage {
    let (w, h) = img.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y);
        Rgb([p[0], p[1], p[2]])
    })
}

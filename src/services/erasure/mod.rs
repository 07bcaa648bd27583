// Background reconstruction under detected text

#[cfg(feature = "opencv")]
mod cv;
mod inpaint;

use image::RgbaImage;
use ndarray::Array2;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::config::{ErasureConfig, InpaintMethod};
use crate::core::errors::{ErasureError, ErasureResult};
use crate::core::types::TextRegion;

/// Erased image plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct ErasureOutcome {
    pub image: RgbaImage,
    /// The solid-fill fallback was used instead of inpainting
    pub used_fallback: bool,
    pub masked_pixels: usize,
    /// Expanded, clamped boxes that make up the mask, in region order
    pub expanded: Vec<[i32; 4]>,
}

/// Union of expanded region boxes, indexed `[y, x]`.
struct ErasureMask {
    bits: Array2<bool>,
    boxes: Vec<[i32; 4]>,
    count: usize,
}

impl ErasureMask {
    fn build(width: u32, height: u32, regions: &[TextRegion], margin: f32) -> Self {
        let mut bits = Array2::from_elem((height as usize, width as usize), false);
        let mut boxes = Vec::with_capacity(regions.len());

        for region in regions {
            let Some(b) = expand_box(region.geometry.bbox(), margin, width, height) else {
                continue;
            };
            for y in b[1]..b[3] {
                for x in b[0]..b[2] {
                    bits[[y as usize, x as usize]] = true;
                }
            }
            boxes.push(b);
        }

        let count = bits.iter().filter(|&&m| m).count();
        Self { bits, boxes, count }
    }
}

/// Grow `bbox` by `margin` of its width (horizontally) and height
/// (vertically) on every side, clamped to the image. `None` if nothing of
/// the box is left inside the image.
pub fn expand_box(bbox: [i32; 4], margin: f32, width: u32, height: u32) -> Option<[i32; 4]> {
    let [x1, y1, x2, y2] = bbox;
    let dx = ((x2 - x1).max(0) as f32 * margin).ceil() as i32;
    let dy = ((y2 - y1).max(0) as f32 * margin).ceil() as i32;

    let expanded = [
        (x1 - dx).clamp(0, width as i32),
        (y1 - dy).clamp(0, height as i32),
        (x2 + dx).clamp(0, width as i32),
        (y2 + dy).clamp(0, height as i32),
    ];
    (expanded[2] > expanded[0] && expanded[3] > expanded[1]).then_some(expanded)
}

/// Replaces text pixels with reconstructed background.
///
/// One mask covers the union of all expanded regions and is inpainted in a
/// single pass. Pixels outside the mask are never written.
#[derive(Debug, Clone)]
pub struct RegionEraser {
    config: ErasureConfig,
}

impl RegionEraser {
    pub fn new(config: ErasureConfig) -> Self {
        Self { config }
    }

    pub fn method(&self) -> InpaintMethod {
        self.config.method
    }

    pub fn erase(&self, image: &RgbaImage, regions: &[TextRegion]) -> ErasureOutcome {
        let (width, height) = image.dimensions();
        let mask = ErasureMask::build(width, height, regions, self.config.margin);

        if mask.count == 0 {
            return ErasureOutcome {
                image: image.clone(),
                used_fallback: false,
                masked_pixels: 0,
                expanded: mask.boxes,
            };
        }

        let mut out = image.clone();
        let inpainted = self.reconstruct(&mut out, &mask.bits);

        let used_fallback = match inpainted {
            Ok(()) => false,
            Err(e) => {
                warn!("Inpainting unavailable ({}), using solid fill", e);
                out = image.clone();
                for b in &mask.boxes {
                    inpaint::solid_fill(&mut out, image, &mask.bits, *b);
                }
                true
            }
        };

        debug!(
            regions = regions.len(),
            masked_pixels = mask.count,
            method = self.config.method.as_str(),
            used_fallback,
            "Erasure complete"
        );

        ErasureOutcome {
            image: out,
            used_fallback,
            masked_pixels: mask.count,
            expanded: mask.boxes,
        }
    }

    /// OpenCV when built with the `opencv` feature; the native methods
    /// otherwise, or when OpenCV itself errors.
    fn reconstruct(&self, img: &mut RgbaImage, mask: &Array2<bool>) -> ErasureResult<()> {
        #[cfg(feature = "opencv")]
        if let Some(flags) = cv::flags_for(self.config.method) {
            match cv::inpaint(img, mask, self.config.radius, flags) {
                Err(ErasureError::OpenCv(e)) => warn!("OpenCV inpainting failed ({}), using native", e),
                done => return done,
            }
        }

        match self.config.method {
            InpaintMethod::FastMarching => inpaint::fast_march(img, mask, self.config.radius),
            InpaintMethod::Diffusion => {
                inpaint::diffuse(img, mask, self.config.radius, self.config.diffusion_iterations)
            }
            InpaintMethod::Disabled => Err(ErasureError::InpaintingUnavailable),
        }
    }

    /// `erase` on the blocking pool.
    #[instrument(skip_all, fields(regions = regions.len()))]
    pub async fn erase_async(
        &self,
        image: Arc<RgbaImage>,
        regions: Arc<Vec<TextRegion>>,
    ) -> ErasureResult<ErasureOutcome> {
        let eraser = self.clone();
        tokio::task::spawn_blocking(move || eraser.erase(&image, &regions))
            .await
            .map_err(|e| ErasureError::TaskJoinFailed(e.to_string()))
    }
}

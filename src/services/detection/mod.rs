pub mod engine;

pub use engine::{build_ocr_engine, OcrEngine};

use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, trace};

use crate::core::config::DetectionConfig;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::{box_iou, RawDetection, TextRegion};
use crate::utils::image_ops::{crop_rgb, to_rgb};

/// Finds text regions in an image through the configured OCR capability.
pub struct RegionDetector {
    engine: Option<Arc<dyn OcrEngine>>,
    config: DetectionConfig,
}

impl RegionDetector {
    pub fn new(engine: Option<Arc<dyn OcrEngine>>, config: DetectionConfig) -> Self {
        Self { engine, config }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn backend_name(&self) -> &str {
        self.engine.as_ref().map(|e| e.name()).unwrap_or("unavailable")
    }

    /// One OCR pass over `image`, filtered and clamped.
    ///
    /// Any OCR failure (missing engine, error, timeout) comes back as `Err`
    /// and the caller treats the image as degraded.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub async fn detect(&self, image: Arc<RgbaImage>) -> DetectionResult<Vec<TextRegion>> {
        let engine = self
            .engine
            .clone()
            .ok_or_else(|| DetectionError::Unavailable("no OCR engine configured".to_string()))?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImageSize { width, height });
        }

        let start = Instant::now();
        let tile_size = self.config.tile_size;
        let overlap = self.config.tile_overlap;

        let task = tokio::task::spawn_blocking(move || {
            let rgb = to_rgb(&image);
            recognize_tiled(engine.as_ref(), &rgb, tile_size, overlap)
        });

        let (raw, tiled) = match tokio::time::timeout(self.config.timeout, task).await {
            Err(_) => {
                return Err(DetectionError::Timeout {
                    seconds: self.config.timeout.as_secs(),
                })
            }
            Ok(Err(join_err)) => return Err(DetectionError::TaskJoinFailed(join_err.to_string())),
            Ok(Ok(Err(e))) => return Err(DetectionError::InferenceFailed(format!("{:#}", e))),
            Ok(Ok(Ok(result))) => result,
        };

        let raw_count = raw.len();
        let dedupe = tiled.then_some(self.config.iou_threshold);
        let regions = filter_detections(
            raw,
            self.config.confidence_threshold,
            width,
            height,
            dedupe,
        );

        debug!(
            raw = raw_count,
            kept = regions.len(),
            tiled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Detection complete"
        );
        Ok(regions)
    }
}

/// Run OCR over the whole image, or over overlapping tiles when the image is
/// larger than `tile_size`. Returns full-image coordinates and whether
/// tiling was used.
fn recognize_tiled(
    engine: &dyn OcrEngine,
    rgb: &image::RgbImage,
    tile_size: u32,
    overlap: u32,
) -> anyhow::Result<(Vec<RawDetection>, bool)> {
    let (width, height) = rgb.dimensions();
    if tile_size == 0 || (width <= tile_size && height <= tile_size) {
        return Ok((engine.recognize(rgb)?, false));
    }

    let mut all = Vec::new();
    for ty in tile_origins(height, tile_size, overlap) {
        for tx in tile_origins(width, tile_size, overlap) {
            let tw = tile_size.min(width - tx);
            let th = tile_size.min(height - ty);
            let tile = crop_rgb(rgb, tx, ty, tw, th);
            let found = engine.recognize(&tile)?;
            trace!(tx, ty, found = found.len(), "Tile recognized");
            all.extend(found.into_iter().map(|d| RawDetection {
                geometry: d.geometry.offset(tx as i32, ty as i32),
                ..d
            }));
        }
    }
    Ok((all, true))
}

/// Start offsets of tiles covering `len` pixels, neighbours sharing `overlap` pixels.
pub fn tile_origins(len: u32, tile: u32, overlap: u32) -> Vec<u32> {
    if tile == 0 || len <= tile {
        return vec![0];
    }
    let step = tile.saturating_sub(overlap).max(1);
    let mut origins: Vec<u32> = (0..)
        .map(|i| i * step)
        .take_while(|&o| o + tile < len)
        .collect();
    origins.push(len - tile);
    origins.dedup();
    origins
}

/// Turn raw OCR output into indexed regions.
///
/// Drops detections below `threshold` (and non-finite scores), empty or
/// whitespace-only text, and geometry that lies entirely outside the image.
/// Everything else is clamped to the image bounds. With `dedupe_iou` set,
/// a detection with the same text as an earlier one and overlap at or
/// above the threshold is treated as a tile-seam duplicate.
pub fn filter_detections(
    raw: Vec<RawDetection>,
    threshold: f32,
    width: u32,
    height: u32,
    dedupe_iou: Option<f32>,
) -> Vec<TextRegion> {
    let mut kept: Vec<TextRegion> = Vec::with_capacity(raw.len());

    for detection in raw {
        if !detection.confidence.is_finite() || detection.confidence < threshold {
            trace!(
                confidence = detection.confidence,
                threshold,
                "Dropped low-confidence detection"
            );
            continue;
        }

        let text = detection.text.trim();
        if text.is_empty() {
            continue;
        }

        let Some(geometry) = detection.geometry.clamped(width, height) else {
            trace!(bbox = ?detection.geometry.bbox(), "Dropped out-of-bounds detection");
            continue;
        };

        if let Some(iou_threshold) = dedupe_iou {
            let bbox = geometry.bbox();
            let duplicate = kept.iter().any(|r| {
                r.source_text == text && box_iou(&r.geometry.bbox(), &bbox) >= iou_threshold
            });
            if duplicate {
                continue;
            }
        }

        kept.push(TextRegion {
            index: kept.len(),
            geometry,
            source_text: text.to_string(),
            confidence: detection.confidence.min(1.0),
            translated_text: None,
        });
    }

    if dedupe_iou.is_some() {
        // Tiles are visited row by row; restore reading order.
        kept.sort_by_key(|r| {
            let [x1, y1, _, _] = r.geometry.bbox();
            (y1, x1)
        });
        for (i, region) in kept.iter_mut().enumerate() {
            region.index = i;
        }
    }

    kept
}

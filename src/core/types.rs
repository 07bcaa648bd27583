// Shared data model for the translation pipeline

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Writing systems the renderer knows how to pick fonts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    Latin,
    Arabic,
    Hebrew,
    Cyrillic,
    Cjk,
}

impl Script {
    /// Script used to write the given language code (`ar`, `en-US`, `zh-CN`, ...).
    pub fn for_language(code: &str) -> Self {
        let primary = code
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "ar" | "fa" | "ur" | "ps" | "sd" | "ug" | "ku" => Script::Arabic,
            "he" | "iw" | "yi" => Script::Hebrew,
            "ru" | "uk" | "bg" | "sr" | "mk" | "be" | "kk" | "ky" | "mn" | "tg" => Script::Cyrillic,
            "zh" | "ja" | "ko" => Script::Cjk,
            _ => Script::Latin,
        }
    }

    pub fn is_right_to_left(self) -> bool {
        matches!(self, Script::Arabic | Script::Hebrew)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Script::Latin => "latin",
            Script::Arabic => "arabic",
            Script::Hebrew => "hebrew",
            Script::Cyrillic => "cyrillic",
            Script::Cjk => "cjk",
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of a detected region in image pixel coordinates.
///
/// Rectangles are `[x1, y1, x2, y2]` with exclusive right/bottom edges.
/// Quadrilaterals keep the four corner points reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionGeometry {
    Rect([i32; 4]),
    Quad([[f32; 2]; 4]),
}

impl RegionGeometry {
    /// Axis-aligned bounding rectangle.
    pub fn bbox(&self) -> [i32; 4] {
        match self {
            RegionGeometry::Rect(b) => *b,
            RegionGeometry::Quad(points) => {
                let (mut x1, mut y1) = (f32::MAX, f32::MAX);
                let (mut x2, mut y2) = (f32::MIN, f32::MIN);
                for [x, y] in points {
                    x1 = x1.min(*x);
                    y1 = y1.min(*y);
                    x2 = x2.max(*x);
                    y2 = y2.max(*y);
                }
                [
                    x1.floor() as i32,
                    y1.floor() as i32,
                    x2.ceil() as i32,
                    y2.ceil() as i32,
                ]
            }
        }
    }

    pub fn width(&self) -> i32 {
        let [x1, _, x2, _] = self.bbox();
        (x2 - x1).max(0)
    }

    pub fn height(&self) -> i32 {
        let [_, y1, _, y2] = self.bbox();
        (y2 - y1).max(0)
    }

    /// Shift by a tile offset.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        match self {
            RegionGeometry::Rect([x1, y1, x2, y2]) => {
                RegionGeometry::Rect([x1 + dx, y1 + dy, x2 + dx, y2 + dy])
            }
            RegionGeometry::Quad(points) => {
                let mut shifted = *points;
                for p in shifted.iter_mut() {
                    p[0] += dx as f32;
                    p[1] += dy as f32;
                }
                RegionGeometry::Quad(shifted)
            }
        }
    }

    /// Clamp into `width x height`. Returns `None` when nothing of the
    /// region is left inside the image.
    pub fn clamped(&self, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as i32, height as i32);
        let clamped = match self {
            RegionGeometry::Rect([x1, y1, x2, y2]) => RegionGeometry::Rect([
                (*x1).clamp(0, w),
                (*y1).clamp(0, h),
                (*x2).clamp(0, w),
                (*y2).clamp(0, h),
            ]),
            RegionGeometry::Quad(points) => {
                let mut inside = *points;
                for p in inside.iter_mut() {
                    p[0] = p[0].clamp(0.0, width as f32);
                    p[1] = p[1].clamp(0.0, height as f32);
                }
                RegionGeometry::Quad(inside)
            }
        };

        if clamped.width() == 0 || clamped.height() == 0 {
            None
        } else {
            Some(clamped)
        }
    }
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
pub fn box_iou(a: &[i32; 4], b: &[i32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = ((x2 - x1) as i64 * (y2 - y1) as i64) as f32;
    let area_a = ((a[2] - a[0]) as i64 * (a[3] - a[1]) as i64) as f32;
    let area_b = ((b[2] - b[0]) as i64 * (b[3] - b[1]) as i64) as f32;
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// One line of output from an OCR capability, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub geometry: RegionGeometry,
    pub text: String,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(geometry: RegionGeometry, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            geometry,
            text: text.into(),
            confidence,
        }
    }
}

/// A detected text region carried through one image's pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    /// Position in detection order; preserved through every stage.
    pub index: usize,
    pub geometry: RegionGeometry,
    pub source_text: String,
    pub confidence: f32,
    pub translated_text: Option<String>,
}

impl TextRegion {
    /// Text the renderer should draw.
    pub fn display_text(&self) -> &str {
        self.translated_text.as_deref().unwrap_or(&self.source_text)
    }
}

/// Why an image came back without the intended transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DegradedReason {
    DetectionUnavailable,
    NoTextDetected,
    TranslationUnavailable,
    ErasureFallback,
}

impl DegradedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DegradedReason::DetectionUnavailable => "DetectionUnavailable",
            DegradedReason::NoTextDetected => "NoTextDetected",
            DegradedReason::TranslationUnavailable => "TranslationUnavailable",
            DegradedReason::ErasureFallback => "ErasureFallback",
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an image could not be processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    RenderFontMissing { script: Script },
    Cancelled,
    Internal(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RenderFontMissing { script } => {
                write!(f, "RenderFontMissing({})", script)
            }
            FailureReason::Cancelled => f.write_str("Cancelled"),
            FailureReason::Internal(msg) => write!(f, "Internal({})", msg),
        }
    }
}

/// Per-image outcome reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProcessStatus {
    Success,
    Degraded(DegradedReason),
    Failed(FailureReason),
}

impl ProcessStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessStatus::Success)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ProcessStatus::Degraded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessStatus::Failed(_))
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Success => f.write_str("Success"),
            ProcessStatus::Degraded(reason) => write!(f, "Degraded({})", reason),
            ProcessStatus::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Stage of one image's run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    Detecting,
    Translating,
    Erasing,
    Rendering,
    Degraded,
    Done,
}

impl PipelineState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Detecting, Translating)
                | (Detecting, Degraded)
                | (Translating, Erasing)
                | (Translating, Degraded)
                | (Erasing, Rendering)
                | (Erasing, Degraded)
                | (Rendering, Done)
                | (Degraded, Done)
        )
    }
}

/// Wall-clock time spent in each stage of one image.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub detection: Duration,
    pub translation: Duration,
    pub erasure: Duration,
    pub rendering: Duration,
    pub total: Duration,
}

impl StageTimings {
    pub fn merge(&mut self, other: &StageTimings) {
        self.detection += other.detection;
        self.translation += other.translation;
        self.erasure += other.erasure;
        self.rendering += other.rendering;
        self.total += other.total;
    }
}

/// Serializable summary of one image's run.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub index: usize,
    pub status: ProcessStatus,
    pub stages: Vec<PipelineState>,
    pub region_count: usize,
    pub translated_count: usize,
    pub fallback_count: usize,
    pub erasure_fallback: bool,
    pub warnings: Vec<String>,
    pub detection_time_ms: f64,
    pub translation_time_ms: f64,
    pub erasure_time_ms: f64,
    pub rendering_time_ms: f64,
    pub total_time_ms: f64,
    #[serde(skip)]
    pub timings: StageTimings,
}

/// Output image plus its report.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub image: DynamicImage,
    pub report: ImageReport,
}

impl ImageOutcome {
    pub fn status(&self) -> &ProcessStatus {
        &self.report.status
    }

    /// The `(image, status)` pair handed to collaborators.
    pub fn into_parts(self) -> (DynamicImage, ProcessStatus) {
        (self.image, self.report.status)
    }
}

/// Totals across a batch of images.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchAnalytics {
    pub total_images: usize,
    pub successful: usize,
    pub degraded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_regions: usize,
    pub translated_entries: usize,
    pub fallback_entries: usize,
    pub erasure_fallbacks: usize,
    pub detection_time_ms: f64,
    pub translation_time_ms: f64,
    pub erasure_time_ms: f64,
    pub rendering_time_ms: f64,
    pub total_time_ms: f64,
}

impl BatchAnalytics {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a ImageReport>, wall_time: Duration) -> Self {
        let mut analytics = BatchAnalytics::default();
        let mut timings = StageTimings::default();

        for report in reports {
            analytics.total_images += 1;
            match &report.status {
                ProcessStatus::Success => analytics.successful += 1,
                ProcessStatus::Degraded(_) => analytics.degraded += 1,
                ProcessStatus::Failed(reason) => {
                    analytics.failed += 1;
                    if *reason == FailureReason::Cancelled {
                        analytics.cancelled += 1;
                    }
                }
            }
            analytics.total_regions += report.region_count;
            analytics.translated_entries += report.translated_count;
            analytics.fallback_entries += report.fallback_count;
            if report.erasure_fallback {
                analytics.erasure_fallbacks += 1;
            }
            timings.merge(&report.timings);
        }

        analytics.detection_time_ms = duration_ms(timings.detection);
        analytics.translation_time_ms = duration_ms(timings.translation);
        analytics.erasure_time_ms = duration_ms(timings.erasure);
        analytics.rendering_time_ms = duration_ms(timings.rendering);
        analytics.total_time_ms = duration_ms(wall_time);
        analytics
    }
}

/// Result of processing a batch, in input order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub outcomes: Vec<ImageOutcome>,
    pub analytics: BatchAnalytics,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn reports(&self) -> impl Iterator<Item = &ImageReport> {
        self.outcomes.iter().map(|o| &o.report)
    }
}

/// Readiness of the configured capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub ocr_available: bool,
    pub ocr_backend: String,
    pub translation_backend: String,
    pub inpaint_method: String,
    pub target_language: String,
    pub target_script: Script,
    pub target_font_available: bool,
    pub translation_circuit: String,
}

pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

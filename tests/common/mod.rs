// Fake capabilities shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbImage, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image_translator::core::errors::{RenderingResult, TranslationError, TranslationResult};
use image_translator::services::rendering::{DrawPass, FontAsset, RenderPlan, TextBlock, TextEngine};
use image_translator::{
    CancellationHandle, Capabilities, Config, FontRegistry, Metrics, OcrEngine, PipelineOrchestrator, RawDetection, RegionGeometry,
    Script, TranslationBackend,
};

pub const BACKGROUND: Rgba<u8> = Rgba([240, 240, 240, 255]);
pub const INK: Rgba<u8> = Rgba([160, 20, 20, 255]);

/// Minimal TrueType signature; enough for the registry, never rasterised.
pub fn fake_font_bytes() -> Vec<u8> {
    vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
}

/// OCR that returns the same lines for every image.
pub struct ScriptedOcr {
    pub lines: Vec<RawDetection>,
}

impl ScriptedOcr {
    pub fn new(lines: Vec<([i32; 4], &str, f32)>) -> Self {
        Self {
            lines: lines
                .into_iter()
                .map(|(bbox, text, confidence)| RawDetection::new(RegionGeometry::Rect(bbox), text, confidence))
                .collect(),
        }
    }
}

impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&self, _image: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self.lines.clone())
    }
}

/// Dictionary translation; entries listed in `fail` come back as entry errors.
pub struct MapBackend {
    pub entries: HashMap<String, String>,
    pub fail: Vec<String>,
}

impl MapBackend {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            fail: Vec::new(),
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail.push(text.to_string());
        self
    }
}

#[async_trait]
impl TranslationBackend for MapBackend {
    fn name(&self) -> &str {
        "map"
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>> {
        Ok(texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                if self.fail.contains(text) {
                    return Err(TranslationError::EntryFailed {
                        index,
                        reason: "rejected".into(),
                    });
                }
                Ok(self.entries.get(text).cloned().unwrap_or_else(|| text.to_uppercase()))
            })
            .collect())
    }
}

/// Backend whose every call fails as a whole.
pub struct UnreachableBackend;

#[async_trait]
impl TranslationBackend for UnreachableBackend {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn translate_batch(
        &self,
        _texts: &[String],
        _target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>> {
        Err(TranslationError::HttpStatus {
            status: 503,
            body: "service unavailable".into(),
        })
    }
}

/// Backend that answers only after `delay`.
pub struct SlowBackend {
    pub delay: Duration,
}

#[async_trait]
impl TranslationBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>> {
        tokio::time::sleep(self.delay).await;
        Ok(texts.iter().map(|t| Ok(t.to_uppercase())).collect())
    }
}

/// Backend that fires `handle` on its first call, as a user would while
/// the first image is being translated.
pub struct CancellingBackend {
    pub handle: CancellationHandle,
    pub calls: AtomicUsize,
}

impl CancellingBackend {
    pub fn new(handle: CancellationHandle) -> Self {
        Self {
            handle,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationBackend for CancellingBackend {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        _target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.handle.cancel();
        Ok(texts.iter().map(|t| Ok(t.to_uppercase())).collect())
    }
}

/// Fixed-advance text engine that draws each line as a solid bar and
/// remembers every plan it was asked to draw.
#[derive(Default)]
pub struct RecordingEngine {
    pub drawn: Mutex<Vec<RenderPlan>>,
}

impl RecordingEngine {
    pub fn plans(&self) -> Vec<RenderPlan> {
        self.drawn.lock().clone()
    }

    fn wrap(text: &str, font_size: f32, max_width: f32) -> Vec<f32> {
        let advance = font_size * 0.6;
        let mut lines = Vec::new();
        let mut current: Option<f32> = None;
        for word in text.split_whitespace() {
            let w = word.chars().filter(|c| !c.is_control() && *c != '\u{200F}' && *c != '\u{200E}').count() as f32 * advance;
            current = Some(match current {
                None => w,
                Some(cur) if cur + advance + w <= max_width => cur + advance + w,
                Some(cur) => {
                    lines.push(cur);
                    w
                }
            });
        }
        lines.extend(current);
        lines
    }
}

impl TextEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn measure(
        &self,
        _font: &FontAsset,
        text: &str,
        font_size: f32,
        line_height: f32,
        max_width: f32,
    ) -> RenderingResult<TextBlock> {
        Ok(TextBlock::from_lines(Self::wrap(text, font_size, max_width), line_height))
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        _font: &FontAsset,
        plan: &RenderPlan,
        passes: &[DrawPass],
    ) -> RenderingResult<()> {
        self.drawn.lock().push(plan.clone());
        let [cx1, cy1, cx2, cy2] = plan.clip;
        for pass in passes {
            for line in &plan.lines {
                let x0 = line.x.round() as i32 + pass.dx;
                let y0 = line.y.round() as i32 + pass.dy;
                let x1 = x0 + line.width.round() as i32;
                let y1 = y0 + (plan.font_size * 0.8).round() as i32;
                for y in y0.max(cy1).max(0)..y1.min(cy2).min(canvas.height() as i32) {
                    for x in x0.max(cx1).max(0)..x1.min(cx2).min(canvas.width() as i32) {
                        canvas.put_pixel(x as u32, y as u32, pass.color);
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn test_config(target_language: &str) -> Config {
    let mut config = Config::defaults().expect("default config is valid");
    config.translation.target_language = target_language.to_string();
    config.cache.enabled = false;
    config
}

/// Registry with fake fonts for the given scripts only.
pub fn fonts_for(scripts: &[Script]) -> Arc<FontRegistry> {
    let fonts = FontRegistry::new("fonts", HashMap::new());
    for script in scripts {
        fonts
            .register_bytes(*script, format!("fake-{}", script), fake_font_bytes())
            .expect("signature is accepted");
    }
    Arc::new(fonts)
}

pub struct Harness {
    pub pipeline: PipelineOrchestrator,
    pub engine: Arc<RecordingEngine>,
}

pub fn harness(
    config: Config,
    ocr: Option<ScriptedOcr>,
    translation: Option<Arc<dyn TranslationBackend>>,
    fonts: Arc<FontRegistry>,
) -> Harness {
    let engine = Arc::new(RecordingEngine::default());
    let mut caps = Capabilities::new(engine.clone(), fonts);
    if let Some(ocr) = ocr {
        caps = caps.with_ocr(Arc::new(ocr));
    }
    if let Some(backend) = translation {
        caps = caps.with_translation(backend);
    }
    Harness {
        pipeline: PipelineOrchestrator::with_capabilities(Arc::new(config), caps, Metrics::new()),
        engine,
    }
}

/// Light page with a block of "ink" standing in for glyphs inside each box.
pub fn page_with_ink(width: u32, height: u32, ink_boxes: &[[u32; 4]]) -> DynamicImage {
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);
    for [x1, y1, x2, y2] in ink_boxes {
        for y in *y1..*y2 {
            for x in *x1..*x2 {
                if (x / 3) % 2 == 0 {
                    img.put_pixel(x, y, INK);
                }
            }
        }
    }
    DynamicImage::ImageRgba8(img)
}

pub fn is_ink(p: &Rgba<u8>) -> bool {
    p[0] > 100 && p[1] < 60 && p[2] < 60
}

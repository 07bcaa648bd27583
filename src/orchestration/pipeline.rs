// Per-image pipeline: detect -> (translate || erase) -> render
//
// Every stage failure is mapped onto the image's ProcessStatus here; nothing
// below `process`/`process_batch` can abort a batch.

use futures::future::join_all;
use image::{DynamicImage, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, instrument, warn};

use super::capabilities::Capabilities;
use crate::core::config::Config;
use crate::core::errors::{CacheResult, PipelineError, PipelineResult, RenderingError};
use crate::core::types::{
    duration_ms, BatchAnalytics, BatchResult, DegradedReason, FailureReason, HealthReport, ImageOutcome,
    ImageReport, PipelineState, ProcessStatus, StageTimings, TextRegion,
};
use crate::services::detection::RegionDetector;
use crate::services::erasure::RegionEraser;
use crate::services::rendering::TextLayoutRenderer;
use crate::services::translation::Translator;
use crate::utils::metrics::{Metrics, MetricsSnapshot, Stage};

/// Stops a running batch from starting more images.
///
/// Images that have not reached rendering when the flag is set come back
/// `Failed(Cancelled)` with their original pixels; images already rendering
/// finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bookkeeping for one image's run.
struct ImageRun {
    index: usize,
    state: PipelineState,
    stages: Vec<PipelineState>,
    degradations: Vec<DegradedReason>,
    warnings: Vec<String>,
    region_count: usize,
    translated_count: usize,
    fallback_count: usize,
    erasure_fallback: bool,
    timings: StageTimings,
    started: Instant,
}

impl ImageRun {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: PipelineState::Detecting,
            stages: vec![PipelineState::Detecting],
            degradations: Vec::new(),
            warnings: Vec::new(),
            region_count: 0,
            translated_count: 0,
            fallback_count: 0,
            erasure_fallback: false,
            timings: StageTimings::default(),
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: PipelineState) -> PipelineResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.stages.push(next);
        Ok(())
    }

    fn degrade(&mut self, reason: DegradedReason, detail: impl Into<String>) {
        if !self.degradations.contains(&reason) {
            self.degradations.push(reason);
        }
        self.warnings.push(format!("{}: {}", reason, detail.into()));
    }

    /// Most severe degradation recorded, if any.
    fn degraded_status(&self) -> Option<ProcessStatus> {
        const PRECEDENCE: [DegradedReason; 4] = [
            DegradedReason::DetectionUnavailable,
            DegradedReason::NoTextDetected,
            DegradedReason::TranslationUnavailable,
            DegradedReason::ErasureFallback,
        ];
        PRECEDENCE
            .into_iter()
            .find(|r| self.degradations.contains(r))
            .map(ProcessStatus::Degraded)
    }

    /// Leave through the `Degraded` terminal with the image unchanged.
    fn finish_degraded(mut self, image: DynamicImage) -> ImageOutcome {
        let status = match self.advance(PipelineState::Degraded).and_then(|_| self.advance(PipelineState::Done)) {
            Ok(()) => self
                .degraded_status()
                .unwrap_or(ProcessStatus::Degraded(DegradedReason::NoTextDetected)),
            Err(e) => ProcessStatus::Failed(FailureReason::Internal(e.to_string())),
        };
        self.finish(image, status)
    }

    fn finish_failed(mut self, image: DynamicImage, reason: FailureReason) -> ImageOutcome {
        self.warnings.push(reason.to_string());
        self.finish(image, ProcessStatus::Failed(reason))
    }

    fn finish(mut self, image: DynamicImage, status: ProcessStatus) -> ImageOutcome {
        self.timings.total = self.started.elapsed();
        let t = self.timings;

        match &status {
            ProcessStatus::Success => debug!(image = self.index, total_ms = duration_ms(t.total), "Image done"),
            ProcessStatus::Degraded(_) => warn!(image = self.index, %status, warnings = ?self.warnings, "Image degraded"),
            ProcessStatus::Failed(_) => error!(image = self.index, %status, "Image failed"),
        }

        ImageOutcome {
            image,
            report: ImageReport {
                index: self.index,
                status,
                stages: self.stages,
                region_count: self.region_count,
                translated_count: self.translated_count,
                fallback_count: self.fallback_count,
                erasure_fallback: self.erasure_fallback,
                warnings: self.warnings,
                detection_time_ms: duration_ms(t.detection),
                translation_time_ms: duration_ms(t.translation),
                erasure_time_ms: duration_ms(t.erasure),
                rendering_time_ms: duration_ms(t.rendering),
                total_time_ms: duration_ms(t.total),
                timings: t,
            },
        }
    }
}

/// Output pixels in the input's colour model.
fn restore_color_model(original: &DynamicImage, rendered: RgbaImage) -> DynamicImage {
    let rendered = DynamicImage::ImageRgba8(rendered);
    if original.color().has_alpha() {
        rendered
    } else {
        DynamicImage::ImageRgb8(rendered.to_rgb8())
    }
}

/// Sequences the four stages for each image.
///
/// CPU-heavy stages (OCR, inpainting, rasterisation) share one permit pool
/// sized to `WORKER_COUNT`; at most `MAX_BATCH_SIZE` images are in flight.
/// Translation requests are bounded separately inside the backends.
pub struct PipelineOrchestrator {
    config: Arc<Config>,
    detector: Arc<RegionDetector>,
    translator: Arc<Translator>,
    eraser: RegionEraser,
    renderer: Arc<TextLayoutRenderer>,
    cpu_permits: Arc<Semaphore>,
    image_permits: Arc<Semaphore>,
    metrics: Metrics,
}

impl PipelineOrchestrator {
    /// Build the pipeline and every capability named in `config`.
    #[instrument(skip(config))]
    pub async fn new(config: Arc<Config>) -> PipelineResult<Self> {
        info!("Initializing pipeline capabilities...");
        let metrics = Metrics::new();
        let capabilities = Capabilities::from_config(&config, &metrics).await?;
        let orchestrator = Self::with_capabilities(config, capabilities, metrics);

        let health = orchestrator.health();
        info!(
            "✓ Ready (ocr: {}, translation: {}, inpaint: {}, target: {} [{}], workers: {}, in flight: {})",
            health.ocr_backend,
            health.translation_backend,
            health.inpaint_method,
            health.target_language,
            health.target_script,
            orchestrator.config.worker_count(),
            orchestrator.config.max_batch_size(),
        );
        Ok(orchestrator)
    }

    /// Build around capabilities supplied by the caller.
    pub fn with_capabilities(config: Arc<Config>, capabilities: Capabilities, metrics: Metrics) -> Self {
        let detector = Arc::new(RegionDetector::new(capabilities.ocr, config.detection.clone()));
        let translator = Arc::new(Translator::new(
            capabilities.translation,
            capabilities.cache,
            &config.translation,
            Some(metrics.clone()),
        ));
        let eraser = RegionEraser::new(config.erasure.clone());
        let renderer = Arc::new(TextLayoutRenderer::new(
            capabilities.text_engine,
            capabilities.fonts,
            &config.rendering,
            config.target_script(),
        ));

        Self {
            cpu_permits: Arc::new(Semaphore::new(config.worker_count().max(1))),
            image_permits: Arc::new(Semaphore::new(config.max_batch_size().max(1))),
            config,
            detector,
            translator,
            eraser,
            renderer,
            metrics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics_collector(&self) -> &Metrics {
        &self.metrics
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Readiness of each configured capability.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            ocr_available: self.detector.is_available(),
            ocr_backend: self.detector.backend_name().to_string(),
            translation_backend: self.translator.backend_name().to_string(),
            inpaint_method: self.eraser.method().as_str().to_string(),
            target_language: self.translator.target_language().to_string(),
            target_script: self.renderer.script(),
            target_font_available: self.renderer.font_available(),
            translation_circuit: self.translator.circuit_state().as_str().to_string(),
        }
    }

    /// Write the translation cache to disk now.
    pub async fn save_cache(&self) -> CacheResult<()> {
        match self.translator.cache() {
            Some(cache) => cache.save().await,
            None => Ok(()),
        }
    }

    /// Run one image through the pipeline.
    pub async fn process(&self, image: DynamicImage) -> ImageOutcome {
        let outcome = self.run_image(0, image, &CancellationHandle::new()).await;
        self.metrics.record_image(outcome.status());
        outcome
    }

    /// Run every image, in input order and count.
    pub async fn process_batch(&self, images: Vec<DynamicImage>) -> BatchResult {
        self.process_batch_with_cancel(images, &CancellationHandle::new()).await
    }

    /// `process_batch` that stops starting images once `cancel` fires.
    #[instrument(skip_all, fields(images = images.len()))]
    pub async fn process_batch_with_cancel(
        &self,
        images: Vec<DynamicImage>,
        cancel: &CancellationHandle,
    ) -> BatchResult {
        let start = Instant::now();
        let total = images.len();
        info!("Processing {} images", total);

        let runs = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| self.run_admitted(index, image, cancel));
        let outcomes = join_all(runs).await;

        for outcome in &outcomes {
            self.metrics.record_image(outcome.status());
        }
        self.metrics.record_batch_processed();

        let analytics = BatchAnalytics::from_reports(outcomes.iter().map(|o| &o.report), start.elapsed());
        info!(
            "Batch complete: {} images in {:.2}ms ({} ok, {} degraded, {} failed, {} regions, {} fallbacks)",
            analytics.total_images,
            analytics.total_time_ms,
            analytics.successful,
            analytics.degraded,
            analytics.failed,
            analytics.total_regions,
            analytics.fallback_entries,
        );

        BatchResult { outcomes, analytics }
    }

    /// Wait for an in-flight slot, then run the image.
    async fn run_admitted(&self, index: usize, image: DynamicImage, cancel: &CancellationHandle) -> ImageOutcome {
        let _slot = match self.image_permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => return ImageRun::new(index).finish_failed(image, FailureReason::Internal(e.to_string())),
        };
        self.run_image(index, image, cancel).await
    }

    async fn cpu_permit(&self) -> PipelineResult<SemaphorePermit<'_>> {
        self.cpu_permits
            .acquire()
            .await
            .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))
    }

    #[instrument(skip(self, image, cancel), fields(width = image.width(), height = image.height()))]
    async fn run_image(&self, index: usize, image: DynamicImage, cancel: &CancellationHandle) -> ImageOutcome {
        let mut run = ImageRun::new(index);
        if cancel.is_cancelled() {
            return run.finish_failed(image, FailureReason::Cancelled);
        }

        let rgba = Arc::new(image.to_rgba8());

        // ===== DETECTING =====
        let stage_start = Instant::now();
        let detected = match self.cpu_permit().await {
            Ok(_permit) => self.detector.detect(Arc::clone(&rgba)).await,
            Err(e) => return run.finish_failed(image, FailureReason::Internal(e.to_string())),
        };
        run.timings.detection = self.timed(Stage::Detection, stage_start);

        let regions = match detected {
            Err(e) => {
                run.degrade(DegradedReason::DetectionUnavailable, e.to_string());
                return run.finish_degraded(image);
            }
            Ok(regions) if regions.is_empty() => {
                run.degrade(DegradedReason::NoTextDetected, "no regions above the confidence threshold");
                return run.finish_degraded(image);
            }
            Ok(regions) => regions,
        };
        run.region_count = regions.len();
        debug!(image = index, regions = regions.len(), "Detected regions");

        if cancel.is_cancelled() {
            return run.finish_failed(image, FailureReason::Cancelled);
        }

        // ===== TRANSLATING || ERASING =====
        // Erasure only needs the geometries, so it runs alongside translation
        if let Err(e) = run.advance(PipelineState::Translating) {
            return run.finish_failed(image, FailureReason::Internal(e.to_string()));
        }

        let texts: Vec<String> = regions.iter().map(|r| r.source_text.clone()).collect();
        let geometry = Arc::new(regions.clone());

        let translate = async {
            let start = Instant::now();
            let batch = self.translator.translate(&texts).await;
            (batch, start.elapsed())
        };
        let erase = async {
            let _permit = self.cpu_permit().await?;
            let start = Instant::now();
            let outcome = self.eraser.erase_async(Arc::clone(&rgba), geometry).await?;
            Ok::<_, PipelineError>((outcome, start.elapsed()))
        };
        let ((translation, translation_time), erased) = tokio::join!(translate, erase);

        run.timings.translation = translation_time;
        self.metrics.record_stage(Stage::Translation, translation_time);
        run.translated_count = translation.translated_count();
        run.fallback_count = translation.fallback_count();

        if translation.all_fell_back() {
            let reasons = translation.fallback_reasons().join("; ");
            run.degrade(DegradedReason::TranslationUnavailable, reasons);
            return run.finish_degraded(image);
        }
        for reason in translation.fallback_reasons() {
            run.warnings.push(format!("translation fallback: {}", reason));
        }

        if let Err(e) = run.advance(PipelineState::Erasing) {
            return run.finish_failed(image, FailureReason::Internal(e.to_string()));
        }
        let erasure = match erased {
            Ok((outcome, elapsed)) => {
                run.timings.erasure = elapsed;
                self.metrics.record_stage(Stage::Erasure, elapsed);
                outcome
            }
            Err(e) => return run.finish_failed(image, FailureReason::Internal(e.to_string())),
        };
        if erasure.used_fallback {
            run.erasure_fallback = true;
            run.degrade(
                DegradedReason::ErasureFallback,
                format!("solid fill used ({} inpainting)", self.eraser.method().as_str()),
            );
        }

        let translated: Vec<TextRegion> = regions
            .into_iter()
            .zip(translation.outcomes)
            .map(|(region, outcome)| TextRegion {
                translated_text: Some(outcome.into_text()),
                ..region
            })
            .collect();

        if cancel.is_cancelled() {
            return run.finish_failed(image, FailureReason::Cancelled);
        }

        // ===== RENDERING =====
        if let Err(e) = run.advance(PipelineState::Rendering) {
            return run.finish_failed(image, FailureReason::Internal(e.to_string()));
        }
        let stage_start = Instant::now();
        let rendered = match self.cpu_permit().await {
            Ok(_permit) => {
                let renderer = Arc::clone(&self.renderer);
                let canvas = erasure.image;
                tokio::task::spawn_blocking(move || renderer.render_all(&canvas, &translated))
                    .await
                    .map_err(|e| RenderingError::TaskJoinFailed(e.to_string()))
                    .and_then(|result| result)
            }
            Err(e) => return run.finish_failed(image, FailureReason::Internal(e.to_string())),
        };
        run.timings.rendering = self.timed(Stage::Rendering, stage_start);

        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(RenderingError::FontMissing { script, .. }) => {
                return run.finish_failed(image, FailureReason::RenderFontMissing { script })
            }
            Err(e) => return run.finish_failed(image, FailureReason::Internal(e.to_string())),
        };
        debug!(
            image = index,
            drawn = rendered.plans.len(),
            overflowed = rendered.plans.iter().filter(|p| p.overflow).count(),
            "Rendered regions"
        );

        if let Err(e) = run.advance(PipelineState::Done) {
            return run.finish_failed(image, FailureReason::Internal(e.to_string()));
        }
        let status = run.degraded_status().unwrap_or(ProcessStatus::Success);
        let output = restore_color_model(&image, rendered.image);
        run.finish(output, status)
    }

    fn timed(&self, stage: Stage, start: Instant) -> Duration {
        let elapsed = start.elapsed();
        self.metrics.record_stage(stage, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::InpaintMethod;
    use crate::core::types::{RawDetection, RegionGeometry, Script};
    use crate::core::errors::TranslationResult;
    use crate::services::detection::OcrEngine;
    use crate::services::rendering::testing::MonoEngine;
    use crate::services::rendering::FontRegistry;
    use crate::services::translation::TranslationBackend;
    use async_trait::async_trait;
    use image::{Rgba, RgbImage};
    use std::collections::HashMap;

    struct FixedOcr(Vec<RawDetection>);

    impl OcrEngine for FixedOcr {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(&self, _image: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    struct Upper;

    #[async_trait]
    impl TranslationBackend for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn translate_batch(
            &self,
            texts: &[String],
            _target_language: &str,
        ) -> TranslationResult<Vec<TranslationResult<String>>> {
            Ok(texts.iter().map(|t| Ok(t.to_uppercase())).collect())
        }
    }

    fn config(method: InpaintMethod) -> Arc<Config> {
        let mut config = Config::defaults().unwrap();
        config.translation.target_language = "en".into();
        config.erasure.method = method;
        config.cache.enabled = false;
        Arc::new(config)
    }

    fn fonts_with_latin() -> Arc<FontRegistry> {
        let fonts = FontRegistry::new("fonts", HashMap::new());
        fonts
            .register_bytes(Script::Latin, "test-latin", vec![0, 1, 0, 0, 0, 0])
            .unwrap();
        Arc::new(fonts)
    }

    fn pipeline(method: InpaintMethod, ocr: Vec<RawDetection>) -> PipelineOrchestrator {
        let caps = Capabilities::new(Arc::new(MonoEngine), fonts_with_latin())
            .with_ocr(Arc::new(FixedOcr(ocr)))
            .with_translation(Arc::new(Upper));
        PipelineOrchestrator::with_capabilities(config(method), caps, Metrics::new())
    }

    fn page() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 80, Rgba([250, 250, 250, 255])))
    }

    fn hello() -> Vec<RawDetection> {
        vec![RawDetection::new(RegionGeometry::Rect([20, 20, 180, 60]), "hello", 0.9)]
    }

    #[test]
    fn test_run_tracks_forward_transitions() {
        let mut run = ImageRun::new(0);
        run.advance(PipelineState::Translating).unwrap();
        run.advance(PipelineState::Erasing).unwrap();
        assert!(run.advance(PipelineState::Detecting).is_err());
        assert_eq!(
            run.stages,
            vec![PipelineState::Detecting, PipelineState::Translating, PipelineState::Erasing]
        );
    }

    #[test]
    fn test_degradation_precedence() {
        let mut run = ImageRun::new(0);
        run.degrade(DegradedReason::ErasureFallback, "a");
        run.degrade(DegradedReason::TranslationUnavailable, "b");
        assert_eq!(
            run.degraded_status(),
            Some(ProcessStatus::Degraded(DegradedReason::TranslationUnavailable))
        );
        assert_eq!(run.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_full_run_succeeds() {
        let outcome = pipeline(InpaintMethod::FastMarching, hello()).process(page()).await;

        assert_eq!(*outcome.status(), ProcessStatus::Success);
        assert_eq!(outcome.report.region_count, 1);
        assert_eq!(outcome.report.translated_count, 1);
        assert_eq!(
            outcome.report.stages,
            vec![
                PipelineState::Detecting,
                PipelineState::Translating,
                PipelineState::Erasing,
                PipelineState::Rendering,
                PipelineState::Done,
            ]
        );
        assert_ne!(outcome.image.to_rgba8(), page().to_rgba8());
    }

    #[tokio::test]
    async fn test_disabled_inpainting_degrades_but_renders() {
        let outcome = pipeline(InpaintMethod::Disabled, hello()).process(page()).await;

        assert_eq!(
            *outcome.status(),
            ProcessStatus::Degraded(DegradedReason::ErasureFallback)
        );
        assert!(outcome.report.erasure_fallback);
        assert_eq!(outcome.report.stages.last(), Some(&PipelineState::Done));
        assert_ne!(outcome.image.to_rgba8(), page().to_rgba8());
    }

    #[tokio::test]
    async fn test_no_regions_passes_image_through() {
        let outcome = pipeline(InpaintMethod::FastMarching, Vec::new()).process(page()).await;

        assert_eq!(
            *outcome.status(),
            ProcessStatus::Degraded(DegradedReason::NoTextDetected)
        );
        assert_eq!(outcome.image, page());
        assert_eq!(
            outcome.report.stages,
            vec![PipelineState::Detecting, PipelineState::Degraded, PipelineState::Done]
        );
    }

    #[tokio::test]
    async fn test_rgb_input_stays_rgb() {
        let rgb = DynamicImage::ImageRgb8(page().to_rgb8());
        let outcome = pipeline(InpaintMethod::FastMarching, hello()).process(rgb).await;

        assert!(outcome.status().is_success());
        assert!(!outcome.image.color().has_alpha());
        assert_eq!((outcome.image.width(), outcome.image.height()), (200, 80));
    }

    #[tokio::test]
    async fn test_cancelled_batch_keeps_order_and_count() {
        let pipeline = pipeline(InpaintMethod::FastMarching, hello());
        let cancel = CancellationHandle::new();
        cancel.cancel();

        let result = pipeline
            .process_batch_with_cancel(vec![page(), page(), page()], &cancel)
            .await;

        assert_eq!(result.len(), 3);
        for (i, outcome) in result.outcomes.iter().enumerate() {
            assert_eq!(outcome.report.index, i);
            assert_eq!(*outcome.status(), ProcessStatus::Failed(FailureReason::Cancelled));
            assert_eq!(outcome.image, page());
        }
        assert_eq!(result.analytics.cancelled, 3);
    }

    #[tokio::test]
    async fn test_health_reports_capabilities() {
        let health = pipeline(InpaintMethod::Diffusion, hello()).health();

        assert!(health.ocr_available);
        assert_eq!(health.ocr_backend, "fixed");
        assert_eq!(health.translation_backend, "upper");
        assert_eq!(health.inpaint_method, "diffusion");
        assert_eq!(health.target_script, Script::Latin);
        assert!(health.target_font_available);
    }

    #[tokio::test]
    async fn test_batch_metrics_recorded() {
        let pipeline = pipeline(InpaintMethod::FastMarching, hello());
        pipeline.process_batch(vec![page(), page()]).await;

        let snapshot = pipeline.metrics();
        assert_eq!(snapshot.images_success, 2);
        assert_eq!(snapshot.batches_processed, 1);
        assert_eq!(snapshot.entries_translated, 2);
    }
}

// Pluggable capabilities, selected once when the pipeline is built

use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::Config;
use crate::core::errors::PipelineResult;
use crate::services::detection::{build_ocr_engine, OcrEngine};
use crate::services::rendering::{CosmicTextEngine, FontRegistry, TextEngine};
use crate::services::translation::{build_translation_backend, TranslationBackend, TranslationCache};
use crate::utils::metrics::Metrics;

/// The external capabilities one pipeline runs on.
///
/// Absent OCR or translation is not an error: the affected images come back
/// `Degraded`. The text engine and font registry are always present; a
/// missing font is only discovered per image.
#[derive(Clone)]
pub struct Capabilities {
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub translation: Option<Arc<dyn TranslationBackend>>,
    pub text_engine: Arc<dyn TextEngine>,
    pub fonts: Arc<FontRegistry>,
    pub cache: Option<TranslationCache>,
}

impl Capabilities {
    /// Only a text engine and fonts; OCR and translation left out.
    pub fn new(text_engine: Arc<dyn TextEngine>, fonts: Arc<FontRegistry>) -> Self {
        Self {
            ocr: None,
            translation: None,
            text_engine,
            fonts,
            cache: None,
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_translation(mut self, backend: Arc<dyn TranslationBackend>) -> Self {
        self.translation = Some(backend);
        self
    }

    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build every capability named in `config`.
    ///
    /// Backends that cannot start are logged and left out. Only a cache
    /// directory that cannot be created fails the whole build.
    pub async fn from_config(config: &Config, metrics: &Metrics) -> PipelineResult<Self> {
        let ocr = match build_ocr_engine(&config.detection) {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("OCR unavailable, images will pass through unchanged: {}", e);
                None
            }
        };

        let translation = match build_translation_backend(&config.translation) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Translation backend failed to start, regions keep source text: {}", e);
                None
            }
        };

        let cache = if config.cache.enabled {
            let cache = TranslationCache::from_config(&config.cache, Some(metrics.clone())).await?;
            info!(entries = cache.len(), dir = %config.cache.cache_dir, "Translation cache ready");
            Some(cache)
        } else {
            None
        };

        let fonts = Arc::new(FontRegistry::from_config(&config.rendering));
        let target_script = config.target_script();
        if !fonts.is_available(target_script) {
            warn!(script = %target_script, "No font configured for the target script; rendering will fail");
        }

        Ok(Self {
            ocr,
            translation,
            text_engine: Arc::new(CosmicTextEngine::new()),
            fonts,
            cache,
        })
    }
}

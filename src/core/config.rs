use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::types::Script;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
}

/// OCR backends selectable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendKind {
    Ocrs,
    Disabled,
}

impl FromStr for OcrBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ocrs" => Ok(OcrBackendKind::Ocrs),
            "disabled" | "none" | "off" => Ok(OcrBackendKind::Disabled),
            other => Err(ConfigError::UnknownVariant {
                key: "OCR_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Translation backends selectable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationBackendKind {
    Google,
    Chat,
    Disabled,
}

impl FromStr for TranslationBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(TranslationBackendKind::Google),
            "chat" | "openai" => Ok(TranslationBackendKind::Chat),
            "disabled" | "none" | "off" => Ok(TranslationBackendKind::Disabled),
            other => Err(ConfigError::UnknownVariant {
                key: "TRANSLATION_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Inpainting algorithms selectable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintMethod {
    FastMarching,
    Diffusion,
    Disabled,
}

impl InpaintMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            InpaintMethod::FastMarching => "fast_marching",
            InpaintMethod::Diffusion => "diffusion",
            InpaintMethod::Disabled => "disabled",
        }
    }
}

impl FromStr for InpaintMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast_marching" | "telea" => Ok(InpaintMethod::FastMarching),
            "diffusion" | "ns" => Ok(InpaintMethod::Diffusion),
            "disabled" | "none" | "off" => Ok(InpaintMethod::Disabled),
            other => Err(ConfigError::UnknownVariant {
                key: "INPAINT_METHOD",
                value: other.to_string(),
            }),
        }
    }
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub backend: OcrBackendKind,
    pub model_dir: PathBuf,
    pub confidence_threshold: f32,
    /// Overlap above which identical text from neighbouring tiles is merged
    pub iou_threshold: f32,
    /// Longest side processed in one OCR call; 0 disables tiling
    pub tile_size: u32,
    pub tile_overlap: u32,
    pub timeout: Duration,
}

/// Translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub backend: TranslationBackendKind,
    pub target_language: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_concurrent: usize,
    pub circuit_failure_threshold: usize,
    pub circuit_cooldown: Duration,
}

/// Erasure configuration
#[derive(Debug, Clone)]
pub struct ErasureConfig {
    /// Box growth on each side, as a fraction of box height (vertical) and width (horizontal)
    pub margin: f32,
    pub method: InpaintMethod,
    pub radius: u32,
    pub diffusion_iterations: u32,
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    pub font_dir: PathBuf,
    pub fonts: HashMap<Script, PathBuf>,
    pub min_font_size: f32,
    pub max_font_size: f32,
    pub padding: f32,
    pub text_stroke_enabled: bool,
    pub text_stroke_width: i32,
}

/// Batch processing configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Bound on concurrent CPU-heavy stages (OCR, inpainting, rasterisation)
    pub worker_count: usize,
    /// Bound on images in flight at once
    pub max_batch_size: usize,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub cache_dir: String,
    pub max_entries: usize,
    /// Debounce for writing the cache file; zero saves only on demand
    pub save_interval: Duration,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub detection: DetectionConfig,
    pub translation: TranslationConfig,
    pub erasure: ErasureConfig,
    pub rendering: RenderingConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn string_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::load(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults only.
    pub fn defaults() -> ConfigResult<Self> {
        Self::from_lookup(|_| None)
    }

    fn load<F>(lookup: &F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let font_dir = PathBuf::from(string_or(lookup, "FONT_DIR", "fonts"));
        let mut fonts = HashMap::new();
        fonts.insert(
            Script::Arabic,
            PathBuf::from(string_or(lookup, "ARABIC_FONT_PATH", "fonts/Amiri-Regular.ttf")),
        );
        fonts.insert(
            Script::Latin,
            PathBuf::from(string_or(lookup, "LATIN_FONT_PATH", "fonts/NotoSans-Regular.ttf")),
        );
        fonts.insert(
            Script::Cyrillic,
            PathBuf::from(string_or(lookup, "CYRILLIC_FONT_PATH", "fonts/NotoSans-Regular.ttf")),
        );
        if let Some(path) = optional(lookup, "HEBREW_FONT_PATH") {
            fonts.insert(Script::Hebrew, PathBuf::from(path));
        }
        if let Some(path) = optional(lookup, "CJK_FONT_PATH") {
            fonts.insert(Script::Cjk, PathBuf::from(path));
        }

        Ok(Self {
            logging: LoggingConfig { log_level },
            detection: DetectionConfig {
                backend: string_or(lookup, "OCR_BACKEND", "ocrs").parse()?,
                model_dir: PathBuf::from(string_or(lookup, "OCR_MODEL_DIR", "models/ocr")),
                confidence_threshold: parsed(lookup, "CONFIDENCE_THRESHOLD", 0.3),
                iou_threshold: parsed(lookup, "IOU_THRESHOLD", 0.7),
                tile_size: parsed(lookup, "OCR_TILE_SIZE", 4096),
                tile_overlap: parsed(lookup, "OCR_TILE_OVERLAP", 64),
                timeout: Duration::from_secs(parsed(lookup, "OCR_TIMEOUT_SECONDS", 60)),
            },
            translation: TranslationConfig {
                backend: string_or(lookup, "TRANSLATION_BACKEND", "google").parse()?,
                target_language: string_or(lookup, "TARGET_LANGUAGE", "ar"),
                endpoint: optional(lookup, "TRANSLATION_ENDPOINT"),
                api_key: optional(lookup, "TRANSLATION_API_KEY"),
                model: string_or(lookup, "TRANSLATION_MODEL", "gpt-4o-mini"),
                timeout: Duration::from_secs(parsed(lookup, "TRANSLATION_TIMEOUT_SECONDS", 30)),
                max_retries: parsed(lookup, "MAX_RETRIES", 3),
                max_concurrent: parsed(lookup, "MAX_CONCURRENT_TRANSLATIONS", 16),
                circuit_failure_threshold: parsed(lookup, "CIRCUIT_FAILURE_THRESHOLD", 5),
                circuit_cooldown: Duration::from_secs(parsed(lookup, "CIRCUIT_COOLDOWN_SECONDS", 60)),
            },
            erasure: ErasureConfig {
                margin: parsed(lookup, "ERASE_MARGIN", 0.15),
                method: string_or(lookup, "INPAINT_METHOD", "fast_marching").parse()?,
                radius: parsed(lookup, "INPAINT_RADIUS", 5),
                diffusion_iterations: parsed(lookup, "DIFFUSION_ITERATIONS", 60),
            },
            rendering: RenderingConfig {
                font_dir,
                fonts,
                min_font_size: parsed(lookup, "MIN_FONT_SIZE", 8.0),
                max_font_size: parsed(lookup, "MAX_FONT_SIZE", 200.0),
                padding: parsed(lookup, "FONT_SIZE_PADDING", 0.1),
                text_stroke_enabled: parsed(lookup, "TEXT_STROKE_ENABLED", false),
                text_stroke_width: parsed(lookup, "TEXT_STROKE_WIDTH", 2),
            },
            batch: BatchConfig {
                worker_count: parsed(lookup, "WORKER_COUNT", num_cpus::get()),
                max_batch_size: parsed(lookup, "MAX_BATCH_SIZE", 50),
            },
            cache: CacheConfig {
                enabled: parsed(lookup, "TRANSLATION_CACHE_ENABLED", true),
                cache_dir: string_or(lookup, "CACHE_DIR", ".cache"),
                max_entries: parsed(lookup, "TRANSLATION_CACHE_SIZE", 10_000),
                save_interval: Duration::from_secs(parsed(lookup, "CACHE_SAVE_INTERVAL_SECONDS", 30)),
            },
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.detection.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(self.detection.iou_threshold));
        }

        if self.detection.tile_size > 0 && self.detection.tile_overlap >= self.detection.tile_size {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "tile_overlap ({}) must be smaller than tile_size ({})",
                self.detection.tile_overlap, self.detection.tile_size
            )));
        }

        if self.translation.target_language.is_empty() {
            return Err(ConfigError::InvalidTranslationConfig(
                "target_language must not be empty".to_string(),
            ));
        }
        if self.translation.max_concurrent == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "max_concurrent_translations must be > 0".to_string(),
            ));
        }
        if self.translation.endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return Err(ConfigError::InvalidTranslationConfig(
                "TRANSLATION_ENDPOINT must not be empty when set".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.erasure.margin) {
            return Err(ConfigError::InvalidErasureConfig(format!(
                "margin must be between 0.0 and 1.0, got {}",
                self.erasure.margin
            )));
        }
        if self.erasure.radius == 0 {
            return Err(ConfigError::InvalidErasureConfig(
                "inpaint radius must be > 0".to_string(),
            ));
        }

        let r = &self.rendering;
        if r.min_font_size <= 0.0 || r.max_font_size <= 0.0 {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "font sizes must be positive, got min={} max={}",
                r.min_font_size, r.max_font_size
            )));
        }
        if r.min_font_size > r.max_font_size {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "min_font_size ({}) exceeds max_font_size ({})",
                r.min_font_size, r.max_font_size
            )));
        }
        if !(0.0..0.5).contains(&r.padding) {
            return Err(ConfigError::InvalidRenderingConfig(format!(
                "padding must be in [0.0, 0.5), got {}",
                r.padding
            )));
        }

        if self.batch.worker_count == 0 {
            return Err(ConfigError::InvalidBatchConfig("worker_count must be > 0".to_string()));
        }
        if self.batch.max_batch_size == 0 {
            return Err(ConfigError::InvalidBatchConfig("max_batch_size must be > 0".to_string()));
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "translation cache size must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        self.logging.log_level
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.detection.confidence_threshold
    }

    pub fn target_language(&self) -> &str {
        &self.translation.target_language
    }

    /// Script the target language is written in.
    pub fn target_script(&self) -> Script {
        Script::for_language(&self.translation.target_language)
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache.cache_dir
    }

    pub fn worker_count(&self) -> usize {
        self.batch.worker_count
    }

    pub fn max_batch_size(&self) -> usize {
        self.batch.max_batch_size
    }

    pub fn text_stroke_width(&self) -> Option<i32> {
        self.rendering
            .text_stroke_enabled
            .then_some(self.rendering.text_stroke_width)
    }
}

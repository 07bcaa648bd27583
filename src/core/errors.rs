// Error types for each pipeline component
//
// Component errors never escape `process`/`process_batch`; the orchestrator
// maps them onto per-image `ProcessStatus` values.

use thiserror::Error;

use crate::core::types::{PipelineState, Script};

/// Region detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("OCR capability unavailable: {0}")]
    Unavailable(String),

    #[error("OCR call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("OCR inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("Detection task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Translation errors, both batch-level and per entry
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("API request failed: {0}")]
    ApiRequestFailed(#[from] reqwest::Error),

    #[error("Translation API returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No translation returned for entry {id}")]
    MissingEntry { id: usize },

    #[error("Translation of entry {index} failed: {reason}")]
    EntryFailed { index: usize, reason: String },

    #[error("Translation batch timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Translation circuit is open")]
    CircuitOpen,

    #[error("Backend returned {actual} translations for {expected} inputs")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Translation backend not configured: {0}")]
    NotConfigured(String),
}

/// Background reconstruction errors
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("Inpainting is unavailable (method disabled)")]
    InpaintingUnavailable,

    #[error("Mask covers the whole image; no known pixels to inpaint from")]
    NoKnownPixels,

    #[error("Erasure task join failed: {0}")]
    TaskJoinFailed(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Text layout and rendering errors
#[derive(Debug, Error)]
pub enum RenderingError {
    #[error("No font available for script {script} (configured path: {path:?})")]
    FontMissing {
        script: Script,
        path: Option<String>,
    },

    #[error("Font loading failed: {0}")]
    FontLoadError(String),

    #[error("Image processing failed: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid region dimensions: {0}")]
    InvalidRegion(String),

    #[error("Rendering task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Translation cache storage errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to load cache from {path}: {source}")]
    LoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to save cache to {path}: {source}")]
    SaveFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Cache serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Cache directory creation failed: {0}")]
    DirectoryCreationFailed(std::io::Error),

    #[error("Cache capacity must be > 0")]
    ZeroCapacity,
}

/// Orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Illegal state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("Capability initialization failed: {0}")]
    Initialization(String),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Erasure(#[from] ErasureError),

    #[error(transparent)]
    Rendering(#[from] RenderingError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Invalid erasure config: {0}")]
    InvalidErasureConfig(String),

    #[error("Invalid rendering config: {0}")]
    InvalidRenderingConfig(String),

    #[error("Invalid batch config: {0}")]
    InvalidBatchConfig(String),

    #[error("Unknown value {value:?} for {key}")]
    UnknownVariant { key: &'static str, value: String },
}

pub type DetectionResult<T> = Result<T, DetectionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type ErasureResult<T> = Result<T, ErasureError>;
pub type RenderingResult<T> = Result<T, RenderingError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

// Library exports for the image text translation pipeline
//
// Module layout: core (data model, config, errors), services (the four
// stages), middleware (resilience), orchestration (per-image pipeline)

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{
        CacheError, ConfigError, DetectionError, ErasureError, PipelineError, RenderingError, TranslationError,
    },
    types::{
        BatchAnalytics, BatchResult, DegradedReason, FailureReason, HealthReport, ImageOutcome, ImageReport,
        PipelineState, ProcessStatus, RawDetection, RegionGeometry, Script, TextRegion,
    },
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{CancellationHandle, Capabilities, PipelineOrchestrator};

pub use services::{
    BatchTranslation, CosmicTextEngine, EntryOutcome, ErasureOutcome, FallbackReason, FontRegistry, OcrEngine,
    RegionDetector, RegionEraser, RenderPlan, TextEngine, TextLayoutRenderer, TranslationBackend,
    TranslationCache, Translator,
};

pub use utils::{load_image_async, Metrics, MetricsSnapshot};

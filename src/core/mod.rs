pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    CacheError, ConfigError, DetectionError, ErasureError, PipelineError, RenderingError,
    TranslationError,
};
pub use types::{
    BatchAnalytics, BatchResult, DegradedReason, FailureReason, HealthReport, ImageOutcome,
    ImageReport, PipelineState, ProcessStatus, RawDetection, RegionGeometry, Script, TextRegion,
};

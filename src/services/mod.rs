pub mod detection;
pub mod erasure;
pub mod rendering;
pub mod translation;

// Re-export the stage components
pub use detection::{OcrEngine, RegionDetector};
pub use erasure::{ErasureOutcome, RegionEraser};
pub use rendering::{CosmicTextEngine, FontRegistry, RenderPlan, TextEngine, TextLayoutRenderer};
pub use translation::{
    BatchTranslation, EntryOutcome, FallbackReason, TranslationBackend, TranslationCache, Translator,
};

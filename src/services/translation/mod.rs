// Translation stage: wraps a backend with caching, a circuit breaker, a
// batch timeout and per-entry fallback to the source text.

pub mod backend;
pub mod cache;
pub mod chat;
pub mod google;

pub use backend::{build_translation_backend, TranslationBackend};
pub use cache::TranslationCache;
pub use chat::ChatCompletionBackend;
pub use google::GoogleTranslateBackend;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::utils::Metrics;

/// Why an entry kept its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The backend answered the batch but not this entry
    EntryFailed(String),
    /// The whole batch call failed
    BatchFailed(String),
    Timeout,
    CircuitOpen,
    BackendUnavailable,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::EntryFailed(e) => write!(f, "entry failed: {}", e),
            FallbackReason::BatchFailed(e) => write!(f, "batch failed: {}", e),
            FallbackReason::Timeout => f.write_str("timed out"),
            FallbackReason::CircuitOpen => f.write_str("circuit open"),
            FallbackReason::BackendUnavailable => f.write_str("no translation backend"),
        }
    }
}

/// Result for one input string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Translated(String),
    Cached(String),
    /// Nothing to translate (digits, punctuation, whitespace)
    Unchanged(String),
    FellBack {
        original: String,
        reason: FallbackReason,
    },
}

impl EntryOutcome {
    pub fn text(&self) -> &str {
        match self {
            EntryOutcome::Translated(t) | EntryOutcome::Cached(t) | EntryOutcome::Unchanged(t) => t,
            EntryOutcome::FellBack { original, .. } => original,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            EntryOutcome::Translated(t) | EntryOutcome::Cached(t) | EntryOutcome::Unchanged(t) => t,
            EntryOutcome::FellBack { original, .. } => original,
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, EntryOutcome::Translated(_) | EntryOutcome::Cached(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EntryOutcome::FellBack { .. })
    }
}

/// Outcomes for one batch, positionally aligned with the input.
#[derive(Debug, Clone, Default)]
pub struct BatchTranslation {
    pub outcomes: Vec<EntryOutcome>,
}

impl BatchTranslation {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn translated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_translated()).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fallback()).count()
    }

    /// Every entry that needed translating fell back.
    pub fn all_fell_back(&self) -> bool {
        self.fallback_count() > 0 && self.translated_count() == 0
    }

    /// Distinct fallback reasons, for warnings.
    pub fn fallback_reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = Vec::new();
        for outcome in &self.outcomes {
            if let EntryOutcome::FellBack { reason, .. } = outcome {
                let reason = reason.to_string();
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
        reasons
    }

    pub fn into_strings(self) -> Vec<String> {
        self.outcomes.into_iter().map(EntryOutcome::into_text).collect()
    }
}

/// Whether a string has anything a translator could change.
pub fn needs_translation(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

pub struct Translator {
    backend: Option<Arc<dyn TranslationBackend>>,
    cache: Option<TranslationCache>,
    circuit_breaker: CircuitBreaker,
    target_language: String,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl Translator {
    pub fn new(
        backend: Option<Arc<dyn TranslationBackend>>,
        cache: Option<TranslationCache>,
        config: &TranslationConfig,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            backend,
            cache,
            circuit_breaker: CircuitBreaker::with_config(
                "translation",
                CircuitBreakerConfig::from(config),
            ),
            target_language: config.target_language.clone(),
            timeout: config.timeout,
            metrics,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("disabled")
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn cache(&self) -> Option<&TranslationCache> {
        self.cache.as_ref()
    }

    /// Translate into the configured target language.
    pub async fn translate(&self, texts: &[String]) -> BatchTranslation {
        self.translate_to(texts, &self.target_language).await
    }

    /// Plain-string form: one output per input, source text on fallback.
    pub async fn translate_strings(&self, texts: &[String], target_language: &str) -> Vec<String> {
        self.translate_to(texts, target_language).await.into_strings()
    }

    /// Translate `texts` into `target_language`.
    ///
    /// Never fails: the result always has one outcome per input, in input
    /// order, and any entry the backend could not translate keeps its
    /// source text.
    #[instrument(skip(self, texts), fields(batch_size = texts.len(), target = target_language))]
    pub async fn translate_to(&self, texts: &[String], target_language: &str) -> BatchTranslation {
        let mut slots: Vec<Option<EntryOutcome>> = vec![None; texts.len()];
        let mut pending_idx = Vec::new();
        let mut pending = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if !needs_translation(text) {
                slots[i] = Some(EntryOutcome::Unchanged(text.clone()));
                continue;
            }
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(text, target_language)) {
                slots[i] = Some(EntryOutcome::Cached(hit));
                continue;
            }
            pending_idx.push(i);
            pending.push(text.clone());
        }

        if !pending.is_empty() {
            debug!(pending = pending.len(), "Calling translation backend");
            match self.call_backend(&pending, target_language).await {
                Ok(results) => {
                    for ((i, original), result) in pending_idx.iter().zip(pending).zip(results) {
                        slots[*i] = Some(self.settle_entry(original, result, target_language));
                    }
                }
                Err(reason) => {
                    warn!("Translation batch fell back to source text: {}", reason);
                    for (i, original) in pending_idx.iter().zip(pending) {
                        slots[*i] = Some(EntryOutcome::FellBack {
                            original,
                            reason: reason.clone(),
                        });
                    }
                }
            }
        }

        let outcomes: Vec<EntryOutcome> = slots
            .into_iter()
            .zip(texts)
            .map(|(slot, text)| {
                slot.unwrap_or_else(|| EntryOutcome::FellBack {
                    original: text.clone(),
                    reason: FallbackReason::EntryFailed("no result".into()),
                })
            })
            .collect();

        let batch = BatchTranslation { outcomes };
        if let Some(ref m) = self.metrics {
            m.record_translations(batch.translated_count(), batch.fallback_count());
        }
        batch
    }

    fn settle_entry(
        &self,
        original: String,
        result: TranslationResult<String>,
        target_language: &str,
    ) -> EntryOutcome {
        match result {
            Ok(translated) if !translated.trim().is_empty() => {
                if let Some(ref cache) = self.cache {
                    cache.put(&original, target_language, &translated);
                }
                EntryOutcome::Translated(translated)
            }
            Ok(_) => EntryOutcome::FellBack {
                original,
                reason: FallbackReason::EntryFailed("empty translation".into()),
            },
            Err(e) => {
                debug!("Entry fell back: {}", e);
                EntryOutcome::FellBack {
                    original,
                    reason: FallbackReason::EntryFailed(e.to_string()),
                }
            }
        }
    }

    /// One guarded backend call. Any `Err` means the whole batch falls back.
    async fn call_backend(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> Result<Vec<TranslationResult<String>>, FallbackReason> {
        let Some(ref backend) = self.backend else {
            return Err(FallbackReason::BackendUnavailable);
        };

        if !self.circuit_breaker.allow_request() {
            return Err(FallbackReason::CircuitOpen);
        }

        let outcome = tokio::time::timeout(self.timeout, backend.translate_batch(texts, target_language)).await;
        let error = match outcome {
            Ok(Ok(results)) if results.len() == texts.len() => {
                self.circuit_breaker.record_success();
                return Ok(results);
            }
            Ok(Ok(results)) => TranslationError::LengthMismatch {
                expected: texts.len(),
                actual: results.len(),
            },
            Ok(Err(e)) => e,
            Err(_) => TranslationError::Timeout {
                seconds: self.timeout.as_secs(),
            },
        };

        self.record_batch_failure();
        Err(match error {
            TranslationError::Timeout { .. } => FallbackReason::Timeout,
            other => FallbackReason::BatchFailed(other.to_string()),
        })
    }

    fn record_batch_failure(&self) {
        let tripped = self.circuit_breaker.record_failure();
        if let Some(ref m) = self.metrics {
            m.record_translation_batch_failure();
            if tripped {
                m.record_circuit_breaker_trip();
            }
        }
    }
}

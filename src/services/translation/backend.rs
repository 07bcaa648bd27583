// Translation capability trait, backend selection and shared retry policy

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::chat::ChatCompletionBackend;
use super::google::GoogleTranslateBackend;
use crate::core::config::{TranslationBackendKind, TranslationConfig};
use crate::core::errors::{TranslationError, TranslationResult};

const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 8000;

/// A translation capability.
///
/// The outer `Result` is the batch call as a whole; each inner `Result` is
/// one entry. On `Ok` the inner vector must have one element per input, in
/// input order.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn translate_batch(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>>;
}

/// Build the backend named by `config.backend`; `None` when disabled.
pub fn build_translation_backend(
    config: &TranslationConfig,
) -> TranslationResult<Option<Arc<dyn TranslationBackend>>> {
    let backend: Option<Arc<dyn TranslationBackend>> = match config.backend {
        TranslationBackendKind::Disabled => None,
        TranslationBackendKind::Google => Some(Arc::new(GoogleTranslateBackend::new(config)?)),
        TranslationBackendKind::Chat => Some(Arc::new(ChatCompletionBackend::new(config)?)),
    };

    match &backend {
        Some(b) => info!(backend = b.name(), target = %config.target_language, "Translation backend ready"),
        None => info!("Translation disabled; regions keep their source text"),
    }
    Ok(backend)
}

/// Whether an error is worth another attempt.
pub(crate) fn is_retryable(error: &TranslationError) -> bool {
    match error {
        TranslationError::ApiRequestFailed(e) => e.is_timeout() || e.is_connect(),
        TranslationError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_retries` extra attempts have been spent. Backoff doubles from
/// 500ms up to 8s with up to 25% jitter.
pub(crate) async fn with_retries<T, F, Fut>(
    label: &str,
    max_retries: u32,
    mut attempt: F,
) -> TranslationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TranslationResult<T>>,
{
    let mut delay_ms = INITIAL_RETRY_DELAY_MS;
    let mut tries = 0u32;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if tries < max_retries && is_retryable(&e) => {
                tries += 1;
                let jitter = rand::thread_rng().gen_range(0..=delay_ms / 4);
                warn!(
                    backend = label,
                    attempt = tries,
                    delay_ms = delay_ms + jitter,
                    "Retrying after error: {}",
                    e
                );
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
            }
            Err(e) => return Err(e),
        }
    }
}

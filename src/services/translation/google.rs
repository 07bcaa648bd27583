// Google Translate web endpoint backend
// One request per entry so every entry gets its own source-language detection

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use super::backend::{with_retries, TranslationBackend};
use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};

const DEFAULT_GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

pub struct GoogleTranslateBackend {
    endpoint: String,
    max_retries: u32,
    http_client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl GoogleTranslateBackend {
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_concurrent)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_GOOGLE_ENDPOINT.to_string()),
            max_retries: config.max_retries,
            http_client,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    async fn request_one(&self, text: &str, target_language: &str) -> TranslationResult<String> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_language),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslationError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        parse_gtx_response(&value, text, target_language)
    }

    async fn translate_one(&self, text: &str, target_language: &str) -> TranslationResult<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TranslationError::NotConfigured("translation pool closed".into()))?;

        with_retries("google", self.max_retries, || self.request_one(text, target_language)).await
    }
}

/// Extract the translation from a `translate_a/single` response.
///
/// The body is a nested array: `[0]` holds `[translated, source, ..]`
/// segments, `[2]` the detected source language. Text already in the
/// target language is returned as given.
pub(crate) fn parse_gtx_response(value: &Value, original: &str, target_language: &str) -> TranslationResult<String> {
    let segments = value
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::InvalidResponse("missing translation segments".into()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    let detected = value.get(2).and_then(Value::as_str);
    if detected.is_some_and(|lang| same_language(lang, target_language)) {
        debug!(detected = ?detected, "Source already in target language");
        return Ok(original.to_string());
    }

    if translated.trim().is_empty() {
        return Err(TranslationError::InvalidResponse("empty translation".into()));
    }
    Ok(translated)
}

fn same_language(a: &str, b: &str) -> bool {
    let primary = |code: &str| {
        code.split(['-', '_'])
            .next()
            .unwrap_or(code)
            .to_ascii_lowercase()
    };
    primary(a) == primary(b)
}

#[async_trait]
impl TranslationBackend for GoogleTranslateBackend {
    fn name(&self) -> &str {
        "google"
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = join_all(
            texts
                .iter()
                .map(|text| self.translate_one(text, target_language)),
        )
        .await;

        // Nothing got through: report it as one failed call so the caller's
        // circuit breaker sees it.
        if results.iter().all(|r| r.is_err()) {
            if let Some(Err(first)) = results.drain(..1).next() {
                return Err(first);
            }
        }
        Ok(results)
    }
}

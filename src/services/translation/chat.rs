// OpenAI-compatible chat completion backend
// Batches every entry of a call into a single request with structured JSON output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::backend::{with_retries, TranslationBackend};
use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};

const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Chat completion client
pub struct ChatCompletionBackend {
    api_key: String,
    endpoint: String,
    model: String,
    max_retries: u32,
    http_client: reqwest::Client,
    // In-flight requests across every caller of this backend
    permits: Arc<Semaphore>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct JsonSchema {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchema,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    completion_tokens: u32,
    total_tokens: u32,
}

/// Structured output schema for translations
#[derive(Debug, Deserialize)]
struct TranslationsResponse {
    translations: Vec<TranslationItem>,
}

#[derive(Debug, Deserialize)]
struct TranslationItem {
    id: usize,
    text: String,
}

impl ChatCompletionBackend {
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                TranslationError::NotConfigured("TRANSLATION_API_KEY is required for the chat backend".into())
            })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_key,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_CHAT_ENDPOINT.to_string()),
            model: config.model.clone(),
            max_retries: config.max_retries,
            http_client,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    fn build_translation_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "translations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {
                                "type": "integer",
                                "description": "The entry id from the input"
                            },
                            "text": {
                                "type": "string",
                                "description": "The translated text"
                            }
                        },
                        "required": ["id", "text"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["translations"],
            "additionalProperties": false
        })
    }

    fn build_request(&self, texts: &[String], target_language: &str) -> TranslationResult<ChatCompletionRequest> {
        let input_items: Vec<serde_json::Value> = texts
            .iter()
            .enumerate()
            .map(|(id, text)| json!({"id": id, "text": text}))
            .collect();
        let input_json = serde_json::to_string(&input_items)
            .map_err(|e| TranslationError::InvalidResponse(format!("failed to encode input: {}", e)))?;

        let system_prompt = format!(
            "You are a translator. Each input entry may be in a different language; \
             detect its language independently and translate it into the language \
             with code '{}'. Fix obvious OCR errors. Do not add explanations. \
             Return translations in the exact JSON format specified.",
            target_language
        );
        let user_prompt = format!(
            "Translate each entry into '{}'. Input:\n{}",
            target_language, input_json
        );

        Ok(ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            stream: false,
            temperature: 0.2,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchema {
                    name: "translation_response".to_string(),
                    strict: true,
                    schema: Self::build_translation_schema(),
                },
            },
        })
    }

    async fn send(&self, request: &ChatCompletionRequest) -> TranslationResult<ChatCompletionResponse> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
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

        Ok(response.json::<ChatCompletionResponse>().await?)
    }
}

/// Map the model's structured content back onto input positions.
///
/// Ids the model skipped become `MissingEntry`; empty strings and unknown
/// ids are ignored.
fn parse_structured_content(content: &str, expected: usize) -> TranslationResult<Vec<TranslationResult<String>>> {
    let parsed: TranslationsResponse = serde_json::from_str(content)
        .map_err(|e| TranslationError::InvalidResponse(format!("structured output: {}", e)))?;

    let mut by_id: HashMap<usize, String> = parsed
        .translations
        .into_iter()
        .filter(|item| item.id < expected && !item.text.trim().is_empty())
        .map(|item| (item.id, item.text))
        .collect();

    Ok((0..expected)
        .map(|id| {
            by_id.remove(&id).ok_or_else(|| {
                warn!("Chat: missing translation for entry {}", id);
                TranslationError::MissingEntry { id }
            })
        })
        .collect())
}

#[async_trait]
impl TranslationBackend for ChatCompletionBackend {
    fn name(&self) -> &str {
        "chat"
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        target_language: &str,
    ) -> TranslationResult<Vec<TranslationResult<String>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "Chat: translating {} entries to {} (model {})",
            texts.len(),
            target_language,
            self.model
        );

        let request = self.build_request(texts, target_language)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TranslationError::NotConfigured("translation pool closed".into()))?;
        let start = Instant::now();
        let response = with_retries("chat", self.max_retries, || self.send(&request)).await?;
        let elapsed = start.elapsed();

        if let Some(usage) = &response.usage {
            info!(
                "Chat: {} tokens in {:.2}s ({:.0} tok/s)",
                usage.total_tokens,
                elapsed.as_secs_f64(),
                usage.completion_tokens as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }

        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| TranslationError::InvalidResponse("response has no choices".into()))?;

        let results = parse_structured_content(content, texts.len())?;
        debug!(
            "Chat: {} of {} entries translated",
            results.iter().filter(|r| r.is_ok()).count(),
            texts.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, TranslationBackendKind};

    fn chat_config() -> TranslationConfig {
        let mut config = Config::defaults().unwrap().translation;
        config.backend = TranslationBackendKind::Chat;
        config.api_key = Some("test-key".into());
        config
    }

    #[test]
    fn test_parse_structured_response() {
        let content = r#"{"translations":[{"id":0,"text":"Hello world"},{"id":1,"text":"How are you?"},{"id":2,"text":"Good morning"}]}"#;
        let results = parse_structured_content(content, 3).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), "Hello world");
        assert_eq!(results[2].as_ref().unwrap(), "Good morning");
    }

    #[test]
    fn test_missing_and_out_of_order_ids() {
        let content = r#"{"translations":[{"id":2,"text":"two"},{"id":0,"text":"zero"},{"id":9,"text":"stray"}]}"#;
        let results = parse_structured_content(content, 3).unwrap();

        assert_eq!(results[0].as_ref().unwrap(), "zero");
        assert!(matches!(results[1], Err(TranslationError::MissingEntry { id: 1 })));
        assert_eq!(results[2].as_ref().unwrap(), "two");
    }

    #[test]
    fn test_malformed_content_is_batch_error() {
        assert!(matches!(
            parse_structured_content("not json", 2),
            Err(TranslationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_schema_generation() {
        let schema = ChatCompletionBackend::build_translation_schema();
        assert!(schema.get("properties").is_some());
        assert!(schema.get("required").is_some());
    }

    #[test]
    fn test_requires_api_key() {
        let mut config = chat_config();
        config.api_key = None;
        assert!(matches!(
            ChatCompletionBackend::new(&config),
            Err(TranslationError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_endpoint_defaults_when_unset() {
        let mut config = chat_config();
        config.endpoint = None;
        let backend = ChatCompletionBackend::new(&config).unwrap();
        assert_eq!(backend.endpoint, DEFAULT_CHAT_ENDPOINT);

        config.endpoint = Some("http://localhost:8080/v1/chat/completions".into());
        let backend = ChatCompletionBackend::new(&config).unwrap();
        assert_eq!(backend.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_carries_ids_and_target() {
        let backend = ChatCompletionBackend::new(&chat_config()).unwrap();
        let request = backend
            .build_request(&["HELLO".to_string(), "WORLD".to_string()], "ar")
            .unwrap();

        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.contains(r#""id":1"#));
        assert!(request.messages[0].content.contains("'ar'"));
    }
}

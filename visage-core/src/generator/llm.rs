//! Chat-completion providers used by the response generator.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::GenerationError;

/// One chat completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service to emit a single JSON object.
    pub json_mode: bool,
}

/// Trait for LLM providers. Returns the raw assistant content.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// OpenAI chat completions API provider.
pub struct OpenAiChatProvider {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    /// Map an HTTP status code to the appropriate GenerationError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                GenerationError::AuthFailed {
                    provider: "openai".to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... Please try again in 7s."
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                    .and_then(|msg| {
                        msg.split("in ").last().and_then(|s| {
                            s.trim_end_matches('.')
                                .trim_end_matches('s')
                                .parse::<f64>()
                                .ok()
                        })
                    })
                    .map(|secs| secs.ceil() as u64)
                    .unwrap_or(5);
                GenerationError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            code if code >= 500 => GenerationError::ApiRequest {
                message: format!("Server error ({status}): {body}"),
            },
            _ => GenerationError::Validation {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    fn parse_content(json: &Value) -> Result<String, GenerationError> {
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "response has no message content".to_string(),
            })
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);

        debug!(url = %url, model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    GenerationError::ApiRequest {
                        message: format!("Request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| GenerationError::ApiRequest {
                message: format!("Failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| GenerationError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;
        Self::parse_content(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// A mock LLM provider replaying queued results.
pub struct MockLlmProvider {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    call_count: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::with_results(Vec::new())
    }

    /// A mock answering every queued call with the given content.
    pub fn with_response(content: &str) -> Self {
        Self::with_results(vec![Ok(content.to_string())])
    }

    pub fn with_results(results: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Queue a well-formed reply built from `(text, expression, animation)` triples.
    pub fn reply(messages: &[(&str, &str, &str)]) -> String {
        let messages: Vec<Value> = messages
            .iter()
            .map(|(text, expression, animation)| {
                json!({"text": text, "facialExpression": expression, "animation": animation})
            })
            .collect();
        json!({ "messages": messages }).to_string()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GenerationError::ApiRequest {
                    message: "no mock responses queued".into(),
                })
            })
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

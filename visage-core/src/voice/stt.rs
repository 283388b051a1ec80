//! Speech-to-text provider trait and implementations.
//!
//! The `SttProvider` trait is the narrow boundary to the external
//! transcription service. `OpenAiWhisperProvider` talks to the Whisper HTTP
//! API; `MockSttProvider` replays queued results for tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::TranscriptionError;
use crate::language::LanguageTag;

/// How much detail to request from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Segments with per-segment speech probabilities.
    Verbose,
    /// Bare transcript text; the simplified fallback call.
    PlainText,
}

/// One call to the transcription service.
#[derive(Debug, Clone)]
pub struct SttRequest {
    pub audio: Bytes,
    pub file_name: String,
    pub content_type: String,
    /// Language hint; `None` lets the service auto-detect.
    pub language: Option<LanguageTag>,
    /// Contextual prompt nudging vocabulary and punctuation.
    pub prompt: Option<String>,
    pub mode: ResponseMode,
}

/// Raw service output, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SttResponse {
    pub text: String,
    /// Language as reported by the service (a name like "english" or a code).
    pub language: Option<String>,
    /// `no_speech_prob` of each segment, when the service reported segments.
    pub no_speech_probs: Vec<f32>,
    pub duration_secs: Option<f32>,
}

impl SttResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Trait for speech-to-text providers.
#[async_trait]
pub trait SttProvider: Send + Sync {
    /// Transcribe one uploaded audio file.
    async fn transcribe(&self, request: &SttRequest) -> Result<SttResponse, TranscriptionError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// A mock STT provider for testing.
pub struct MockSttProvider {
    responses: Mutex<VecDeque<Result<SttResponse, TranscriptionError>>>,
    requests: Mutex<Vec<SttRequest>>,
    call_count: AtomicUsize,
}

impl MockSttProvider {
    /// Create a new mock that returns errors (no responses queued).
    pub fn new() -> Self {
        Self::with_results(Vec::new())
    }

    /// Create a mock with pre-configured successful responses.
    pub fn with_responses(responses: Vec<SttResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Create a mock replaying a mix of successes and failures.
    pub fn with_results(results: Vec<Result<SttResponse, TranscriptionError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of times `transcribe` was called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<SttRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockSttProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SttProvider for MockSttProvider {
    async fn transcribe(&self, request: &SttRequest) -> Result<SttResponse, TranscriptionError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TranscriptionError::Request {
                    message: "no mock responses queued".into(),
                })
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// OpenAI Whisper API-based STT provider.
pub struct OpenAiWhisperProvider {
    /// API key for authentication.
    pub api_key: String,
    /// Model name (e.g., "whisper-1").
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Base URL for the API.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiWhisperProvider {
    /// Create a new Whisper provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "whisper-1".to_string(),
            temperature: 0.1,
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Map an HTTP status code to the appropriate TranscriptionError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> TranscriptionError {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.chars().take(200).collect());
        match status.as_u16() {
            400 => TranscriptionError::InvalidFormat { message: detail },
            413 => TranscriptionError::PayloadTooLarge,
            401 | 403 => TranscriptionError::AuthFailed,
            429 => TranscriptionError::RateLimited {
                retry_after_secs: 0,
            },
            code if code >= 500 => TranscriptionError::ServiceUnavailable {
                status: code,
                message: detail,
            },
            code => TranscriptionError::Request {
                message: format!("HTTP {code}: {detail}"),
            },
        }
    }

    fn parse_verbose(json: &serde_json::Value) -> SttResponse {
        let no_speech_probs = json["segments"]
            .as_array()
            .map(|segments| {
                segments
                    .iter()
                    .filter_map(|s| s["no_speech_prob"].as_f64())
                    .map(|p| p as f32)
                    .collect()
            })
            .unwrap_or_default();
        SttResponse {
            text: json["text"].as_str().unwrap_or("").to_string(),
            language: json["language"].as_str().map(str::to_string),
            no_speech_probs,
            duration_secs: json["duration"].as_f64().map(|d| d as f32),
        }
    }
}

#[async_trait]
impl SttProvider for OpenAiWhisperProvider {
    async fn transcribe(&self, request: &SttRequest) -> Result<SttResponse, TranscriptionError> {
        let part = reqwest::multipart::Part::bytes(request.audio.to_vec())
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)
            .map_err(|e| TranscriptionError::Request {
                message: format!("MIME error: {e}"),
            })?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        form = match request.mode {
            ResponseMode::Verbose => {
                let mut form = form
                    .text("response_format", "verbose_json")
                    .text("temperature", self.temperature.to_string());
                if let Some(language) = request.language {
                    form = form.text("language", language.code());
                }
                if let Some(prompt) = &request.prompt {
                    form = form.text("prompt", prompt.clone());
                }
                form
            }
            ResponseMode::PlainText => form.text("response_format", "text"),
        };

        let url = format!("{}/audio/transcriptions", self.base_url);
        debug!(
            url = %url,
            model = %self.model,
            bytes = request.audio.len(),
            language = ?request.language,
            mode = ?request.mode,
            "Sending transcription request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranscriptionError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    TranscriptionError::Request {
                        message: format!("HTTP request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Request {
                message: format!("Failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body));
        }

        match request.mode {
            ResponseMode::PlainText => Ok(SttResponse::text(body.trim())),
            ResponseMode::Verbose => {
                let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
                    TranscriptionError::ResponseParse {
                        message: format!("Invalid JSON: {e}"),
                    }
                })?;
                Ok(Self::parse_verbose(&json))
            }
        }
    }

    fn name(&self) -> &str {
        "openai-whisper"
    }
}

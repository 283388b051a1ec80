//! Text-to-speech provider trait and implementations.
//!
//! `ElevenLabsProvider` talks to the ElevenLabs HTTP API and validates its
//! configured voice once per instance. `MockTtsProvider` generates a short
//! sine-wave WAV per call and can replay scripted failures and delays.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::audio;
use crate::error::SynthesisError;
use crate::language::LanguageTag;

/// One synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    pub text: String,
    pub language: LanguageTag,
    /// Overrides the provider's configured voice.
    pub voice_id: Option<String>,
}

impl TtsRequest {
    pub fn new(text: impl Into<String>, language: LanguageTag) -> Self {
        Self {
            text: text.into(),
            language,
            voice_id: None,
        }
    }
}

/// A voice offered by the synthesis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Trait for text-to-speech providers.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize speech, returning encoded audio bytes.
    async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes, SynthesisError>;

    /// List the voices the service offers.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// What a voice model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Whether requests may carry a `language_code` field.
    pub supports_language_code: bool,
    pub languages: &'static [LanguageTag],
}

const ENGLISH_ONLY: &[LanguageTag] = &[LanguageTag::En];

/// Known voice models. Unrecognized identifiers keep their id but get the
/// conservative English-only capability record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceModel {
    MultilingualV2,
    MultilingualV1,
    MonolingualV1,
    EnglishV1,
    TurboV2_5,
    FlashV2_5,
    Unknown(String),
}

impl VoiceModel {
    pub fn from_id(id: &str) -> Self {
        match id {
            "eleven_multilingual_v2" => Self::MultilingualV2,
            "eleven_multilingual_v1" => Self::MultilingualV1,
            "eleven_monolingual_v1" => Self::MonolingualV1,
            "eleven_english_v1" => Self::EnglishV1,
            "eleven_turbo_v2_5" => Self::TurboV2_5,
            "eleven_flash_v2_5" => Self::FlashV2_5,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::MultilingualV2 => "eleven_multilingual_v2",
            Self::MultilingualV1 => "eleven_multilingual_v1",
            Self::MonolingualV1 => "eleven_monolingual_v1",
            Self::EnglishV1 => "eleven_english_v1",
            Self::TurboV2_5 => "eleven_turbo_v2_5",
            Self::FlashV2_5 => "eleven_flash_v2_5",
            Self::Unknown(id) => id,
        }
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        use LanguageTag::*;
        match self {
            Self::MultilingualV2 => ModelCapabilities {
                supports_language_code: false,
                languages: &[En, Es, Fr, De, It, Pt, Hi, Ar, Zh, Ja],
            },
            Self::MultilingualV1 => ModelCapabilities {
                supports_language_code: false,
                languages: &[En, Es, Fr, De, It, Pt],
            },
            Self::TurboV2_5 | Self::FlashV2_5 => ModelCapabilities {
                supports_language_code: true,
                languages: &LanguageTag::ALL,
            },
            Self::MonolingualV1 | Self::EnglishV1 | Self::Unknown(_) => ModelCapabilities {
                supports_language_code: false,
                languages: ENGLISH_ONLY,
            },
        }
    }

    pub fn supports_language(&self, language: LanguageTag) -> bool {
        self.capabilities().languages.contains(&language)
    }
}

impl std::fmt::Display for VoiceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Voice-quality parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.5,
            style: 1.0,
            use_speaker_boost: true,
        }
    }
}

/// ElevenLabs API-based TTS provider.
pub struct ElevenLabsProvider {
    /// API key for authentication.
    pub api_key: String,
    /// Configured voice; the first listed voice is used when unset.
    pub voice_id: Option<String>,
    pub model: VoiceModel,
    pub settings: VoiceSettings,
    /// Base URL for the API.
    pub base_url: String,
    pub timeout: Duration,
    /// Check the configured voice against the voice list before first use.
    pub validate_voice: bool,
    resolved_voice: OnceCell<String>,
    client: reqwest::Client,
}

impl ElevenLabsProvider {
    /// Create a new ElevenLabs provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            voice_id: None,
            model: VoiceModel::MultilingualV2,
            settings: VoiceSettings::default(),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            timeout: Duration::from_secs(30),
            validate_voice: true,
            resolved_voice: OnceCell::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        self.model = VoiceModel::from_id(model_id);
        self
    }

    pub fn with_settings(mut self, settings: VoiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_voice_validation(mut self, enabled: bool) -> Self {
        self.validate_voice = enabled;
        self
    }

    /// The voice to synthesize with, validated at most once per instance.
    pub async fn effective_voice(&self) -> Result<String, SynthesisError> {
        self.resolved_voice
            .get_or_try_init(|| self.resolve_voice())
            .await
            .cloned()
    }

    async fn resolve_voice(&self) -> Result<String, SynthesisError> {
        let Some(configured) = self.voice_id.clone() else {
            let voices = self.list_voices().await?;
            return match voices.into_iter().next() {
                Some(first) => {
                    info!(voice = %first.name, voice_id = %first.voice_id, "No voice configured, using first available voice");
                    Ok(first.voice_id)
                }
                None => Err(SynthesisError::NotConfigured),
            };
        };
        if !self.validate_voice {
            return Ok(configured);
        }
        match self.list_voices().await {
            Ok(voices) => Ok(Self::pick_voice(&configured, &voices)),
            Err(e) => {
                warn!(error = %e, "Could not validate voice id, keeping the configured one");
                Ok(configured)
            }
        }
    }

    fn pick_voice(configured: &str, voices: &[VoiceInfo]) -> String {
        if voices.iter().any(|v| v.voice_id == configured) {
            return configured.to_string();
        }
        match voices.first() {
            Some(first) => {
                warn!(
                    configured,
                    substitute = %first.voice_id,
                    substitute_name = %first.name,
                    available = voices.len(),
                    "Configured voice not found, using first available voice"
                );
                first.voice_id.clone()
            }
            None => configured.to_string(),
        }
    }

    fn request_body(&self, request: &TtsRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "text": request.text.trim(),
            "model_id": self.model.id(),
            "voice_settings": self.settings,
        });
        if self.model.capabilities().supports_language_code {
            body["language_code"] = serde_json::Value::from(request.language.code());
        }
        body
    }

    fn map_request_error(&self, e: reqwest::Error) -> SynthesisError {
        if e.is_timeout() {
            SynthesisError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            SynthesisError::Request {
                message: format!("HTTP request failed: {e}"),
            }
        }
    }

    /// Map an HTTP status code to the appropriate SynthesisError.
    fn map_http_error(
        status: reqwest::StatusCode,
        body: &str,
        voice_id: &str,
        model: &VoiceModel,
        retry_after: Option<u64>,
    ) -> SynthesisError {
        let json = serde_json::from_str::<serde_json::Value>(body).ok();
        let detail = json.as_ref().and_then(|v| {
            v["detail"]["message"]
                .as_str()
                .or_else(|| v["detail"].as_str())
                .or_else(|| v["message"].as_str())
                .map(str::to_string)
        });
        match status.as_u16() {
            400 => {
                let unsupported = json.as_ref().is_some_and(|v| {
                    v["detail"]["status"] == "model_does_not_support_language_code_parameter"
                });
                if unsupported {
                    SynthesisError::UnsupportedLanguageParameter {
                        model: model.id().to_string(),
                    }
                } else {
                    SynthesisError::BadRequest {
                        message: detail.unwrap_or_else(|| "Bad request".to_string()),
                    }
                }
            }
            401 | 403 => SynthesisError::AuthError,
            404 => SynthesisError::VoiceNotFound {
                voice_id: voice_id.to_string(),
            },
            429 => SynthesisError::RateLimited {
                retry_after_secs: retry_after,
            },
            code if code >= 500 => SynthesisError::Server {
                status: code,
                message: detail.unwrap_or_else(|| body.chars().take(200).collect()),
            },
            code => SynthesisError::Request {
                message: format!("HTTP {code}: {}", detail.unwrap_or_default()),
            },
        }
    }

    fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsProvider {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes, SynthesisError> {
        if request.text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let voice_id = match &request.voice_id {
            Some(voice) => voice.clone(),
            None => self.effective_voice().await?,
        };

        let url = format!("{}/text-to-speech/{}", self.base_url, voice_id);
        let body = self.request_body(request);
        debug!(
            url = %url,
            model = %self.model,
            language = %request.language,
            chars = request.text.len(),
            language_code = body.get("language_code").is_some(),
            "Sending synthesis request"
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = Self::retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(
                status,
                &body,
                &voice_id,
                &self.model,
                retry_after,
            ));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Request {
                message: format!("Failed to read response: {e}"),
            })?;
        debug!(bytes = audio.len(), "Synthesis response received");
        Ok(audio)
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        #[derive(Deserialize)]
        struct VoiceList {
            #[serde(default)]
            voices: Vec<VoiceInfo>,
        }

        let url = format!("{}/voices", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body, "", &self.model, None));
        }

        let list: VoiceList = response.json().await.map_err(|e| SynthesisError::Request {
            message: format!("Invalid voice list: {e}"),
        })?;
        Ok(list.voices)
    }

    fn name(&self) -> &str {
        "elevenlabs"
    }
}

/// A mock TTS provider for testing. Generates a 440 Hz sine-wave WAV.
pub struct MockTtsProvider {
    scripted: Mutex<VecDeque<Result<Bytes, SynthesisError>>>,
    delays: HashMap<String, Duration>,
    voices: Vec<VoiceInfo>,
    calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    call_count: AtomicUsize,
}

impl MockTtsProvider {
    /// Create a new mock TTS provider.
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            delays: HashMap::new(),
            voices: vec![
                VoiceInfo {
                    voice_id: "mock-voice-1".to_string(),
                    name: "Mock One".to_string(),
                    category: Some("premade".to_string()),
                },
                VoiceInfo {
                    voice_id: "mock-voice-2".to_string(),
                    name: "Mock Two".to_string(),
                    category: None,
                },
            ],
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Queue results returned before the mock falls back to generated audio.
    pub fn with_results(mut self, results: Vec<Result<Bytes, SynthesisError>>) -> Self {
        self.scripted = Mutex::new(results.into());
        self
    }

    /// Delay every call whose text equals `text`.
    pub fn with_delay(mut self, text: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(text.into(), delay);
        self
    }

    /// Number of times `synthesize` was called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Text and start time of every call so far.
    pub fn calls(&self) -> Vec<(String, tokio::time::Instant)> {
        self.calls.lock().unwrap().clone()
    }

    fn sine_wav(text: &str) -> Result<Bytes, SynthesisError> {
        let sample_rate = 16000u32;
        let duration_secs = (text.chars().count() as f32 * 0.05).max(0.1);
        let num_samples = (sample_rate as f32 * duration_secs) as usize;
        let samples: Vec<f32> = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
            })
            .collect();
        audio::encode_wav(&samples, sample_rate)
            .map(Bytes::from)
            .map_err(|e| SynthesisError::Request {
                message: e.to_string(),
            })
    }
}

impl Default for MockTtsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsProvider for MockTtsProvider {
    async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes, SynthesisError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls
            .lock()
            .unwrap()
            .push((request.text.clone(), tokio::time::Instant::now()));

        if let Some(delay) = self.delays.get(&request.text) {
            tokio::time::sleep(*delay).await;
        }
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Self::sine_wav(&request.text),
        }
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        Ok(self.voices.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_mock_tts_generates_wav() {
        let mock = MockTtsProvider::new();
        let audio = mock
            .synthesize(&TtsRequest::new("Hello, world!", LanguageTag::En))
            .await
            .unwrap();
        assert_eq!(&audio[0..4], b"RIFF");
        let duration = audio::wav_duration(&audio).unwrap();
        assert!((duration - 0.65).abs() < 0.01);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_tts_scripted_results_first() {
        let mock = MockTtsProvider::new().with_results(vec![Err(SynthesisError::AuthError)]);
        let req = TtsRequest::new("test", LanguageTag::En);
        assert!(matches!(
            mock.synthesize(&req).await,
            Err(SynthesisError::AuthError)
        ));
        assert!(mock.synthesize(&req).await.is_ok());
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_voice_model_capabilities() {
        let v2 = VoiceModel::from_id("eleven_multilingual_v2");
        assert_eq!(v2, VoiceModel::MultilingualV2);
        assert!(!v2.capabilities().supports_language_code);
        assert!(v2.supports_language(LanguageTag::Ja));

        let turbo = VoiceModel::from_id("eleven_turbo_v2_5");
        assert!(turbo.capabilities().supports_language_code);
        assert!(turbo.supports_language(LanguageTag::Ru));

        let unknown = VoiceModel::from_id("some_future_model");
        assert_eq!(unknown.id(), "some_future_model");
        assert!(!unknown.capabilities().supports_language_code);
        assert!(unknown.supports_language(LanguageTag::En));
        assert!(!unknown.supports_language(LanguageTag::Es));
    }

    #[test]
    fn test_language_code_only_for_supporting_models() {
        let req = TtsRequest::new(" Hola ", LanguageTag::Es);

        let v2 = ElevenLabsProvider::new("key");
        let body = v2.request_body(&req);
        assert!(body.get("language_code").is_none());
        assert_eq!(body["text"], "Hola");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert_eq!(body["voice_settings"]["style"], 1.0);

        let flash = ElevenLabsProvider::new("key").with_model("eleven_flash_v2_5");
        assert_eq!(flash.request_body(&req)["language_code"], "es");
    }

    #[test]
    fn test_http_error_mapping() {
        let model = VoiceModel::MultilingualV2;
        let unsupported = r#"{"detail":{"status":"model_does_not_support_language_code_parameter","message":"nope"}}"#;
        assert!(matches!(
            ElevenLabsProvider::map_http_error(StatusCode::BAD_REQUEST, unsupported, "v", &model, None),
            SynthesisError::UnsupportedLanguageParameter { .. }
        ));
        match ElevenLabsProvider::map_http_error(
            StatusCode::BAD_REQUEST,
            r#"{"detail":{"message":"text too long"}}"#,
            "v",
            &model,
            None,
        ) {
            SynthesisError::BadRequest { message } => assert_eq!(message, "text too long"),
            other => panic!("Expected BadRequest, got {other:?}"),
        }
        assert!(matches!(
            ElevenLabsProvider::map_http_error(StatusCode::UNAUTHORIZED, "", "v", &model, None),
            SynthesisError::AuthError
        ));
        match ElevenLabsProvider::map_http_error(StatusCode::NOT_FOUND, "", "voice-9", &model, None) {
            SynthesisError::VoiceNotFound { voice_id } => assert_eq!(voice_id, "voice-9"),
            other => panic!("Expected VoiceNotFound, got {other:?}"),
        }
        assert!(matches!(
            ElevenLabsProvider::map_http_error(StatusCode::TOO_MANY_REQUESTS, "", "v", &model, Some(3)),
            SynthesisError::RateLimited {
                retry_after_secs: Some(3)
            }
        ));
        assert!(matches!(
            ElevenLabsProvider::map_http_error(StatusCode::BAD_GATEWAY, "oops", "v", &model, None),
            SynthesisError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn test_pick_voice_substitutes_first_available() {
        let voices = vec![
            VoiceInfo {
                voice_id: "a".into(),
                name: "Alice".into(),
                category: None,
            },
            VoiceInfo {
                voice_id: "b".into(),
                name: "Bob".into(),
                category: None,
            },
        ];
        assert_eq!(ElevenLabsProvider::pick_voice("b", &voices), "b");
        assert_eq!(ElevenLabsProvider::pick_voice("zzz", &voices), "a");
        assert_eq!(ElevenLabsProvider::pick_voice("zzz", &[]), "zzz");
    }

    #[tokio::test]
    async fn test_elevenlabs_rejects_empty_text_without_request() {
        let provider = ElevenLabsProvider::new("key")
            .with_voice("v")
            .with_base_url("http://127.0.0.1:9");
        let err = provider
            .synthesize(&TtsRequest::new("   ", LanguageTag::En))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyText));
    }

    #[test]
    fn test_elevenlabs_construction() {
        let provider = ElevenLabsProvider::new("xi-test")
            .with_voice("voice-1")
            .with_model("eleven_monolingual_v1")
            .with_base_url("http://localhost:9000/v1/");
        assert_eq!(provider.base_url, "http://localhost:9000/v1");
        assert_eq!(provider.model, VoiceModel::MonolingualV1);
        assert_eq!(provider.voice_id.as_deref(), Some("voice-1"));
        assert_eq!(provider.name(), "elevenlabs");
    }
}

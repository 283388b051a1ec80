//! Configuration system for Visage.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/visage/config.toml` and/or `.visage/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gateway::GatewayConfig;
use crate::retry::RetryPolicy;

/// Top-level configuration for the Visage pipeline and server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisageConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub lipsync: LipSyncConfig,
    #[serde(default)]
    pub language: LanguageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl VisageConfig {
    /// Human-readable warnings for suspicious values. Never fails.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.transcription.validate());
        warnings.extend(self.synthesis.validate());
        if self.pipeline.max_concurrent_messages == 0 {
            warnings.push(
                "pipeline.max_concurrent_messages is 0; messages will be processed one at a time"
                    .to_string(),
            );
        }
        warnings
    }
}

/// Read a secret from the environment variable named by `var`.
///
/// Empty values are treated as unset.
pub fn resolve_secret(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration for the conversational LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" or "mock".
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate in a reply.
    pub max_tokens: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "llm.temperature {} is outside 0.0-2.0",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            warnings.push("llm.max_tokens is 0; replies will be empty".to_string());
        }
        warnings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries + 1, Duration::from_secs(1))
    }
}

/// Configuration for speech transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcription model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling temperature passed to the service.
    pub temperature: f32,
    /// Smallest accepted upload.
    pub min_audio_bytes: usize,
    /// Largest accepted upload (the service's hard limit).
    pub max_audio_bytes: usize,
    /// Below this confidence an auto-detected language falls back to English.
    pub confidence_threshold: f32,
    /// Total attempts per transcription.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled each time.
    pub base_delay_ms: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Re-encode uploads to mono 16 kHz before sending.
    pub reencode: bool,
    /// Path or name of the ffmpeg executable.
    pub ffmpeg_path: String,
    /// Timeout for re-encoding.
    pub reencode_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.1,
            min_audio_bytes: 1000,
            max_audio_bytes: 25 * 1024 * 1024,
            confidence_threshold: 0.7,
            max_attempts: 3,
            base_delay_ms: 2000,
            timeout_secs: 60,
            reencode: true,
            ffmpeg_path: "ffmpeg".to_string(),
            reencode_timeout_secs: 30,
        }
    }
}

impl TranscriptionConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.min_audio_bytes >= self.max_audio_bytes {
            warnings.push(format!(
                "transcription.min_audio_bytes ({}) is not below max_audio_bytes ({})",
                self.min_audio_bytes, self.max_audio_bytes
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            warnings.push(format!(
                "transcription.confidence_threshold {} is outside 0.0-1.0",
                self.confidence_threshold
            ));
        }
        warnings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Configuration for voice synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Provider name: "elevenlabs" or "mock".
    pub provider: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Voice identifier. Falls back to `voice_id_env` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Environment variable consulted for the voice id.
    pub voice_id_env: String,
    /// Voice model identifier.
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    /// Check the voice id against the service's voice list before first use.
    pub validate_voice: bool,
    /// Total attempts per message.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled each time.
    pub base_delay_ms: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: "elevenlabs".to_string(),
            api_key_env: "ELEVEN_LABS_API_KEY".to_string(),
            voice_id: None,
            voice_id_env: "ELEVEN_LABS_VOICE_ID".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            base_url: None,
            stability: 0.5,
            similarity_boost: 0.5,
            style: 1.0,
            use_speaker_boost: true,
            validate_voice: true,
            max_attempts: 3,
            base_delay_ms: 100,
            timeout_secs: 30,
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, value) in [
            ("stability", self.stability),
            ("similarity_boost", self.similarity_boost),
            ("style", self.style),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(format!("synthesis.{name} {value} is outside 0.0-1.0"));
            }
        }
        warnings
    }

    /// The configured voice id, or the one named by `voice_id_env`.
    pub fn resolved_voice_id(&self) -> Option<String> {
        self.voice_id
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| resolve_secret(&self.voice_id_env))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_secs(10))
    }
}

/// Configuration for viseme alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LipSyncConfig {
    /// Whether the external phonetic alignment tool may be used at all.
    pub use_rhubarb: bool,
    /// Candidate locations of the rhubarb executable, tried in order.
    pub rhubarb_paths: Vec<String>,
    /// Path or name of the ffmpeg executable.
    pub ffmpeg_path: String,
    /// Dialog hints are only written for texts shorter than this.
    pub dialog_hint_max_chars: usize,
    /// Timeout for one alignment-tool run.
    pub timeout_secs: u64,
    /// Directory for transient audio/JSON files (system temp dir if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            use_rhubarb: true,
            rhubarb_paths: vec![
                "./bin/rhubarb".to_string(),
                "rhubarb".to_string(),
                "/usr/local/bin/rhubarb".to_string(),
                "/opt/rhubarb/bin/rhubarb".to_string(),
            ],
            ffmpeg_path: "ffmpeg".to_string(),
            dialog_hint_max_chars: 500,
            timeout_secs: 30,
            work_dir: None,
        }
    }
}

/// Configuration for text-based language identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Minimum lexical score for a non-English verdict.
    pub min_score: u32,
    /// Number of memoized identification results.
    pub cache_capacity: usize,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            min_score: 2,
            cache_capacity: 100,
        }
    }
}

/// Configuration for the request orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on messages synthesized concurrently within one reply.
    pub max_concurrent_messages: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: 3,
        }
    }
}

/// Render a configuration as TOML, e.g. to seed a `.visage/config.toml`.
pub fn render_config(config: &VisageConfig) -> Result<String, crate::error::ConfigError> {
    toml::to_string_pretty(config).map_err(|e| crate::error::ConfigError::Invalid {
        message: e.to_string(),
    })
}

/// Load configuration from layered sources.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&VisageConfig>,
) -> Result<VisageConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(VisageConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "visage", "visage") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".visage").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (VISAGE_LLM__MODEL, VISAGE_GATEWAY__PORT, etc.)
    figment = figment.merge(Env::prefixed("VISAGE_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

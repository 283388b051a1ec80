//! Error types for the Visage core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering transcription, reply generation, speech synthesis, viseme
//! alignment, audio re-encoding, configuration, and request input.

use std::time::Duration;

use crate::retry::Retryable;

/// Top-level error type for the Visage core library.
#[derive(Debug, thiserror::Error)]
pub enum VisageError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors caused by the caller's request rather than any collaborator.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Message is required")]
    EmptyMessage,

    #[error("Audio data is required")]
    MissingAudio,

    #[error("Audio data is not valid base64: {message}")]
    InvalidAudioEncoding { message: String },

    #[error("Audio too small ({size} bytes, minimum {min} bytes)")]
    AudioTooSmall { size: usize, min: usize },

    #[error("Audio too large ({size} bytes, maximum {max} bytes)")]
    AudioTooLarge { size: usize, max: usize },
}

/// Errors from the speech transcription service.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("Transcription service is not configured")]
    NotConfigured,

    #[error("Audio rejected: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Transcription service rejected the audio format: {message}")]
    InvalidFormat { message: String },

    #[error("Audio payload too large for the transcription service")]
    PayloadTooLarge,

    #[error("Authentication failed for the transcription service")]
    AuthFailed,

    #[error("Transcription rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Transcription timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Transcription service unavailable ({status}): {message}")]
    ServiceUnavailable { status: u16, message: String },

    #[error("Transcription request failed: {message}")]
    Request { message: String },

    #[error("Transcription response parse error: {message}")]
    ResponseParse { message: String },
}

impl Retryable for TranscriptionError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranscriptionError::RateLimited { .. }
                | TranscriptionError::Timeout { .. }
                | TranscriptionError::ServiceUnavailable { .. }
                | TranscriptionError::Request { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TranscriptionError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Errors from the conversational LLM service.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Reply failed validation: {message}")]
    Validation { message: String },
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited { .. }
                | GenerationError::Timeout { .. }
                | GenerationError::ApiRequest { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Errors from the voice synthesis service.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Synthesis service is not configured")]
    NotConfigured,

    #[error("Nothing to synthesize: message text is empty")]
    EmptyText,

    #[error("Authentication failed for the synthesis service")]
    AuthError,

    #[error("Voice not found: {voice_id}")]
    VoiceNotFound { voice_id: String },

    #[error("Synthesis rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error(
        "Model '{model}' does not accept a language_code parameter; remove it or pick a model that supports it"
    )]
    UnsupportedLanguageParameter { model: String },

    #[error("Synthesis request rejected: {message}")]
    BadRequest { message: String },

    #[error("Synthesis timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Synthesis service error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Synthesis request failed: {message}")]
    Request { message: String },
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SynthesisError::RateLimited { .. }
                | SynthesisError::Timeout { .. }
                | SynthesisError::Server { .. }
                | SynthesisError::Request { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SynthesisError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Errors from the phonetic alignment path.
#[derive(Debug, thiserror::Error)]
pub enum AlignmentError {
    #[error("Phonetic alignment tool not available")]
    ToolUnavailable,

    #[error("Phonetic alignment tool failed: {message}")]
    ToolFailed { message: String },

    #[error("Phonetic alignment timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Alignment output parse error: {message}")]
    Parse { message: String },

    #[error("Viseme track is malformed: {message}")]
    MalformedTrack { message: String },

    #[error("Audio preparation failed: {0}")]
    Audio(#[from] AudioError),

    #[error("Alignment IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from external audio re-encoding.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio converter not found: {program}")]
    ConverterMissing { program: String },

    #[error("Audio conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("Audio conversion timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Audio decode error: {message}")]
    Decode { message: String },

    #[error("Audio IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// A type alias for results using the top-level `VisageError`.
pub type Result<T> = std::result::Result<T, VisageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_input() {
        let err = VisageError::Input(InputError::AudioTooSmall { size: 12, min: 1000 });
        assert_eq!(
            err.to_string(),
            "Input error: Audio too small (12 bytes, minimum 1000 bytes)"
        );
    }

    #[test]
    fn test_error_display_synthesis() {
        let err = VisageError::Synthesis(SynthesisError::VoiceNotFound {
            voice_id: "abc".into(),
        });
        assert_eq!(err.to_string(), "Synthesis error: Voice not found: abc");
    }

    #[test]
    fn test_error_display_unsupported_language_parameter() {
        let err = SynthesisError::UnsupportedLanguageParameter {
            model: "eleven_multilingual_v2".into(),
        };
        assert!(err.to_string().contains("eleven_multilingual_v2"));
        assert!(err.to_string().contains("language_code"));
    }

    #[test]
    fn test_error_display_config() {
        let err = VisageError::Config(ConfigError::Invalid {
            message: "port out of range".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: port out of range"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VisageError = io_err.into();
        assert!(matches!(err, VisageError::Io(_)));
    }

    #[test]
    fn test_transcription_retryable_classification() {
        assert!(TranscriptionError::Timeout { timeout_secs: 60 }.is_retryable());
        assert!(
            TranscriptionError::ServiceUnavailable {
                status: 503,
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(!TranscriptionError::PayloadTooLarge.is_retryable());
        assert!(
            !TranscriptionError::InvalidFormat {
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(!TranscriptionError::AuthFailed.is_retryable());
    }

    #[test]
    fn test_synthesis_retryable_classification() {
        assert!(
            SynthesisError::RateLimited {
                retry_after_secs: None
            }
            .is_retryable()
        );
        assert!(!SynthesisError::AuthError.is_retryable());
        assert!(
            !SynthesisError::VoiceNotFound {
                voice_id: "x".into()
            }
            .is_retryable()
        );
        assert!(
            !SynthesisError::BadRequest {
                message: "x".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_retry_after_hint() {
        let err = GenerationError::RateLimited { retry_after_secs: 7 };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(
            GenerationError::Timeout { timeout_secs: 30 }.retry_after(),
            None
        );
    }
}

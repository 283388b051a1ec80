//! Speech transcription with validation, retries, and text clean-up.
//!
//! The [`Transcriber`] wraps an [`SttProvider`] with everything the raw
//! service call lacks: upload size limits, optional re-encoding, a retry
//! policy, a simplified last-resort call mode, confidence estimation, and
//! language-specific post-processing of the transcript.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use tracing::{debug, info, warn};

use super::stt::{ResponseMode, SttProvider, SttRequest, SttResponse};
use crate::audio::{self, FfmpegTranscoder};
use crate::config::TranscriptionConfig;
use crate::error::{InputError, TranscriptionError};
use crate::language::LanguageTag;
use crate::retry::{RetryPolicy, Retryable};
use crate::types::Transcript;

/// Converts recorded speech into a [`Transcript`].
pub struct Transcriber {
    provider: Arc<dyn SttProvider>,
    transcoder: Option<FfmpegTranscoder>,
    policy: RetryPolicy,
    min_audio_bytes: usize,
    max_audio_bytes: usize,
    confidence_threshold: f32,
    work_dir: PathBuf,
}

impl Transcriber {
    pub fn new(provider: Arc<dyn SttProvider>, config: &TranscriptionConfig) -> Self {
        let transcoder = config.reencode.then(|| {
            FfmpegTranscoder::new(
                config.ffmpeg_path.clone(),
                Duration::from_secs(config.reencode_timeout_secs),
            )
        });
        Self {
            provider,
            transcoder,
            policy: config.retry_policy(),
            min_audio_bytes: config.min_audio_bytes,
            max_audio_bytes: config.max_audio_bytes,
            confidence_threshold: config.confidence_threshold,
            work_dir: std::env::temp_dir(),
        }
    }

    /// Submit uploads as-is, skipping the re-encoding step.
    pub fn without_reencoding(mut self) -> Self {
        self.transcoder = None;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn max_audio_bytes(&self) -> usize {
        self.max_audio_bytes
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Reject uploads outside the accepted size window.
    pub fn validate_audio(&self, audio: &[u8]) -> Result<(), InputError> {
        if audio.is_empty() {
            return Err(InputError::MissingAudio);
        }
        if audio.len() < self.min_audio_bytes {
            return Err(InputError::AudioTooSmall {
                size: audio.len(),
                min: self.min_audio_bytes,
            });
        }
        if audio.len() > self.max_audio_bytes {
            return Err(InputError::AudioTooLarge {
                size: audio.len(),
                max: self.max_audio_bytes,
            });
        }
        Ok(())
    }

    /// Transcribe `audio`. `requested` of `None` means auto-detect.
    pub async fn transcribe(
        &self,
        audio: Bytes,
        mime_type: Option<&str>,
        requested: Option<LanguageTag>,
    ) -> Result<Transcript, TranscriptionError> {
        self.validate_audio(&audio)?;

        let (payload, extension) = self
            .prepare_upload(audio, audio::extension_for_mime(mime_type))
            .await;

        let request = SttRequest {
            audio: payload,
            file_name: format!("audio.{extension}"),
            content_type: audio::mime_for_extension(extension).to_string(),
            language: requested,
            prompt: Some(contextual_prompt(requested.unwrap_or_default()).to_string()),
            mode: ResponseMode::Verbose,
        };

        let response = match self
            .policy
            .run("transcription", |_| self.provider.transcribe(&request))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Full transcription failed, trying basic mode");
                let basic = SttRequest {
                    language: None,
                    prompt: None,
                    mode: ResponseMode::PlainText,
                    ..request.clone()
                };
                match self.provider.transcribe(&basic).await {
                    Ok(response) => response,
                    Err(basic_err) => {
                        warn!(error = %basic_err, "Basic transcription failed");
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        };

        Ok(self.finish(response, requested))
    }

    /// Re-encode when possible; any failure falls back to the original bytes.
    async fn prepare_upload(&self, audio: Bytes, extension: &'static str) -> (Bytes, &'static str) {
        let Some(transcoder) = &self.transcoder else {
            return (audio, extension);
        };
        match transcoder
            .normalize_for_transcription(&audio, extension, &self.work_dir)
            .await
        {
            Ok(converted) if !converted.is_empty() => {
                debug!(
                    original_bytes = audio.len(),
                    converted_bytes = converted.len(),
                    "Re-encoded audio for transcription"
                );
                (Bytes::from(converted), "mp3")
            }
            Ok(_) => (audio, extension),
            Err(e) => {
                warn!(error = %e, "Audio re-encoding failed, submitting original bytes");
                (audio, extension)
            }
        }
    }

    fn finish(&self, response: SttResponse, requested: Option<LanguageTag>) -> Transcript {
        let confidence = estimate_confidence(&response);
        let reported = response.language.as_deref().and_then(LanguageTag::from_name);
        let mut language = reported.or(requested).unwrap_or_default();

        if requested.is_none()
            && language != LanguageTag::En
            && confidence < self.confidence_threshold
        {
            info!(
                detected = %language,
                confidence,
                threshold = self.confidence_threshold,
                "Low-confidence language detection, using English"
            );
            language = LanguageTag::En;
        }

        let text = postprocess(&response.text, language);
        debug!(language = %language, confidence, chars = text.len(), "Transcription complete");
        Transcript {
            text,
            language,
            confidence,
        }
    }
}

/// Prompt sent with each upload to bias vocabulary and punctuation.
pub fn contextual_prompt(language: LanguageTag) -> &'static str {
    match language {
        LanguageTag::En => {
            "This is a conversational voice message. Please transcribe accurately with proper punctuation."
        }
        LanguageTag::Es => {
            "Este es un mensaje de voz conversacional. Por favor transcribe con precisión."
        }
        LanguageTag::Fr => {
            "Ceci est un message vocal conversationnel. Veuillez transcrire avec précision."
        }
        LanguageTag::De => {
            "Dies ist eine Unterhaltungs-Sprachnachricht. Bitte genau transkribieren."
        }
        LanguageTag::It => {
            "Questo è un messaggio vocale di conversazione. Si prega di trascrivere con precisione."
        }
        LanguageTag::Pt => {
            "Esta é uma mensagem de voz conversacional. Por favor, transcreva com precisão."
        }
        LanguageTag::Ru => "Это разговорное голосовое сообщение. Пожалуйста, расшифруйте точно.",
        LanguageTag::Ja => "これは会話形式の音声メッセージです。正確に文字起こしをしてください。",
        LanguageTag::Zh => "这是一条对话语音消息。请准确转录。",
        LanguageTag::Ar => "هذه رسالة صوتية محادثة. يرجى النسخ بدقة.",
        LanguageTag::Hi => "यह एक वार्तालाप ध्वनि संदेश है। कृपया सटीक रूप से लिखिए।",
    }
}

/// Confidence from segment speech probabilities, else from transcript length.
pub fn estimate_confidence(response: &SttResponse) -> f32 {
    if !response.no_speech_probs.is_empty() {
        let total: f32 = response
            .no_speech_probs
            .iter()
            .map(|p| 1.0 - p.clamp(0.0, 1.0))
            .sum();
        return total / response.no_speech_probs.len() as f32;
    }
    match response.text.trim().chars().count() {
        0 => 0.0,
        n if n < 5 => 0.3,
        n if n < 20 => 0.6,
        _ => 0.8,
    }
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static EN_LONE_I: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bi\b").unwrap());
static EN_IM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bim\b").unwrap());
static ES_Q: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bq\b").unwrap());
static FR_JE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[.!?]\s+)je\b").unwrap());

/// Normalize a raw transcript for display and downstream generation.
pub fn postprocess(text: &str, language: LanguageTag) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    if collapsed.is_empty() {
        return String::new();
    }

    let fixed = match language {
        LanguageTag::En => {
            let s = EN_LONE_I.replace_all(&collapsed, "I");
            EN_IM.replace_all(&s, "I'm").into_owned()
        }
        LanguageTag::Es => ES_Q.replace_all(&collapsed, "que").into_owned(),
        LanguageTag::Fr => FR_JE.replace_all(&collapsed, "${1}Je").into_owned(),
        _ => collapsed.into_owned(),
    };

    let mut chars = fixed.chars();
    let mut out: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => return fixed,
    };

    let terminated = out
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '।'));
    if !terminated {
        out.push(match language {
            LanguageTag::Ja | LanguageTag::Zh => '。',
            _ => '.',
        });
    }
    out
}

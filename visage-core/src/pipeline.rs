//! Request orchestration: utterance in, synchronized reply messages out.
//!
//! A request moves through `Received → (Transcribing) → LanguageResolved →
//! Generating → Enhancing → PerMessageSynthesis → Assembled → Delivered`.
//! Only invalid input and a missing transcription service abort a request.
//! Every other failure degrades the reply and the trail ends in `Degraded`
//! instead of `Delivered`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{VisageConfig, resolve_secret};
use crate::emotion::EmotionEnhancer;
use crate::error::{InputError, Result, TranscriptionError};
use crate::generator::{LlmProvider, OpenAiChatProvider, ResponseGenerator};
use crate::language::{LanguageIdentifier, LanguageTag};
use crate::lipsync::VisemeAligner;
use crate::types::{Animation, FacialExpression, ReplyMessage, Utterance, UtterancePayload};
use crate::voice::{
    ElevenLabsProvider, MockTtsProvider, OpenAiWhisperProvider, Synthesizer, Transcriber,
    TtsProvider, VoiceSettings,
};

const TRANSCRIPTION_FAILED: &str =
    "I'm having trouble understanding the audio. Could you please try again or type your message?";
const EMPTY_TRANSCRIPT: &str = "I didn't catch that clearly. Could you please repeat?";

/// Stages a request passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Received,
    Transcribing,
    LanguageResolved,
    Generating,
    Enhancing,
    PerMessageSynthesis,
    Assembled,
    Delivered,
    Degraded,
}

/// Everything produced for one request.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub messages: Vec<ReplyMessage>,
    pub language: LanguageTag,
    /// Transcript text for audio requests.
    pub transcription: Option<String>,
    pub states: Vec<PipelineState>,
    pub degraded: bool,
}

struct Trail {
    states: Vec<PipelineState>,
    degraded: bool,
}

impl Trail {
    fn new() -> Self {
        Self {
            states: vec![PipelineState::Received],
            degraded: false,
        }
    }

    fn enter(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    fn degrade(&mut self) {
        self.degraded = true;
    }

    fn finish(
        mut self,
        messages: Vec<ReplyMessage>,
        language: LanguageTag,
        transcription: Option<String>,
    ) -> PipelineOutcome {
        self.enter(PipelineState::Assembled);
        self.enter(if self.degraded {
            PipelineState::Degraded
        } else {
            PipelineState::Delivered
        });
        PipelineOutcome {
            messages,
            language,
            transcription,
            states: self.states,
            degraded: self.degraded,
        }
    }
}

/// Decode a base64 audio upload, accepting an optional `data:` URL prefix.
pub fn decode_audio(encoded: &str) -> std::result::Result<Bytes, InputError> {
    let encoded = encoded.trim();
    let payload = match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or_default(),
        None => encoded,
    };
    if payload.is_empty() {
        return Err(InputError::MissingAudio);
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| InputError::InvalidAudioEncoding {
            message: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(InputError::MissingAudio);
    }
    Ok(Bytes::from(bytes))
}

fn apology(text: &str, language: LanguageTag) -> ReplyMessage {
    ReplyMessage::new(text, FacialExpression::Surprised, Animation::Idle, language)
        .with_fallback(true)
}

/// Runs utterances through transcription, generation, synthesis and alignment.
pub struct Orchestrator {
    identifier: LanguageIdentifier,
    transcriber: Option<Transcriber>,
    generator: ResponseGenerator,
    enhancer: EmotionEnhancer,
    synthesizer: Option<Synthesizer>,
    aligner: VisemeAligner,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(
        identifier: LanguageIdentifier,
        generator: ResponseGenerator,
        aligner: VisemeAligner,
    ) -> Self {
        Self {
            identifier,
            transcriber: None,
            generator,
            enhancer: EmotionEnhancer::new(),
            synthesizer: None,
            aligner,
            max_concurrent: 3,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Transcriber) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Synthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Upper bound on messages synthesized at the same time (at least 1).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Build every collaborator from configuration and the environment.
    ///
    /// Services whose API keys are missing are left unconfigured: replies
    /// then come from the fallback tables and carry no audio.
    pub fn from_config(config: &VisageConfig) -> Self {
        let identifier = LanguageIdentifier::from_config(&config.language);

        let llm: Option<Arc<dyn LlmProvider>> = match config.llm.provider.as_str() {
            "openai" => resolve_secret(&config.llm.api_key_env).map(|key| {
                let mut provider = OpenAiChatProvider::new(key)
                    .with_model(&config.llm.model)
                    .with_timeout(Duration::from_secs(config.llm.timeout_secs));
                if let Some(url) = &config.llm.base_url {
                    provider = provider.with_base_url(url);
                }
                Arc::new(provider) as Arc<dyn LlmProvider>
            }),
            "mock" => None,
            other => {
                warn!(provider = other, "Unknown LLM provider, replies will use fallback tables");
                None
            }
        };
        if llm.is_none() {
            info!(env = %config.llm.api_key_env, "LLM not configured");
        }
        let generator = ResponseGenerator::new(llm, &config.llm);

        let aligner = VisemeAligner::from_config(&config.lipsync);
        let mut orchestrator = Self::new(identifier, generator, aligner)
            .with_max_concurrent(config.pipeline.max_concurrent_messages);

        let stt = &config.transcription;
        match resolve_secret(&stt.api_key_env) {
            Some(key) => {
                let mut provider = OpenAiWhisperProvider::new(key)
                    .with_model(&stt.model)
                    .with_temperature(stt.temperature)
                    .with_timeout(Duration::from_secs(stt.timeout_secs));
                if let Some(url) = &stt.base_url {
                    provider = provider.with_base_url(url);
                }
                let mut transcriber = Transcriber::new(Arc::new(provider), stt);
                if let Some(dir) = &config.lipsync.work_dir {
                    transcriber = transcriber.with_work_dir(dir);
                }
                orchestrator = orchestrator.with_transcriber(transcriber);
            }
            None => info!(env = %stt.api_key_env, "Transcription not configured"),
        }

        let tts = &config.synthesis;
        let provider: Option<Arc<dyn TtsProvider>> = match tts.provider.as_str() {
            "mock" => Some(Arc::new(MockTtsProvider::new())),
            "elevenlabs" => resolve_secret(&tts.api_key_env).map(|key| {
                let mut provider = ElevenLabsProvider::new(key)
                    .with_model(&tts.model_id)
                    .with_settings(VoiceSettings {
                        stability: tts.stability,
                        similarity_boost: tts.similarity_boost,
                        style: tts.style,
                        use_speaker_boost: tts.use_speaker_boost,
                    })
                    .with_timeout(Duration::from_secs(tts.timeout_secs))
                    .with_voice_validation(tts.validate_voice);
                if let Some(voice) = tts.resolved_voice_id() {
                    provider = provider.with_voice(voice);
                }
                if let Some(url) = &tts.base_url {
                    provider = provider.with_base_url(url);
                }
                Arc::new(provider) as Arc<dyn TtsProvider>
            }),
            other => {
                warn!(provider = other, "Unknown synthesis provider");
                None
            }
        };
        match provider {
            Some(provider) => {
                orchestrator =
                    orchestrator.with_synthesizer(Synthesizer::new(provider, tts.retry_policy()));
            }
            None => info!(env = %tts.api_key_env, "Speech synthesis not configured"),
        }

        orchestrator
    }

    pub fn identifier(&self) -> &LanguageIdentifier {
        &self.identifier
    }

    pub fn transcriber(&self) -> Option<&Transcriber> {
        self.transcriber.as_ref()
    }

    pub fn synthesizer(&self) -> Option<&Synthesizer> {
        self.synthesizer.as_ref()
    }

    pub fn llm_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn aligner_available(&self) -> bool {
        self.aligner.has_aligner()
    }

    /// Run one request to completion.
    ///
    /// Fails only for invalid input or when audio arrives without a
    /// transcription service.
    pub async fn process(&self, utterance: Utterance) -> Result<PipelineOutcome> {
        let mut trail = Trail::new();
        let requested = utterance.requested_language;

        let (text, language, transcription) = match utterance.payload {
            UtterancePayload::Text(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(InputError::EmptyMessage.into());
                }
                let language = requested.unwrap_or_else(|| self.identifier.identify(&text));
                (text, language, None)
            }
            UtterancePayload::Audio(audio) => {
                if audio.is_empty() {
                    return Err(InputError::MissingAudio.into());
                }
                let transcriber = self
                    .transcriber
                    .as_ref()
                    .ok_or(TranscriptionError::NotConfigured)?;
                transcriber.validate_audio(&audio)?;

                trail.enter(PipelineState::Transcribing);
                let fallback_language = requested.unwrap_or_default();
                let transcript = match transcriber
                    .transcribe(audio, utterance.mime_type.as_deref(), requested)
                    .await
                {
                    Ok(transcript) => transcript,
                    Err(TranscriptionError::InvalidInput(e)) => return Err(e.into()),
                    Err(e) => {
                        warn!(error = %e, "Transcription failed, replying with apology");
                        trail.degrade();
                        let messages = vec![apology(TRANSCRIPTION_FAILED, fallback_language)];
                        return Ok(trail.finish(messages, fallback_language, Some(String::new())));
                    }
                };

                let text = transcript.text.trim().to_string();
                if text.is_empty() {
                    info!("Transcript is empty, asking the user to repeat");
                    trail.degrade();
                    let messages = vec![apology(EMPTY_TRANSCRIPT, fallback_language)];
                    return Ok(trail.finish(messages, fallback_language, Some(String::new())));
                }

                // An English report includes low-confidence guesses the
                // transcriber downgraded; the text identifier can still
                // restore that language when the words clearly match it.
                let language = requested.unwrap_or_else(|| match transcript.language {
                    LanguageTag::En => self.identifier.identify(&text),
                    reported => reported,
                });
                debug!(confidence = transcript.confidence, "Transcript accepted");
                (text.clone(), language, Some(text))
            }
        };
        trail.enter(PipelineState::LanguageResolved);
        info!(language = %language, chars = text.chars().count(), "Language resolved");

        trail.enter(PipelineState::Generating);
        let reply = self.generator.generate(&text, language).await;
        if reply.fallback_used && self.generator.is_configured() {
            trail.degrade();
        }

        trail.enter(PipelineState::Enhancing);
        let messages = self.enhancer.enhance(reply.messages, language);

        trail.enter(PipelineState::PerMessageSynthesis);
        let rendered: Vec<(ReplyMessage, bool)> = futures::stream::iter(messages)
            .map(|message| self.render(message, language))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut messages = Vec::with_capacity(rendered.len());
        for (message, degraded) in rendered {
            if degraded {
                trail.degrade();
            }
            messages.push(message);
        }

        let outcome = trail.finish(messages, language, transcription);
        info!(
            messages = outcome.messages.len(),
            language = %language,
            degraded = outcome.degraded,
            "Reply assembled"
        );
        Ok(outcome)
    }

    /// Synthesize and align one message. Returns whether anything degraded.
    async fn render(&self, mut message: ReplyMessage, language: LanguageTag) -> (ReplyMessage, bool) {
        let Some(synthesizer) = &self.synthesizer else {
            return (message, false);
        };

        let audio = match synthesizer.synthesize(&message.text, language).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, provider = synthesizer.provider_name(), "Synthesis failed, sending text only");
                message.audio = None;
                message.lipsync = None;
                return (message, true);
            }
        };

        let emotion = message.emotion.unwrap_or_default();
        let track = self
            .aligner
            .align(&message.text, Some(&audio), language, emotion)
            .await;
        let degraded =
            track.metadata.emergency || (self.aligner.has_aligner() && track.metadata.fallback);

        message.audio = Some(audio);
        message.lipsync = Some(track);
        (message, degraded)
    }
}

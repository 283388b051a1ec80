//! Speech synthesis with text clean-up and language-aware retry.

use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use regex::Regex;
use tracing::debug;

use super::tts::{TtsProvider, TtsRequest, VoiceInfo};
use crate::error::SynthesisError;
use crate::language::LanguageTag;
use crate::retry::RetryPolicy;

/// Converts reply text into encoded speech audio.
pub struct Synthesizer {
    provider: Arc<dyn TtsProvider>,
    policy: RetryPolicy,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn TtsProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Retry policy for `language`. Scripts with stricter service rate
    /// windows wait twice as long between attempts.
    pub fn policy_for(&self, language: LanguageTag) -> RetryPolicy {
        if language.needs_slow_backoff() {
            self.policy.scaled(2)
        } else {
            self.policy.clone()
        }
    }

    pub async fn synthesize(
        &self,
        text: &str,
        language: LanguageTag,
    ) -> Result<Bytes, SynthesisError> {
        let text = preprocess(text, language);
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let request = TtsRequest::new(text, language);
        let policy = self.policy_for(language);
        let audio = policy
            .run("synthesis", |_| self.provider.synthesize(&request))
            .await?;
        debug!(
            provider = self.provider.name(),
            language = %language,
            bytes = audio.len(),
            "Synthesized message audio"
        );
        Ok(audio)
    }

    pub async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        self.provider.list_voices().await
    }
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());

/// Whitespace and typography clean-up before synthesis. Never changes words.
pub fn preprocess(text: &str, language: LanguageTag) -> String {
    // Narrow and regular no-break spaces used in French typography
    let text = text.replace(['\u{00A0}', '\u{202F}'], " ");
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    match language {
        LanguageTag::Es | LanguageTag::Pt => {
            SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1").into_owned()
        }
        _ => collapsed.into_owned(),
    }
}

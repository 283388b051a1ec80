//! Conversational reply generation.
//!
//! `ResponseGenerator::generate` never fails: any provider, parse or
//! validation error (or a missing provider) is replaced by a deterministic
//! keyword-matched reply from [`fallback`].

pub mod fallback;
pub mod llm;
pub mod prompts;

pub use llm::{ChatRequest, LlmProvider, MockLlmProvider, OpenAiChatProvider};

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::GenerationError;
use crate::language::LanguageTag;
use crate::retry::RetryPolicy;
use crate::types::{Animation, FacialExpression, ReplyMessage};

/// Upper bound on messages in one reply.
pub const MAX_MESSAGES: usize = 3;

/// Messages for one utterance, plus whether they came from the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReply {
    pub messages: Vec<ReplyMessage>,
    pub fallback_used: bool,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    facial_expression: Option<String>,
    #[serde(default)]
    animation: Option<String>,
}

/// Produces 1 to 3 reply messages for a user utterance.
pub struct ResponseGenerator {
    provider: Option<Arc<dyn LlmProvider>>,
    policy: RetryPolicy,
    temperature: f32,
    max_tokens: u32,
}

impl ResponseGenerator {
    /// `provider` of `None` means every reply comes from the fallback tables.
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, config: &LlmConfig) -> Self {
        Self {
            provider,
            policy: config.retry_policy(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn generate(&self, user_text: &str, language: LanguageTag) -> GeneratedReply {
        let text = user_text.trim();
        if fallback::is_generic_greeting(text) {
            debug!("Bare greeting, using introduction");
            return GeneratedReply {
                messages: fallback::introduction(language),
                fallback_used: false,
            };
        }

        let Some(provider) = &self.provider else {
            info!(language = %language, "No LLM configured, using contextual fallback");
            return Self::fallback(text, language);
        };
        if text.is_empty() {
            return Self::fallback(text, language);
        }

        match self.ask(provider.as_ref(), text, language).await {
            Ok(messages) => {
                debug!(count = messages.len(), language = %language, "LLM reply accepted");
                GeneratedReply {
                    messages,
                    fallback_used: false,
                }
            }
            Err(e) => {
                warn!(error = %e, model = provider.model_name(), "LLM reply unusable, using contextual fallback");
                Self::fallback(text, language)
            }
        }
    }

    fn fallback(text: &str, language: LanguageTag) -> GeneratedReply {
        GeneratedReply {
            messages: fallback::contextual_reply(text, language),
            fallback_used: true,
        }
    }

    async fn ask(
        &self,
        provider: &dyn LlmProvider,
        text: &str,
        language: LanguageTag,
    ) -> Result<Vec<ReplyMessage>, GenerationError> {
        let request = ChatRequest {
            system: prompts::system_prompt(language),
            user: text.to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: true,
        };
        let content = self
            .policy
            .run("generation", |_| provider.complete(&request))
            .await?;
        parse_reply(&content, language)
    }
}

/// Remove a Markdown code fence some models wrap around JSON.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse and validate model output into reply messages.
pub fn parse_reply(
    content: &str,
    language: LanguageTag,
) -> Result<Vec<ReplyMessage>, GenerationError> {
    let raw: RawReply = serde_json::from_str(strip_code_fence(content)).map_err(|e| {
        GenerationError::ResponseParse {
            message: format!("reply is not the expected JSON shape: {e}"),
        }
    })?;
    if raw.messages.is_empty() {
        return Err(GenerationError::Validation {
            message: "reply contains no messages".to_string(),
        });
    }
    if raw.messages.len() > MAX_MESSAGES {
        debug!(count = raw.messages.len(), "Truncating reply to {MAX_MESSAGES} messages");
    }

    raw.messages
        .into_iter()
        .take(MAX_MESSAGES)
        .enumerate()
        .map(|(index, message)| {
            let text = message
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| GenerationError::Validation {
                    message: format!("message {index} has no text"),
                })?;
            let facial_expression = message
                .facial_expression
                .as_deref()
                .and_then(FacialExpression::from_label)
                .unwrap_or_default();
            let animation = message
                .animation
                .as_deref()
                .and_then(Animation::from_label)
                .unwrap_or_default();
            Ok(ReplyMessage::new(text, facial_expression, animation, language))
        })
        .collect()
}

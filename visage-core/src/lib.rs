//! # Visage Core
//!
//! Core library for the Visage digital human.
//! Turns a user utterance (typed text or recorded speech) into reply
//! messages carrying synthesized audio and mouth-shape timing: language
//! identification, transcription, reply generation, emotion tagging,
//! speech synthesis and viseme alignment, each with its own fallback.

pub mod audio;
pub mod config;
pub mod emotion;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod language;
pub mod lipsync;
pub mod pipeline;
pub mod retry;
pub mod types;
pub mod voice;

// Re-export commonly used types at the crate root.
pub use config::{VisageConfig, load_config};
pub use emotion::EmotionEnhancer;
pub use error::{Result, VisageError};
pub use generator::{GeneratedReply, ResponseGenerator};
pub use language::{LanguageIdentifier, LanguageTag};
pub use lipsync::VisemeAligner;
pub use pipeline::{Orchestrator, PipelineOutcome, PipelineState};
pub use retry::RetryPolicy;
pub use types::{
    Animation, Emotion, FacialExpression, MouthCue, ReplyMessage, Transcript, Utterance, Viseme,
    VisemeTrack,
};
pub use voice::{Synthesizer, Transcriber};

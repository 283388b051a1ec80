//! Voice services: speech-to-text and text-to-speech.
//!
//! Provider traits sit at the service boundary (`stt`, `tts`); the
//! `Transcriber` and `Synthesizer` add validation, retries and text
//! clean-up on top of whichever provider is configured.

pub mod stt;
pub mod synthesizer;
pub mod transcriber;
pub mod tts;

pub use stt::{MockSttProvider, OpenAiWhisperProvider, ResponseMode, SttProvider, SttRequest, SttResponse};
pub use synthesizer::Synthesizer;
pub use transcriber::Transcriber;
pub use tts::{
    ElevenLabsProvider, MockTtsProvider, ModelCapabilities, TtsProvider, TtsRequest, VoiceInfo,
    VoiceModel, VoiceSettings,
};

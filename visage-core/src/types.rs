//! Core data model flowing through the conversational pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::language::LanguageTag;

/// What the caller sent: typed text or recorded speech.
#[derive(Debug, Clone)]
pub enum UtterancePayload {
    Text(String),
    Audio(Bytes),
}

/// A raw user request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub payload: UtterancePayload,
    /// MIME type of audio payloads (e.g. `audio/webm`).
    pub mime_type: Option<String>,
    /// Caller-requested language; `None` means auto-detect.
    pub requested_language: Option<LanguageTag>,
}

impl Utterance {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            payload: UtterancePayload::Text(text.into()),
            mime_type: None,
            requested_language: None,
        }
    }

    pub fn audio(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            payload: UtterancePayload::Audio(bytes.into()),
            mime_type: Some(mime_type.into()),
            requested_language: None,
        }
    }

    pub fn with_language(mut self, language: Option<LanguageTag>) -> Self {
        self.requested_language = language;
        self
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.payload, UtterancePayload::Audio(_))
    }
}

/// Result of speech transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: LanguageTag,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Facial expressions the avatar renderer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacialExpression {
    Smile,
    Sad,
    Angry,
    Surprised,
    FunnyFace,
    #[default]
    Default,
}

impl FacialExpression {
    pub const ALL: [FacialExpression; 6] = [
        FacialExpression::Smile,
        FacialExpression::Sad,
        FacialExpression::Angry,
        FacialExpression::Surprised,
        FacialExpression::FunnyFace,
        FacialExpression::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacialExpression::Smile => "smile",
            FacialExpression::Sad => "sad",
            FacialExpression::Angry => "angry",
            FacialExpression::Surprised => "surprised",
            FacialExpression::FunnyFace => "funnyFace",
            FacialExpression::Default => "default",
        }
    }

    /// Case-insensitive lookup of a label produced by a model.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(label))
    }
}

/// Body animations the avatar renderer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Animation {
    #[default]
    Idle,
    TalkingOne,
    TalkingThree,
    SadIdle,
    Defeated,
    Angry,
    Surprised,
    DismissingGesture,
    ThoughtfulHeadShake,
}

impl Animation {
    pub const ALL: [Animation; 9] = [
        Animation::Idle,
        Animation::TalkingOne,
        Animation::TalkingThree,
        Animation::SadIdle,
        Animation::Defeated,
        Animation::Angry,
        Animation::Surprised,
        Animation::DismissingGesture,
        Animation::ThoughtfulHeadShake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Animation::Idle => "Idle",
            Animation::TalkingOne => "TalkingOne",
            Animation::TalkingThree => "TalkingThree",
            Animation::SadIdle => "SadIdle",
            Animation::Defeated => "Defeated",
            Animation::Angry => "Angry",
            Animation::Surprised => "Surprised",
            Animation::DismissingGesture => "DismissingGesture",
            Animation::ThoughtfulHeadShake => "ThoughtfulHeadShake",
        }
    }

    /// Case-insensitive lookup of a label produced by a model.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(label))
    }
}

/// Emotion tag inferred for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Happy,
    Laugh,
    Excited,
    Sad,
    Melancholy,
    Angry,
    Furious,
    Fear,
    Surprised,
    Thoughtful,
    Confused,
    #[default]
    Neutral,
}

/// One reply unit: text plus everything needed to voice and animate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMessage {
    pub text: String,
    pub facial_expression: FacialExpression,
    pub animation: Animation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    pub language: LanguageTag,
    /// Synthesized speech, base64 on the wire.
    #[serde(default, with = "base64_audio")]
    pub audio: Option<Bytes>,
    #[serde(default)]
    pub lipsync: Option<VisemeTrack>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_used: bool,
}

impl ReplyMessage {
    pub fn new(
        text: impl Into<String>,
        facial_expression: FacialExpression,
        animation: Animation,
        language: LanguageTag,
    ) -> Self {
        Self {
            text: text.into(),
            facial_expression,
            animation,
            emotion: None,
            intensity: None,
            language,
            audio: None,
            lipsync: None,
            fallback_used: false,
        }
    }

    pub fn with_fallback(mut self, fallback_used: bool) -> Self {
        self.fallback_used = fallback_used;
        self
    }

    /// Audio and lipsync are either both present or both absent.
    pub fn media_consistent(&self) -> bool {
        self.audio.is_some() == self.lipsync.is_some()
    }
}

mod base64_audio {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
        match audio {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Bytes>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|s| STANDARD.decode(s).map(Bytes::from))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Visemes
// ---------------------------------------------------------------------------

/// Mouth shapes, in the Rhubarb/Preston Blair 8-letter alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Viseme {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Viseme {
    /// The rest shape.
    pub const REST: Viseme = Viseme::A;

    /// Parse a single shape letter. `X` (unknown) maps to rest.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let v = match symbol.trim() {
            "A" | "X" => Viseme::A,
            "B" => Viseme::B,
            "C" => Viseme::C,
            "D" => Viseme::D,
            "E" => Viseme::E,
            "F" => Viseme::F,
            "G" => Viseme::G,
            "H" => Viseme::H,
            _ => return None,
        };
        Some(v)
    }

    pub fn is_vowel(&self) -> bool {
        matches!(self, Viseme::D | Viseme::E | Viseme::F)
    }

    pub fn is_consonant(&self) -> bool {
        matches!(self, Viseme::B | Viseme::C | Viseme::G | Viseme::H)
    }
}

/// A timed mouth shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouthCue {
    pub start: f64,
    pub end: f64,
    pub value: Viseme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smooth_transition: Option<f32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blend_from_previous: bool,
}

impl MouthCue {
    pub fn new(start: f64, end: f64, value: Viseme) -> Self {
        Self {
            start,
            end,
            value,
            intensity: None,
            smooth_transition: None,
            blend_from_previous: false,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Where a track's timing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueSource {
    Rhubarb,
    Synthetic,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    /// Seconds; equals the last cue's `end`.
    pub duration: f64,
    pub language: LanguageTag,
    pub emotion: Emotion,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub emergency: bool,
    pub source: CueSource,
}

/// Ordered, non-overlapping mouth cues for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisemeTrack {
    pub mouth_cues: Vec<MouthCue>,
    pub metadata: TrackMetadata,
}

impl VisemeTrack {
    /// Duration of the emergency track.
    pub const EMERGENCY_DURATION: f64 = 1.0;

    /// A single rest cue covering one second, used when everything else failed.
    pub fn emergency(language: LanguageTag, emotion: Emotion) -> Self {
        Self {
            mouth_cues: vec![
                MouthCue::new(0.0, Self::EMERGENCY_DURATION, Viseme::REST).with_intensity(0.5),
            ],
            metadata: TrackMetadata {
                duration: Self::EMERGENCY_DURATION,
                language,
                emotion,
                fallback: true,
                emergency: true,
                source: CueSource::Emergency,
            },
        }
    }

    pub fn duration(&self) -> f64 {
        self.metadata.duration
    }

    /// Cues sorted by start, non-overlapping, non-empty, and ending at `duration`.
    pub fn is_well_formed(&self, epsilon: f64) -> bool {
        let Some(last) = self.mouth_cues.last() else {
            return false;
        };
        let ordered = self.mouth_cues.windows(2).all(|w| {
            w[0].start <= w[1].start && w[0].end <= w[1].start + epsilon
        });
        let positive = self.mouth_cues.iter().all(|c| c.end >= c.start);
        ordered && positive && (last.end - self.metadata.duration).abs() <= epsilon
    }
}

//! Heuristic emotion tagging for reply messages.
//!
//! Keyword lists exist for English, Spanish, French and German; other
//! languages use the English list. Text without a keyword falls back to
//! punctuation (`!` excited, `?` confused). Explicit expressions and
//! animations chosen upstream are never overwritten.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::language::LanguageTag;
use crate::types::{Animation, Emotion, FacialExpression, ReplyMessage};

type KeywordSet = Vec<(Emotion, Regex)>;

fn compile(groups: &[(Emotion, &[&str])]) -> KeywordSet {
    groups
        .iter()
        .map(|(emotion, words)| {
            let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            (*emotion, Regex::new(&pattern).unwrap())
        })
        .collect()
}

static EN_KEYWORDS: LazyLock<KeywordSet> = LazyLock::new(|| {
    compile(&[
        (
            Emotion::Happy,
            &[
                "happy", "joyful", "excited", "delighted", "cheerful", "great", "awesome",
                "wonderful",
            ],
        ),
        (
            Emotion::Sad,
            &[
                "sad",
                "unhappy",
                "depressed",
                "disappointed",
                "sorry",
                "terrible",
                "awful",
            ],
        ),
        (
            Emotion::Angry,
            &["angry", "mad", "furious", "irritated", "annoyed", "frustrated"],
        ),
        (
            Emotion::Surprised,
            &["surprised", "shocked", "amazed", "wow", "incredible", "unbelievable"],
        ),
        (
            Emotion::Confused,
            &["confused", "puzzled", "unclear", "what", "how", "why", "huh"],
        ),
    ])
});

static ES_KEYWORDS: LazyLock<KeywordSet> = LazyLock::new(|| {
    compile(&[
        (
            Emotion::Happy,
            &[
                "feliz",
                "alegre",
                "contento",
                "encantado",
                "genial",
                "fantástico",
                "maravilloso",
            ],
        ),
        (
            Emotion::Sad,
            &["triste", "deprimido", "decepcionado", "lo siento", "terrible", "horrible"],
        ),
        (
            Emotion::Angry,
            &["enojado", "enfadado", "furioso", "molesto", "irritado", "frustrado"],
        ),
        (
            Emotion::Surprised,
            &["sorprendido", "asombrado", "increíble", "guau", "impresionante"],
        ),
        (
            Emotion::Confused,
            &["confundido", "confuso", "qué", "cómo", "por qué"],
        ),
    ])
});

static FR_KEYWORDS: LazyLock<KeywordSet> = LazyLock::new(|| {
    compile(&[
        (
            Emotion::Happy,
            &[
                "heureux",
                "heureuse",
                "joyeux",
                "content",
                "ravi",
                "génial",
                "formidable",
                "merveilleux",
            ],
        ),
        (
            Emotion::Sad,
            &["triste", "déprimé", "déçu", "désolé", "terrible", "affreux"],
        ),
        (
            Emotion::Angry,
            &["en colère", "fâché", "furieux", "énervé", "agacé", "frustré"],
        ),
        (
            Emotion::Surprised,
            &["surpris", "choqué", "étonné", "incroyable", "waouh"],
        ),
        (
            Emotion::Confused,
            &["confus", "perplexe", "quoi", "comment", "pourquoi"],
        ),
    ])
});

static DE_KEYWORDS: LazyLock<KeywordSet> = LazyLock::new(|| {
    compile(&[
        (
            Emotion::Happy,
            &[
                "glücklich",
                "fröhlich",
                "froh",
                "begeistert",
                "toll",
                "großartig",
                "wunderbar",
            ],
        ),
        (
            Emotion::Sad,
            &["traurig", "deprimiert", "enttäuscht", "leider", "schrecklich"],
        ),
        (
            Emotion::Angry,
            &["wütend", "verärgert", "sauer", "genervt", "frustriert"],
        ),
        (
            Emotion::Surprised,
            &["überrascht", "schockiert", "erstaunt", "wow", "unglaublich"],
        ),
        (
            Emotion::Confused,
            &["verwirrt", "unklar", "was", "wie", "warum"],
        ),
    ])
});

fn keywords(language: LanguageTag) -> &'static KeywordSet {
    match language {
        LanguageTag::Es => &ES_KEYWORDS,
        LanguageTag::Fr => &FR_KEYWORDS,
        LanguageTag::De => &DE_KEYWORDS,
        _ => &EN_KEYWORDS,
    }
}

/// Expression and intensity suggested for an emotion.
pub fn profile(emotion: Emotion) -> (FacialExpression, f32) {
    match emotion {
        Emotion::Joy => (FacialExpression::Smile, 0.8),
        Emotion::Happy => (FacialExpression::Smile, 0.7),
        Emotion::Laugh => (FacialExpression::Smile, 1.0),
        Emotion::Excited => (FacialExpression::Smile, 0.9),
        Emotion::Sad => (FacialExpression::Sad, 0.8),
        Emotion::Melancholy => (FacialExpression::Sad, 0.6),
        Emotion::Angry => (FacialExpression::Angry, 0.9),
        Emotion::Furious => (FacialExpression::Angry, 1.0),
        Emotion::Fear => (FacialExpression::Surprised, 0.8),
        Emotion::Surprised => (FacialExpression::Surprised, 0.9),
        Emotion::Thoughtful => (FacialExpression::Default, 0.5),
        Emotion::Confused => (FacialExpression::Default, 0.6),
        Emotion::Neutral => (FacialExpression::Default, 0.5),
    }
}

/// Body animation suggested for an emotion.
pub fn animation_for(emotion: Emotion, text_chars: usize) -> Animation {
    match emotion {
        Emotion::Happy | Emotion::Joy | Emotion::Laugh => Animation::TalkingOne,
        Emotion::Excited => Animation::TalkingThree,
        Emotion::Sad | Emotion::Melancholy => Animation::SadIdle,
        Emotion::Angry | Emotion::Furious => Animation::Angry,
        Emotion::Surprised | Emotion::Fear => Animation::Surprised,
        Emotion::Confused | Emotion::Thoughtful => Animation::ThoughtfulHeadShake,
        Emotion::Neutral if text_chars > 30 => Animation::TalkingThree,
        Emotion::Neutral => Animation::TalkingOne,
    }
}

/// Detect the dominant emotion of `text`.
pub fn detect_emotion(text: &str, language: LanguageTag) -> Emotion {
    if let Some((emotion, _)) = keywords(language).iter().find(|(_, re)| re.is_match(text)) {
        return *emotion;
    }
    if text.contains('!') || text.contains('！') {
        Emotion::Excited
    } else if text.contains('?') || text.contains('？') || text.contains('¿') {
        Emotion::Confused
    } else {
        Emotion::Neutral
    }
}

/// Assigns emotion, intensity and, where left at defaults, expression and
/// animation to reply messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmotionEnhancer;

impl EmotionEnhancer {
    pub fn new() -> Self {
        Self
    }

    pub fn enhance(&self, messages: Vec<ReplyMessage>, language: LanguageTag) -> Vec<ReplyMessage> {
        messages
            .into_iter()
            .map(|message| self.enhance_one(message, language))
            .collect()
    }

    pub fn enhance_one(&self, mut message: ReplyMessage, language: LanguageTag) -> ReplyMessage {
        let emotion = detect_emotion(&message.text, language);
        let (expression, intensity) = profile(emotion);

        if message.facial_expression == FacialExpression::Default {
            message.facial_expression = expression;
        }
        if message.animation == Animation::Idle {
            message.animation = animation_for(emotion, message.text.chars().count());
        }
        message.emotion = Some(emotion);
        message.intensity = Some(intensity);
        message.language = language;

        trace!(?emotion, intensity, expression = message.facial_expression.as_str(), "Enhanced message");
        message
    }
}

//! Static per-language data used by the viseme aligner.

use crate::language::LanguageTag;
use crate::types::{Emotion, Viseme};

use Viseme::{A, B, C, D, E, F, G, H};

const EN_PHONEMES: &[(&str, Viseme)] = &[
    // bilabial
    ("p", A),
    ("b", A),
    ("m", A),
    // labiodental
    ("f", G),
    ("v", G),
    ("th", H),
    ("dh", H),
    ("t", C),
    ("d", C),
    ("n", C),
    ("l", C),
    ("r", C),
    ("s", C),
    ("z", C),
    ("sh", C),
    ("zh", C),
    ("ch", C),
    ("jh", C),
    // velar
    ("k", B),
    ("g", B),
    ("ng", B),
    ("y", C),
    ("w", F),
    ("h", C),
    // vowels
    ("aa", D),
    ("ae", D),
    ("ah", D),
    ("ao", E),
    ("ow", E),
    ("uw", F),
    ("uh", F),
    ("ih", E),
    ("iy", E),
    ("eh", E),
    ("ey", E),
    ("ax", D),
    ("er", C),
    ("sil", A),
    ("sp", A),
];

const ES_PHONEMES: &[(&str, Viseme)] = &[
    ("p", A),
    ("b", A),
    ("m", A),
    ("f", G),
    ("v", G),
    ("t", C),
    ("d", C),
    ("n", C),
    ("l", C),
    ("r", C),
    ("rr", C),
    ("s", C),
    ("z", C),
    ("th", H),
    ("ch", C),
    ("y", C),
    ("ll", C),
    ("ñ", C),
    ("k", B),
    ("g", B),
    ("j", B),
    ("x", B),
    ("w", F),
    ("a", D),
    ("e", E),
    ("i", E),
    ("o", E),
    ("u", F),
    ("sil", A),
];

const FR_PHONEMES: &[(&str, Viseme)] = &[
    ("p", A),
    ("b", A),
    ("m", A),
    ("f", G),
    ("v", G),
    ("t", C),
    ("d", C),
    ("n", C),
    ("l", C),
    ("r", C),
    ("s", C),
    ("z", C),
    ("sh", C),
    ("zh", C),
    ("k", B),
    ("g", B),
    ("w", F),
    ("gn", C),
    ("a", D),
    ("e", E),
    ("i", E),
    ("o", E),
    ("u", F),
    ("y", F),
    // nasals
    ("an", D),
    ("on", E),
    ("in", E),
    ("un", F),
    ("eu", F),
    ("ou", F),
    ("sil", A),
];

const DEFAULT_PHONEMES: &[(&str, Viseme)] = &[
    ("a", A),
    ("b", B),
    ("c", C),
    ("d", D),
    ("e", E),
    ("f", F),
    ("g", G),
    ("h", H),
    ("x", A),
];

fn phoneme_table(language: LanguageTag) -> Option<&'static [(&'static str, Viseme)]> {
    match language {
        LanguageTag::En => Some(EN_PHONEMES),
        LanguageTag::Es => Some(ES_PHONEMES),
        LanguageTag::Fr => Some(FR_PHONEMES),
        _ => None,
    }
}

fn lookup(table: &[(&str, Viseme)], label: &str) -> Option<Viseme> {
    table.iter().find(|(l, _)| *l == label).map(|(_, v)| *v)
}

/// Map a raw alignment label to a viseme.
///
/// Single uppercase shape letters are already visemes. Anything else goes
/// through the language table, then the default table, then rest.
pub fn map_phoneme(label: &str, language: LanguageTag) -> Viseme {
    let label = label.trim();
    if label.len() == 1 && label.chars().all(|c| c.is_ascii_uppercase()) {
        if let Some(viseme) = Viseme::from_symbol(label) {
            return viseme;
        }
    }
    let lower = label.to_lowercase();
    phoneme_table(language)
        .and_then(|table| lookup(table, &lower))
        .or_else(|| lookup(DEFAULT_PHONEMES, &lower))
        .unwrap_or(Viseme::REST)
}

/// Intensity multipliers applied to (vowel, consonant) visemes.
pub fn emotion_modifiers(emotion: Emotion) -> (f32, f32) {
    match emotion {
        Emotion::Happy => (1.2, 1.1),
        Emotion::Sad => (0.8, 0.9),
        Emotion::Angry => (1.3, 1.4),
        Emotion::Surprised => (1.1, 1.2),
        Emotion::Fear => (0.9, 1.1),
        _ => (1.0, 1.0),
    }
}

/// Articulation timing for a language.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Scale applied to each cue's duration.
    pub multiplier: f64,
    /// Shortest allowed cue, in seconds.
    pub min_duration: f64,
}

pub fn timing(language: LanguageTag) -> Timing {
    let (multiplier, min_duration) = match language {
        LanguageTag::En => (1.0, 0.05),
        LanguageTag::Es => (1.1, 0.05),
        LanguageTag::Fr => (0.95, 0.06),
        LanguageTag::De => (0.9, 0.07),
        LanguageTag::It => (1.05, 0.05),
        LanguageTag::Pt => (1.1, 0.05),
        LanguageTag::Ru => (0.85, 0.08),
        LanguageTag::Ja => (1.2, 0.04),
        LanguageTag::Zh => (1.15, 0.04),
        LanguageTag::Ar => (0.9, 0.06),
        LanguageTag::Hi => (1.0, 0.05),
    };
    Timing {
        multiplier,
        min_duration,
    }
}

/// Blend factor for transitions between similar visemes.
pub fn smoothing_factor(language: LanguageTag) -> f32 {
    match language {
        LanguageTag::En => 0.3,
        LanguageTag::Es | LanguageTag::Fr | LanguageTag::Pt => 0.4,
        LanguageTag::De | LanguageTag::It => 0.35,
        LanguageTag::Ru | LanguageTag::Zh | LanguageTag::Hi => 0.5,
        LanguageTag::Ja | LanguageTag::Ar => 0.6,
    }
}

/// Largest gap (seconds) across which similar visemes are blended.
pub const SMOOTHING_GAP: f64 = 0.02;

/// Pairs of visemes close enough in shape to blend.
pub fn similar(a: Viseme, b: Viseme) -> bool {
    matches!(
        (a, b),
        (D, E) | (E, D) | (E, F) | (F, E) | (B, C) | (C, B) | (G, H) | (H, G)
    )
}

/// Seconds of speech per character, for duration estimates.
pub fn seconds_per_char(language: LanguageTag) -> f64 {
    match language {
        LanguageTag::En => 0.08,
        LanguageTag::Es => 0.09,
        LanguageTag::Fr => 0.07,
        LanguageTag::De => 0.06,
        LanguageTag::It => 0.08,
        LanguageTag::Pt => 0.09,
        LanguageTag::Ru => 0.05,
        LanguageTag::Ja => 0.12,
        LanguageTag::Zh => 0.10,
        LanguageTag::Ar => 0.07,
        LanguageTag::Hi => 0.08,
    }
}

/// Shortest estimated duration for non-empty text.
pub const MIN_ESTIMATED_DURATION: f64 = 0.5;

/// Estimated duration for empty text.
pub const EMPTY_TEXT_DURATION: f64 = 1.0;

/// One step of a canned cue pattern: shape, fractional span, base intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternStep {
    pub value: Viseme,
    pub from: f64,
    pub to: f64,
    pub intensity: f32,
}

const fn step(value: Viseme, from: f64, to: f64, intensity: f32) -> PatternStep {
    PatternStep {
        value,
        from,
        to,
        intensity,
    }
}

const EN_PATTERN: &[PatternStep] = &[
    step(D, 0.0, 0.3, 1.0),
    step(C, 0.3, 0.6, 1.0),
    step(A, 0.6, 1.0, 1.0),
];
const ES_PATTERN: &[PatternStep] = &[
    step(D, 0.0, 0.4, 1.1),
    step(E, 0.4, 0.7, 1.0),
    step(A, 0.7, 1.0, 0.8),
];
const FR_PATTERN: &[PatternStep] = &[
    step(F, 0.0, 0.35, 0.9),
    step(E, 0.35, 0.65, 1.0),
    step(A, 0.65, 1.0, 0.7),
];
const DE_PATTERN: &[PatternStep] = &[
    step(C, 0.0, 0.4, 1.2),
    step(D, 0.4, 0.7, 1.0),
    step(A, 0.7, 1.0, 0.8),
];
const JA_PATTERN: &[PatternStep] = &[step(D, 0.0, 0.5, 1.0), step(A, 0.5, 1.0, 1.0)];
const ZH_PATTERN: &[PatternStep] = &[step(D, 0.0, 0.6, 1.0), step(A, 0.6, 1.0, 1.0)];

/// Canned mouth pattern spanning `0..1` of an utterance.
pub fn pattern(language: LanguageTag) -> &'static [PatternStep] {
    match language {
        LanguageTag::Es => ES_PATTERN,
        LanguageTag::Fr => FR_PATTERN,
        LanguageTag::De => DE_PATTERN,
        LanguageTag::Ja => JA_PATTERN,
        LanguageTag::Zh => ZH_PATTERN,
        _ => EN_PATTERN,
    }
}

//! Language tags and text-based language identification.
//!
//! Identification is deliberately approximate: non-Latin scripts are decided
//! by code-point ranges, Latin-script languages by a weighted score over
//! stop words and orthographic markers. Anything below the confidence floor
//! is treated as English.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Mutex;

use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One of the fixed set of languages the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageTag {
    #[default]
    En,
    Es,
    Fr,
    De,
    It,
    Pt,
    Ru,
    Ja,
    Zh,
    Ar,
    Hi,
}

impl LanguageTag {
    /// Every supported language, in a stable order.
    pub const ALL: [LanguageTag; 11] = [
        LanguageTag::En,
        LanguageTag::Es,
        LanguageTag::Fr,
        LanguageTag::De,
        LanguageTag::It,
        LanguageTag::Pt,
        LanguageTag::Ru,
        LanguageTag::Ja,
        LanguageTag::Zh,
        LanguageTag::Ar,
        LanguageTag::Hi,
    ];

    /// Two-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            LanguageTag::En => "en",
            LanguageTag::Es => "es",
            LanguageTag::Fr => "fr",
            LanguageTag::De => "de",
            LanguageTag::It => "it",
            LanguageTag::Pt => "pt",
            LanguageTag::Ru => "ru",
            LanguageTag::Ja => "ja",
            LanguageTag::Zh => "zh",
            LanguageTag::Ar => "ar",
            LanguageTag::Hi => "hi",
        }
    }

    /// English name of the language.
    pub fn display_name(&self) -> &'static str {
        match self {
            LanguageTag::En => "English",
            LanguageTag::Es => "Spanish",
            LanguageTag::Fr => "French",
            LanguageTag::De => "German",
            LanguageTag::It => "Italian",
            LanguageTag::Pt => "Portuguese",
            LanguageTag::Ru => "Russian",
            LanguageTag::Ja => "Japanese",
            LanguageTag::Zh => "Chinese",
            LanguageTag::Ar => "Arabic",
            LanguageTag::Hi => "Hindi",
        }
    }

    /// The language's name for itself.
    pub fn native_name(&self) -> &'static str {
        match self {
            LanguageTag::En => "English",
            LanguageTag::Es => "Español",
            LanguageTag::Fr => "Français",
            LanguageTag::De => "Deutsch",
            LanguageTag::It => "Italiano",
            LanguageTag::Pt => "Português",
            LanguageTag::Ru => "Русский",
            LanguageTag::Ja => "日本語",
            LanguageTag::Zh => "中文",
            LanguageTag::Ar => "العربية",
            LanguageTag::Hi => "हिन्दी",
        }
    }

    /// Parse a two-letter code or an English language name.
    ///
    /// Returns `None` for `"auto"` and anything unrecognized, which callers
    /// treat as "let the service decide".
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        let tag = match normalized.as_str() {
            "en" | "english" => LanguageTag::En,
            "es" | "spanish" => LanguageTag::Es,
            "fr" | "french" => LanguageTag::Fr,
            "de" | "german" => LanguageTag::De,
            "it" | "italian" => LanguageTag::It,
            "pt" | "portuguese" => LanguageTag::Pt,
            "ru" | "russian" => LanguageTag::Ru,
            "ja" | "japanese" => LanguageTag::Ja,
            "zh" | "chinese" | "mandarin" => LanguageTag::Zh,
            "ar" | "arabic" => LanguageTag::Ar,
            "hi" | "hindi" => LanguageTag::Hi,
            // Regional variants like "en-US" or "pt_BR"
            other if other.len() > 2 && other.is_char_boundary(2) => {
                let (prefix, rest) = other.split_at(2);
                if rest.starts_with('-') || rest.starts_with('_') {
                    return Self::from_name(prefix);
                }
                return None;
            }
            _ => return None,
        };
        Some(tag)
    }

    /// Languages whose voices see stricter rate windows at the synthesis
    /// service, so their backoff is doubled.
    pub fn needs_slow_backoff(&self) -> bool {
        matches!(
            self,
            LanguageTag::Zh | LanguageTag::Ja | LanguageTag::Ar | LanguageTag::Hi
        )
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LanguageTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unsupported language: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Lexical profiles
// ---------------------------------------------------------------------------

/// Scoring data for one Latin-script candidate language.
struct LexicalProfile {
    tag: LanguageTag,
    words: &'static [&'static str],
    markers: Vec<Regex>,
    foreign_markers: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

fn lexical_profiles() -> Vec<LexicalProfile> {
    vec![
        LexicalProfile {
            tag: LanguageTag::Es,
            words: &[
                "el", "la", "de", "que", "y", "en", "un", "es", "se", "no", "te", "lo", "le",
                "da", "su", "por", "son", "con", "para", "una", "del", "las", "los", "está",
                "también", "como", "pero", "más",
            ],
            markers: compile(&["ñ", r"ción\b", r"dad\b", r"mente\b", "¿", "¡"]),
            foreign_markers: compile(&["ç", "ã", "õ", "ü", "ß"]),
        },
        LexicalProfile {
            tag: LanguageTag::Fr,
            words: &[
                "le", "de", "et", "à", "un", "il", "être", "avoir", "que", "pour", "dans",
                "ce", "son", "une", "sur", "avec", "ne", "se", "pas", "tout", "plus", "par",
                "grand", "en", "si", "me", "même",
            ],
            markers: compile(&[
                "ç", "è", "é", "ê", "ë", "à", "â", "ù", "û", "î", "ï", "ô", "œ",
            ]),
            foreign_markers: compile(&["ñ", "ã", "õ", "ß"]),
        },
        LexicalProfile {
            tag: LanguageTag::De,
            words: &[
                "der", "die", "und", "in", "den", "von", "zu", "das", "mit", "sich", "des",
                "auf", "für", "ist", "im", "dem", "nicht", "ein", "eine", "als", "auch",
                "nach", "wird", "an", "werden", "aus", "er", "hat", "dass",
            ],
            markers: compile(&[
                "ß", "ä", "ö", "ü", "sch", "tsch", r"ung\b", r"heit\b", r"keit\b",
            ]),
            foreign_markers: compile(&["ñ", "ç", "ã", "õ"]),
        },
        LexicalProfile {
            tag: LanguageTag::It,
            words: &[
                "il", "di", "che", "e", "la", "per", "un", "in", "con", "del", "da", "a", "al",
                "le", "si", "dei", "su", "come", "anche", "nel", "della", "gli", "una",
                "delle", "alla", "più", "sono",
            ],
            markers: compile(&["gli", "gn", "sc[ehi]", r"zione\b", r"mente\b", r"ità\b"]),
            foreign_markers: compile(&["ñ", "ç", "ã", "õ", "ß"]),
        },
        LexicalProfile {
            tag: LanguageTag::Pt,
            words: &[
                "o", "de", "a", "e", "do", "da", "em", "um", "para", "com", "não", "uma", "os",
                "no", "se", "na", "por", "mais", "as", "dos", "como", "mas", "foi", "ao", "ele",
                "das", "tem", "seu",
            ],
            markers: compile(&["ã", "õ", "ç", "lh", "nh", r"ção\b", r"mente\b"]),
            foreign_markers: compile(&["ñ", "ß", "ü"]),
        },
    ]
}

/// Decide a language from script alone, if any non-Latin script is present.
pub fn script_language(text: &str) -> Option<LanguageTag> {
    let mut has_han = false;
    for c in text.chars() {
        match c as u32 {
            0x3040..=0x30FF => return Some(LanguageTag::Ja),
            0x4E00..=0x9FFF => has_han = true,
            0x0600..=0x06FF => return Some(LanguageTag::Ar),
            0x0900..=0x097F => return Some(LanguageTag::Hi),
            0x0400..=0x04FF => return Some(LanguageTag::Ru),
            _ => {}
        }
    }
    has_han.then_some(LanguageTag::Zh)
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Bounded memo of identification results keyed by exact input text.
pub struct DetectionCache {
    entries: Mutex<LruCache<String, LanguageTag>>,
}

impl DetectionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, text: &str) -> Option<LanguageTag> {
        self.entries.lock().ok()?.get(text).copied()
    }

    pub fn insert(&self, text: &str, tag: LanguageTag) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(text.to_string(), tag);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .map(|e| e.cap().get())
            .unwrap_or_default()
    }
}

/// Classifies the language of a piece of text. Never fails.
pub struct LanguageIdentifier {
    profiles: Vec<LexicalProfile>,
    min_score: u32,
    cache: DetectionCache,
}

impl std::fmt::Debug for LanguageIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageIdentifier")
            .field("min_score", &self.min_score)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Default for LanguageIdentifier {
    fn default() -> Self {
        Self::new(2, 100)
    }
}

impl LanguageIdentifier {
    /// Create an identifier with the given confidence floor and cache size.
    pub fn new(min_score: u32, cache_capacity: usize) -> Self {
        Self {
            profiles: lexical_profiles(),
            min_score,
            cache: DetectionCache::new(cache_capacity),
        }
    }

    pub fn from_config(config: &crate::config::LanguageConfig) -> Self {
        Self::new(config.min_score, config.cache_capacity)
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    /// Identify the language of `text`, defaulting to English.
    pub fn identify(&self, text: &str) -> LanguageTag {
        if text.trim().is_empty() {
            return LanguageTag::En;
        }
        if let Some(tag) = self.cache.get(text) {
            return tag;
        }
        let tag = self.classify(text);
        self.cache.insert(text, tag);
        tag
    }

    /// Per-language Latin scores, in candidate order. Exposed for diagnostics.
    pub fn scores(&self, text: &str) -> Vec<(LanguageTag, u32)> {
        let lowered = text.to_lowercase();
        let cleaned: String = lowered
            .chars()
            .filter(|c| c.is_alphabetic() || c.is_whitespace())
            .collect();
        let words: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .collect();

        self.profiles
            .iter()
            .map(|profile| {
                let mut score: i64 = 0;
                score += 3 * words.iter().filter(|w| profile.words.contains(w)).count() as i64;
                score += 2 * profile.markers.iter().filter(|m| m.is_match(&lowered)).count() as i64;
                score -= 3 * profile
                    .foreign_markers
                    .iter()
                    .filter(|m| m.is_match(&lowered))
                    .count() as i64;
                (profile.tag, score.max(0) as u32)
            })
            .collect()
    }

    fn classify(&self, text: &str) -> LanguageTag {
        if let Some(tag) = script_language(text) {
            return tag;
        }

        // Ties resolve to the earliest candidate (es, fr, de, it, pt).
        let mut best = (LanguageTag::En, 0u32);
        for (tag, score) in self.scores(text) {
            if score > best.1 {
                best = (tag, score);
            }
        }
        trace!(language = %best.0, score = best.1, "Lexical language score");

        if best.1 < self.min_score {
            LanguageTag::En
        } else {
            best.0
        }
    }
}

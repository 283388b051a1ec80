//! Text-only timing estimate used when no alignment tool can run.

use crate::language::LanguageTag;
use crate::types::{Emotion, MouthCue};

use super::tables;

/// Estimated speaking time for `text`, in seconds.
pub fn estimate_duration(text: &str, language: LanguageTag) -> f64 {
    let chars = text.trim().chars().count();
    if chars == 0 {
        return tables::EMPTY_TEXT_DURATION;
    }
    (chars as f64 * tables::seconds_per_char(language)).max(tables::MIN_ESTIMATED_DURATION)
}

/// The language's canned pattern stretched over `duration`.
///
/// Intensities are scaled by the emotion's vowel factor.
pub fn pattern_cues(duration: f64, language: LanguageTag, emotion: Emotion) -> Vec<MouthCue> {
    let (vowel, _) = tables::emotion_modifiers(emotion);
    tables::pattern(language)
        .iter()
        .map(|step| {
            MouthCue::new(step.from * duration, step.to * duration, step.value)
                .with_intensity(step.intensity * vowel)
        })
        .collect()
}

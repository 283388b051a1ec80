//! Viseme alignment: mouth-shape timing for synthesized speech.
//!
//! The primary path runs an external phonetic aligner over the audio. When
//! no aligner is available, or it fails, a text-only estimate is used, and
//! if that cannot produce a well-formed track the one-second emergency
//! track is returned. [`VisemeAligner::align`] never fails.

pub mod rhubarb;
pub mod synthetic;
pub mod tables;

pub use rhubarb::{MockPhoneticAligner, PhoneticAligner, RawCue, RawCues, RhubarbAligner};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::audio::{self, FfmpegTranscoder, WorkFile};
use crate::config::LipSyncConfig;
use crate::error::AlignmentError;
use crate::language::LanguageTag;
use crate::types::{CueSource, Emotion, MouthCue, TrackMetadata, VisemeTrack};

/// Tolerance used when checking produced tracks.
const EPSILON: f64 = 1e-6;

/// Produces a [`VisemeTrack`] for each synthesized message.
pub struct VisemeAligner {
    aligner: Option<Arc<dyn PhoneticAligner>>,
    transcoder: FfmpegTranscoder,
    work_dir: PathBuf,
    dialog_hint_max_chars: usize,
}

impl VisemeAligner {
    /// `aligner` of `None` means every track is estimated from text.
    pub fn new(aligner: Option<Arc<dyn PhoneticAligner>>, config: &LipSyncConfig) -> Self {
        Self {
            aligner,
            transcoder: FfmpegTranscoder::new(
                config.ffmpeg_path.clone(),
                Duration::from_secs(config.timeout_secs),
            ),
            work_dir: audio::work_dir(config.work_dir.as_deref()),
            dialog_hint_max_chars: config.dialog_hint_max_chars,
        }
    }

    /// Discover the rhubarb executable when enabled.
    pub fn from_config(config: &LipSyncConfig) -> Self {
        let work_dir = audio::work_dir(config.work_dir.as_deref());
        let aligner = if config.use_rhubarb {
            RhubarbAligner::discover(
                &config.rhubarb_paths,
                Duration::from_secs(config.timeout_secs),
                &work_dir,
            )
            .map(|a| Arc::new(a) as Arc<dyn PhoneticAligner>)
        } else {
            None
        };
        if aligner.is_none() {
            info!("No phonetic alignment tool available, lip sync will use text estimates");
        }
        Self::new(aligner, config)
    }

    pub fn has_aligner(&self) -> bool {
        self.aligner.is_some()
    }

    pub async fn align(
        &self,
        text: &str,
        audio: Option<&Bytes>,
        language: LanguageTag,
        emotion: Emotion,
    ) -> VisemeTrack {
        if let (Some(aligner), Some(audio)) = (&self.aligner, audio) {
            match self
                .align_audio(aligner.as_ref(), text, audio, language, emotion)
                .await
            {
                Ok(track) => return track,
                Err(e) => {
                    warn!(error = %e, aligner = aligner.name(), "Phonetic alignment failed, estimating from text")
                }
            }
        }

        match synthetic_track(text, language, emotion) {
            Ok(track) => track,
            Err(e) => {
                warn!(error = %e, "Text estimate failed, using emergency track");
                VisemeTrack::emergency(language, emotion)
            }
        }
    }

    async fn align_audio(
        &self,
        aligner: &dyn PhoneticAligner,
        text: &str,
        audio: &[u8],
        language: LanguageTag,
        emotion: Emotion,
    ) -> Result<VisemeTrack, AlignmentError> {
        let wav = if audio.starts_with(b"RIFF") {
            WorkFile::create(&self.work_dir, "tts_audio", "wav", audio).await?
        } else {
            self.transcoder
                .to_alignment_wav(audio, language, &self.work_dir)
                .await?
        };

        let text = text.trim();
        let dialog = (!text.is_empty() && text.chars().count() < self.dialog_hint_max_chars)
            .then_some(text);
        let raw = aligner.align(wav.path(), dialog).await?;

        let duration = audio::wav_file_duration(wav.path())
            .await
            .or_else(|| raw.metadata.as_ref().and_then(|m| m.duration))
            .or_else(|| raw.mouth_cues.iter().map(|c| c.end).reduce(f64::max))
            .unwrap_or_default();

        let cues = map_cues(&raw.mouth_cues, language, emotion);
        debug!(
            cues = cues.len(),
            duration,
            language = %language,
            "Phonetic alignment produced cues"
        );
        finish_track(
            cues,
            duration,
            TrackMetadata {
                duration,
                language,
                emotion,
                fallback: false,
                emergency: false,
                source: CueSource::Rhubarb,
            },
        )
    }
}

/// Estimate a track from the text alone.
pub fn synthetic_track(
    text: &str,
    language: LanguageTag,
    emotion: Emotion,
) -> Result<VisemeTrack, AlignmentError> {
    let duration = synthetic::estimate_duration(text, language);
    let cues = synthetic::pattern_cues(duration, language, emotion);
    finish_track(
        cues,
        duration,
        TrackMetadata {
            duration,
            language,
            emotion,
            fallback: true,
            emergency: false,
            source: CueSource::Synthetic,
        },
    )
}

/// Map raw labels to visemes and apply emotion intensity.
pub fn map_cues(raw: &[RawCue], language: LanguageTag, emotion: Emotion) -> Vec<MouthCue> {
    let (vowel, consonant) = tables::emotion_modifiers(emotion);
    let mut cues: Vec<MouthCue> = raw
        .iter()
        .filter(|c| c.start.is_finite() && c.end.is_finite())
        .map(|c| {
            let value = tables::map_phoneme(&c.value, language);
            let base = c.intensity.unwrap_or(1.0);
            let mut cue = MouthCue::new(c.start.max(0.0), c.end.max(c.start), value);
            if value.is_vowel() {
                cue.intensity = Some(base * vowel);
            } else if value.is_consonant() {
                cue.intensity = Some(base * consonant);
            } else {
                cue.intensity = c.intensity;
            }
            cue
        })
        .collect();
    cues.sort_by(|a, b| a.start.total_cmp(&b.start));
    cues
}

/// Flag cues that follow a similar shape with (almost) no gap.
pub fn smooth(cues: &mut [MouthCue], language: LanguageTag) {
    let factor = tables::smoothing_factor(language);
    for i in 1..cues.len() {
        let (prev, cur) = (&cues[i - 1], &cues[i]);
        if tables::similar(prev.value, cur.value) && cur.start - prev.end < tables::SMOOTHING_GAP {
            cues[i].smooth_transition = Some(factor);
            cues[i].blend_from_previous = true;
        }
    }
}

/// Scale cue lengths for the language, then clamp so the track stays
/// ordered and ends exactly at `duration`.
pub fn adjust_timing(cues: &mut [MouthCue], language: LanguageTag, duration: f64) {
    let timing = tables::timing(language);
    for cue in cues.iter_mut() {
        let scaled = (cue.duration() * timing.multiplier).max(timing.min_duration);
        cue.end = cue.start + scaled;
    }
    for i in 1..cues.len() {
        let next_start = cues[i].start;
        let prev = &mut cues[i - 1];
        prev.end = prev.end.min(next_start);
    }
    if let Some(last) = cues.last_mut() {
        last.end = duration.max(last.start);
    }
}

fn finish_track(
    mut cues: Vec<MouthCue>,
    duration: f64,
    mut metadata: TrackMetadata,
) -> Result<VisemeTrack, AlignmentError> {
    if cues.is_empty() {
        return Err(AlignmentError::MalformedTrack {
            message: "no mouth cues".to_string(),
        });
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(AlignmentError::MalformedTrack {
            message: format!("invalid duration {duration}"),
        });
    }

    smooth(&mut cues, metadata.language);
    adjust_timing(&mut cues, metadata.language, duration);
    if let Some(last) = cues.last() {
        metadata.duration = last.end;
    }

    let track = VisemeTrack {
        mouth_cues: cues,
        metadata,
    };
    if track.is_well_formed(EPSILON) {
        Ok(track)
    } else {
        Err(AlignmentError::MalformedTrack {
            message: "cues overlap or do not end at the track duration".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav;
    use crate::types::Viseme;

    fn config() -> LipSyncConfig {
        LipSyncConfig {
            ffmpeg_path: "/nonexistent/visage-ffmpeg".to_string(),
            ..LipSyncConfig::default()
        }
    }

    fn wav(seconds: f64) -> Bytes {
        let samples = vec![0.0f32; (16000.0 * seconds) as usize];
        Bytes::from(encode_wav(&samples, 16000).unwrap())
    }

    #[tokio::test]
    async fn test_without_aligner_uses_text_estimate() {
        let aligner = VisemeAligner::new(None, &config());
        let track = aligner
            .align("Hello there", None, LanguageTag::En, Emotion::Neutral)
            .await;
        assert!(track.metadata.fallback);
        assert_eq!(track.metadata.source, CueSource::Synthetic);
        assert!(track.duration() > 0.0);
        assert!(track.is_well_formed(EPSILON));
    }

    #[tokio::test]
    async fn test_unavailable_tool_falls_back() {
        let mock = Arc::new(MockPhoneticAligner::unavailable());
        let aligner = VisemeAligner::new(Some(mock.clone() as Arc<dyn PhoneticAligner>), &config());
        let track = aligner
            .align("Hello there", Some(&wav(0.5)), LanguageTag::En, Emotion::Happy)
            .await;
        assert_eq!(mock.call_count(), 1);
        assert!(track.metadata.fallback);
        assert!(track.duration() > 0.0);
        assert!(track.is_well_formed(EPSILON));
    }

    #[tokio::test]
    async fn test_aligner_cues_are_post_processed() {
        let raw = RawCues::new(vec![
            RawCue::new(0.0, 0.10, "X"),
            RawCue::new(0.10, 0.30, "D"),
            RawCue::new(0.30, 0.55, "E"),
            RawCue::new(0.55, 0.80, "B"),
        ]);
        let mock = Arc::new(MockPhoneticAligner::with_cues(raw));
        let aligner = VisemeAligner::new(Some(mock.clone() as Arc<dyn PhoneticAligner>), &config());
        let track = aligner
            .align("Good day", Some(&wav(1.0)), LanguageTag::En, Emotion::Happy)
            .await;

        assert!(!track.metadata.fallback);
        assert_eq!(track.metadata.source, CueSource::Rhubarb);
        assert!((track.duration() - 1.0).abs() < 1e-6);
        assert!(track.is_well_formed(EPSILON));

        let values: Vec<Viseme> = track.mouth_cues.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![Viseme::A, Viseme::D, Viseme::E, Viseme::B]);
        assert_eq!(track.mouth_cues[1].intensity, Some(1.2));
        assert_eq!(track.mouth_cues[3].intensity, Some(1.1));
        // D followed by E with no gap is blended
        assert!(track.mouth_cues[2].blend_from_previous);
        assert_eq!(track.mouth_cues[2].smooth_transition, Some(0.3));
        assert!(!track.mouth_cues[3].blend_from_previous);

        assert_eq!(mock.dialogs(), vec![Some("Good day".to_string())]);
    }

    #[tokio::test]
    async fn test_long_text_gets_no_dialog_hint() {
        let mock = Arc::new(MockPhoneticAligner::with_cues(RawCues::new(vec![RawCue::new(
            0.0, 0.4, "C",
        )])));
        let aligner = VisemeAligner::new(Some(mock.clone() as Arc<dyn PhoneticAligner>), &config());
        let text = "word ".repeat(120);
        aligner
            .align(&text, Some(&wav(0.5)), LanguageTag::En, Emotion::Neutral)
            .await;
        assert_eq!(mock.dialogs(), vec![None]);
    }

    #[tokio::test]
    async fn test_empty_tool_output_falls_back() {
        let mock = Arc::new(MockPhoneticAligner::with_cues(RawCues::default()));
        let aligner = VisemeAligner::new(Some(mock as Arc<dyn PhoneticAligner>), &config());
        let track = aligner
            .align("Bonjour", Some(&wav(0.5)), LanguageTag::Fr, Emotion::Neutral)
            .await;
        assert!(track.metadata.fallback);
        assert_eq!(track.mouth_cues[0].value, Viseme::F);
    }

    #[tokio::test]
    async fn test_non_wav_audio_without_converter_falls_back() {
        let mock = Arc::new(MockPhoneticAligner::unavailable());
        let aligner = VisemeAligner::new(Some(mock.clone() as Arc<dyn PhoneticAligner>), &config());
        let mp3 = Bytes::from_static(b"ID3\x03\x00\x00\x00fake mp3 frames");
        let track = aligner
            .align("Hola amigo", Some(&mp3), LanguageTag::Es, Emotion::Neutral)
            .await;
        // Conversion failed before the aligner was reached
        assert_eq!(mock.call_count(), 0);
        assert_eq!(track.metadata.source, CueSource::Synthetic);
    }

    #[test]
    fn test_adjust_timing_clamps_and_ends_at_duration() {
        let mut cues = vec![
            MouthCue::new(0.0, 0.2, Viseme::D),
            MouthCue::new(0.2, 0.21, Viseme::C),
            MouthCue::new(0.21, 0.5, Viseme::A),
        ];
        adjust_timing(&mut cues, LanguageTag::Ja, 0.6);
        // 0.2 * 1.2 would overlap the next cue
        assert!((cues[0].end - 0.2).abs() < 1e-9);
        // 0.01 raised to the 40 ms minimum, then clamped to the next start
        assert!((cues[1].end - 0.21).abs() < 1e-9);
        assert!((cues[2].end - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_smooth_respects_gap() {
        let mut cues = vec![
            MouthCue::new(0.0, 0.1, Viseme::G),
            MouthCue::new(0.15, 0.3, Viseme::H),
            MouthCue::new(0.3, 0.4, Viseme::G),
        ];
        smooth(&mut cues, LanguageTag::Ja);
        assert!(!cues[1].blend_from_previous);
        assert!(cues[2].blend_from_previous);
        assert_eq!(cues[2].smooth_transition, Some(0.6));
    }

    #[test]
    fn test_synthetic_track_for_every_language() {
        for language in LanguageTag::ALL {
            let track = synthetic_track("Some words to say", language, Emotion::Neutral).unwrap();
            assert!(track.is_well_formed(EPSILON), "{language}");
            assert!(track.metadata.fallback);
        }
    }
}

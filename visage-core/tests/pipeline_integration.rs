//! Integration tests for the request pipeline.
//!
//! Every external service is replaced by its mock so these run offline:
//! MockLlmProvider, MockSttProvider, MockTtsProvider and MockPhoneticAligner.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use visage_core::config::{LipSyncConfig, LlmConfig, TranscriptionConfig};
use visage_core::error::SynthesisError;
use visage_core::generator::{LlmProvider, MockLlmProvider};
use visage_core::lipsync::{MockPhoneticAligner, PhoneticAligner, RawCue, RawCues};
use visage_core::types::CueSource;
use visage_core::voice::{MockSttProvider, MockTtsProvider, SttResponse};
use visage_core::{
    LanguageIdentifier, LanguageTag, Orchestrator, PipelineState, ResponseGenerator, RetryPolicy,
    Synthesizer, Transcriber, Utterance, VisemeAligner,
};

fn lipsync_config(work_dir: &std::path::Path) -> LipSyncConfig {
    LipSyncConfig {
        use_rhubarb: false,
        work_dir: Some(work_dir.to_path_buf()),
        ..LipSyncConfig::default()
    }
}

/// Orchestrator with an optional LLM, a mock synthesizer and no phonetic aligner.
fn orchestrator(
    llm: Option<Arc<MockLlmProvider>>,
    tts: Arc<MockTtsProvider>,
    work_dir: &std::path::Path,
) -> Orchestrator {
    let generator = ResponseGenerator::new(
        llm.map(|m| m as Arc<dyn LlmProvider>),
        &LlmConfig::default(),
    )
    .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)));
    Orchestrator::new(
        LanguageIdentifier::new(2, 64),
        generator,
        VisemeAligner::new(None, &lipsync_config(work_dir)),
    )
    .with_synthesizer(Synthesizer::new(
        tts,
        RetryPolicy::new(3, Duration::from_millis(10)),
    ))
}

fn transcriber(mock: Arc<MockSttProvider>) -> Transcriber {
    Transcriber::new(mock, &TranscriptionConfig::default())
        .without_reencoding()
        .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)))
}

#[tokio::test]
async fn test_greeting_produces_synchronized_messages() {
    let dir = tempfile::tempdir().unwrap();
    let tts = Arc::new(MockTtsProvider::new());
    let pipeline = orchestrator(None, tts.clone(), dir.path());

    let outcome = pipeline.process(Utterance::text("Hello")).await.unwrap();

    assert_eq!(outcome.language, LanguageTag::En);
    assert!(!outcome.degraded);
    assert_eq!(outcome.states.last(), Some(&PipelineState::Delivered));
    assert!(!outcome.messages.is_empty());
    assert_eq!(tts.call_count(), outcome.messages.len());

    for message in &outcome.messages {
        assert!(message.audio.is_some());
        let track = message.lipsync.as_ref().unwrap();
        assert!(!track.mouth_cues.is_empty());
        assert!(track.is_well_formed(1e-6));
        assert_eq!(track.metadata.source, CueSource::Synthetic);
        assert!(message.emotion.is_some());
        assert!(message.intensity.is_some());
    }
}

#[tokio::test]
async fn test_phonetic_aligner_track_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let cues = RawCues::new(vec![
        RawCue::new(0.0, 0.2, "X"),
        RawCue::new(0.2, 0.5, "D"),
        RawCue::new(0.5, 0.9, "B"),
    ]);
    let aligner = Arc::new(MockPhoneticAligner::with_results(vec![Ok(cues)]));
    let llm = Arc::new(MockLlmProvider::with_response(&MockLlmProvider::reply(&[(
        "That sounds wonderful.",
        "smile",
        "TalkingOne",
    )])));

    let generator = ResponseGenerator::new(
        Some(llm as Arc<dyn LlmProvider>),
        &LlmConfig::default(),
    );
    let pipeline = Orchestrator::new(
        LanguageIdentifier::new(2, 64),
        generator,
        VisemeAligner::new(
            Some(aligner.clone() as Arc<dyn PhoneticAligner>),
            &lipsync_config(dir.path()),
        ),
    )
    .with_synthesizer(Synthesizer::new(
        Arc::new(MockTtsProvider::new()),
        RetryPolicy::none(),
    ));

    let outcome = pipeline
        .process(Utterance::text("I just got back from a long hike"))
        .await
        .unwrap();

    assert!(!outcome.degraded);
    assert_eq!(aligner.call_count(), 1);
    assert_eq!(
        aligner.dialogs(),
        vec![Some("That sounds wonderful.".to_string())]
    );
    let track = outcome.messages[0].lipsync.as_ref().unwrap();
    assert_eq!(track.metadata.source, CueSource::Rhubarb);
    assert!(!track.metadata.fallback);
    assert!(track.is_well_formed(1e-6));
}

#[tokio::test(start_paused = true)]
async fn test_message_order_survives_slow_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmProvider::with_response(&MockLlmProvider::reply(&[
        ("First message here.", "smile", "TalkingOne"),
        ("Second one.", "default", "TalkingThree"),
        ("Third and last.", "smile", "Idle"),
    ])));
    let tts = Arc::new(
        MockTtsProvider::new().with_delay("First message here.", Duration::from_secs(2)),
    );
    let pipeline = orchestrator(Some(llm), tts.clone(), dir.path()).with_max_concurrent(3);

    let outcome = pipeline
        .process(Utterance::text("Tell me three things"))
        .await
        .unwrap();

    let texts: Vec<&str> = outcome.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["First message here.", "Second one.", "Third and last."]
    );

    // All three requests were in flight together.
    let calls = tts.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, at)| *at == calls[0].1));
}

#[tokio::test(start_paused = true)]
async fn test_single_slot_synthesizes_sequentially() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmProvider::with_response(&MockLlmProvider::reply(&[
        ("Slow start.", "smile", "TalkingOne"),
        ("Quick finish.", "smile", "TalkingOne"),
    ])));
    let tts = Arc::new(MockTtsProvider::new().with_delay("Slow start.", Duration::from_secs(2)));
    let pipeline = orchestrator(Some(llm), tts.clone(), dir.path()).with_max_concurrent(1);

    pipeline
        .process(Utterance::text("Go ahead"))
        .await
        .unwrap();

    let calls = tts.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].1 - calls[0].1 >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_partial_synthesis_failure_keeps_media_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmProvider::with_response(&MockLlmProvider::reply(&[
        ("This one loses its voice.", "sad", "SadIdle"),
        ("This one keeps it.", "smile", "TalkingOne"),
    ])));
    let tts = Arc::new(MockTtsProvider::new().with_results(vec![Err(SynthesisError::AuthError)]));
    let pipeline = orchestrator(Some(llm), tts, dir.path()).with_max_concurrent(1);

    let outcome = pipeline
        .process(Utterance::text("Say two things"))
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.states.last(), Some(&PipelineState::Degraded));
    assert_eq!(outcome.messages.len(), 2);
    assert!(outcome.messages.iter().all(|m| m.media_consistent()));
    assert!(outcome.messages[0].audio.is_none());
    assert!(outcome.messages[1].audio.is_some());
}

#[tokio::test]
async fn test_requested_language_overrides_detection() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = orchestrator(None, Arc::new(MockTtsProvider::new()), dir.path());

    let outcome = pipeline
        .process(Utterance::text("What is your name?").with_language(Some(LanguageTag::Fr)))
        .await
        .unwrap();

    assert_eq!(outcome.language, LanguageTag::Fr);
    assert!(outcome.messages.iter().all(|m| m.language == LanguageTag::Fr));
}

#[tokio::test]
async fn test_script_detection_picks_japanese() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = orchestrator(None, Arc::new(MockTtsProvider::new()), dir.path());

    let outcome = pipeline
        .process(Utterance::text("こんにちは、元気ですか"))
        .await
        .unwrap();

    assert_eq!(outcome.language, LanguageTag::Ja);
}

#[tokio::test]
async fn test_speech_request_uses_transcript_language() {
    let dir = tempfile::tempdir().unwrap();
    let stt = Arc::new(MockSttProvider::with_responses(vec![SttResponse {
        text: "hola, ¿cómo estás?".to_string(),
        language: Some("spanish".to_string()),
        no_speech_probs: vec![0.05],
        duration_secs: Some(1.8),
    }]));
    let pipeline = orchestrator(None, Arc::new(MockTtsProvider::new()), dir.path())
        .with_transcriber(transcriber(stt.clone()));

    let outcome = pipeline
        .process(Utterance::audio(vec![7u8; 4000], "audio/webm"))
        .await
        .unwrap();

    assert_eq!(stt.call_count(), 1);
    assert_eq!(outcome.language, LanguageTag::Es);
    assert_eq!(outcome.transcription.as_deref(), Some("Hola, ¿cómo estás?"));
    assert!(outcome.states.contains(&PipelineState::Transcribing));
    assert!(!outcome.degraded);
    assert!(outcome.messages.iter().all(|m| m.language == LanguageTag::Es));
}

#[tokio::test]
async fn test_downgraded_transcript_is_reidentified_from_text() {
    let dir = tempfile::tempdir().unwrap();
    let stt = Arc::new(MockSttProvider::with_responses(vec![
        SttResponse {
            text: "hola, ¿cómo estás? gracias por todo".to_string(),
            language: Some("spanish".to_string()),
            no_speech_probs: vec![0.6],
            duration_secs: Some(2.0),
        },
        SttResponse {
            text: "okay sure".to_string(),
            language: Some("spanish".to_string()),
            no_speech_probs: vec![0.6],
            duration_secs: Some(0.8),
        },
    ]));
    let pipeline = orchestrator(None, Arc::new(MockTtsProvider::new()), dir.path())
        .with_transcriber(transcriber(stt.clone()));

    // The low-confidence "spanish" guess is downgraded to English, but the
    // transcript itself reads as Spanish.
    let restored = pipeline
        .process(Utterance::audio(vec![7u8; 4000], "audio/webm"))
        .await
        .unwrap();
    assert_eq!(restored.language, LanguageTag::Es);
    assert!(restored.messages.iter().all(|m| m.language == LanguageTag::Es));

    // Without lexical evidence the downgrade stands.
    let downgraded = pipeline
        .process(Utterance::audio(vec![7u8; 4000], "audio/webm"))
        .await
        .unwrap();
    assert_eq!(downgraded.language, LanguageTag::En);
    assert_eq!(downgraded.transcription.as_deref(), Some("Okay sure."));
    assert_eq!(stt.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transcription_failure_returns_apology() {
    let dir = tempfile::tempdir().unwrap();
    let stt = Arc::new(MockSttProvider::new());
    let tts = Arc::new(MockTtsProvider::new());
    let pipeline = orchestrator(None, tts.clone(), dir.path())
        .with_transcriber(transcriber(stt.clone()));

    let outcome = pipeline
        .process(Utterance::audio(vec![7u8; 4000], "audio/webm"))
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.messages.len(), 1);
    assert!(outcome.messages[0].text.contains("trouble understanding"));
    assert!(outcome.messages[0].fallback_used);
    assert_eq!(outcome.transcription.as_deref(), Some(""));
    assert_eq!(tts.call_count(), 0);
    // Two attempts in verbose mode, then one plain-text attempt.
    assert_eq!(stt.call_count(), 3);
}

#[tokio::test]
async fn test_empty_transcript_asks_to_repeat() {
    let dir = tempfile::tempdir().unwrap();
    let stt = Arc::new(MockSttProvider::with_responses(vec![SttResponse::text("   ")]));
    let pipeline = orchestrator(None, Arc::new(MockTtsProvider::new()), dir.path())
        .with_transcriber(transcriber(stt));

    let outcome = pipeline
        .process(
            Utterance::audio(Bytes::from(vec![7u8; 4000]), "audio/ogg")
                .with_language(Some(LanguageTag::De)),
        )
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.language, LanguageTag::De);
    assert!(outcome.messages[0].text.contains("repeat"));
}

#[tokio::test]
async fn test_undersized_audio_is_rejected_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let stt = Arc::new(MockSttProvider::new());
    let pipeline = orchestrator(None, Arc::new(MockTtsProvider::new()), dir.path())
        .with_transcriber(transcriber(stt.clone()));

    let err = pipeline
        .process(Utterance::audio(vec![1u8; 10], "audio/webm"))
        .await
        .unwrap_err();

    assert!(matches!(err, visage_core::VisageError::Input(_)));
    assert_eq!(stt.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_llm_failure_degrades_to_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLlmProvider::new());
    let pipeline = orchestrator(Some(llm.clone()), Arc::new(MockTtsProvider::new()), dir.path());

    let outcome = pipeline
        .process(Utterance::text("How is the weather today?"))
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert!(llm.call_count() >= 1);
    assert!(outcome.messages.iter().all(|m| m.fallback_used));
    assert!(outcome.messages.iter().all(|m| m.media_consistent()));
}

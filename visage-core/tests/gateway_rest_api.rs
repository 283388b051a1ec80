//! Integration tests for the gateway REST API endpoints.
//!
//! Routes are driven in-process through `tower::ServiceExt::oneshot`, with
//! mock providers behind the pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tower::ServiceExt;
use visage_core::config::{LipSyncConfig, LlmConfig, TranscriptionConfig};
use visage_core::gateway::{
    GatewayConfig, GatewayServer, SharedGateway, body_limit_for_audio, gateway_router,
};
use visage_core::voice::{MockSttProvider, MockTtsProvider, SttResponse};
use visage_core::{
    LanguageIdentifier, Orchestrator, ResponseGenerator, RetryPolicy, Synthesizer, Transcriber,
    VisemeAligner,
};

fn base_orchestrator() -> Orchestrator {
    let lipsync = LipSyncConfig {
        use_rhubarb: false,
        ..LipSyncConfig::default()
    };
    Orchestrator::new(
        LanguageIdentifier::new(2, 64),
        ResponseGenerator::new(None, &LlmConfig::default()),
        VisemeAligner::new(None, &lipsync),
    )
}

fn with_tts(orchestrator: Orchestrator) -> Orchestrator {
    orchestrator.with_synthesizer(Synthesizer::new(
        Arc::new(MockTtsProvider::new()),
        RetryPolicy::none(),
    ))
}

fn with_stt(orchestrator: Orchestrator, mock: Arc<MockSttProvider>) -> Orchestrator {
    orchestrator.with_transcriber(
        Transcriber::new(mock, &TranscriptionConfig::default())
            .without_reencoding()
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1))),
    )
}

fn make_gateway(orchestrator: Orchestrator) -> SharedGateway {
    Arc::new(GatewayServer::new(GatewayConfig::default(), orchestrator))
}

fn make_post_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(gw: SharedGateway, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let app = gateway_router(gw);
    let resp = ServiceExt::<Request<Body>>::oneshot(app, request)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 10_000_000)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get_json(gw: SharedGateway, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(gw, request).await
}

// --- GET /health ---

#[tokio::test]
async fn test_health_reports_configured_services() {
    let gw = make_gateway(with_tts(base_orchestrator()));
    let (status, json) = get_json(gw, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["services"]["synthesis"], true);
    assert_eq!(json["services"]["transcription"], false);
    assert_eq!(json["services"]["llm"], false);
    assert_eq!(json["services"]["phoneticAligner"], false);
}

// --- GET /languages ---

#[tokio::test]
async fn test_languages_lists_all_supported() {
    let gw = make_gateway(base_orchestrator());
    let (status, json) = get_json(gw, "/languages").await;
    assert_eq!(status, StatusCode::OK);
    let languages = json["supportedLanguages"].as_object().unwrap();
    assert_eq!(languages.len(), 11);
    assert_eq!(languages["es"]["name"], "Spanish");
    assert_eq!(languages["ja"]["native"], "日本語");
}

// --- GET /voices ---

#[tokio::test]
async fn test_voices_lists_mock_voices() {
    let gw = make_gateway(with_tts(base_orchestrator()));
    let (status, json) = get_json(gw, "/voices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["voices"].as_array().unwrap().len(), 2);
}

// --- POST /tts ---

#[tokio::test]
async fn test_tts_rejects_empty_message() {
    let gw = make_gateway(with_tts(base_orchestrator()));
    let (status, json) = send(
        gw,
        make_post_request("/tts", serde_json::json!({ "message": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_tts_rejects_missing_message() {
    let gw = make_gateway(with_tts(base_orchestrator()));
    let (status, _) = send(gw, make_post_request("/tts", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tts_returns_synchronized_messages() {
    let gw = make_gateway(with_tts(base_orchestrator()));
    let (status, json) = send(
        gw,
        make_post_request(
            "/tts",
            serde_json::json!({ "message": "Hola, ¿cómo estás?", "language": "auto" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["language"], "es");
    assert_eq!(json["degraded"], false);
    assert!(json.get("transcription").is_none());

    let messages = json["messages"].as_array().unwrap();
    assert!(!messages.is_empty() && messages.len() <= 3);
    for message in messages {
        let audio = message["audio"].as_str().unwrap();
        assert!(!STANDARD.decode(audio).unwrap().is_empty());
        let cues = message["lipsync"]["mouthCues"].as_array().unwrap();
        assert!(!cues.is_empty());
        assert!(message["facialExpression"].is_string());
        assert!(message["animation"].is_string());
    }
}

#[tokio::test]
async fn test_tts_without_synthesis_returns_text_only() {
    let gw = make_gateway(base_orchestrator());
    let (status, json) = send(
        gw,
        make_post_request(
            "/tts",
            serde_json::json!({ "message": "Hello", "language": "english" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    for message in json["messages"].as_array().unwrap() {
        assert!(message["audio"].is_null());
        assert!(message["lipsync"].is_null());
    }
}

#[tokio::test]
async fn test_tts_oversized_body_is_rejected() {
    let config = GatewayConfig {
        max_body_bytes: 64,
        ..GatewayConfig::default()
    };
    let gw = Arc::new(GatewayServer::new(config, base_orchestrator()));
    let (status, json) = send(
        gw,
        make_post_request("/tts", serde_json::json!({ "message": "a".repeat(500) })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_tts_malformed_json_uses_error_body() {
    let gw = make_gateway(base_orchestrator());
    let request = Request::builder()
        .method("POST")
        .uri("/tts")
        .header("content-type", "application/json")
        .body(Body::from("{\"message\": "))
        .unwrap();
    let (status, json) = send(gw, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_tts_missing_content_type_uses_error_body() {
    let gw = make_gateway(base_orchestrator());
    let request = Request::builder()
        .method("POST")
        .uri("/tts")
        .body(Body::from(r#"{"message": "Hello"}"#))
        .unwrap();
    let (status, json) = send(gw, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(json["error"].as_str().unwrap().contains("Content-Type"));
}

// --- POST /sts ---

#[tokio::test]
async fn test_sts_empty_audio_makes_no_external_calls() {
    let stt = Arc::new(MockSttProvider::new());
    let gw = make_gateway(with_stt(base_orchestrator(), stt.clone()));
    let (status, json) = send(
        gw,
        make_post_request("/sts", serde_json::json!({ "audio": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
    assert_eq!(stt.call_count(), 0);
}

#[tokio::test]
async fn test_sts_rejects_bad_base64() {
    let stt = Arc::new(MockSttProvider::new());
    let gw = make_gateway(with_stt(base_orchestrator(), stt.clone()));
    let (status, _) = send(
        gw,
        make_post_request("/sts", serde_json::json!({ "audio": "%%% not audio %%%" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(stt.call_count(), 0);
}

#[tokio::test]
async fn test_sts_without_transcriber_is_server_error() {
    let gw = make_gateway(base_orchestrator());
    let audio = STANDARD.encode(vec![3u8; 4000]);
    let (status, json) = send(
        gw,
        make_post_request("/sts", serde_json::json!({ "audio": audio })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_sts_returns_transcription() {
    let stt = Arc::new(MockSttProvider::with_responses(vec![SttResponse {
        text: "what is your name".to_string(),
        language: Some("english".to_string()),
        no_speech_probs: vec![0.02],
        duration_secs: Some(1.2),
    }]));
    let gw = make_gateway(with_tts(with_stt(base_orchestrator(), stt.clone())));
    let audio = format!(
        "data:audio/webm;codecs=opus;base64,{}",
        STANDARD.encode(vec![5u8; 4000])
    );
    let (status, json) = send(
        gw,
        make_post_request(
            "/sts",
            serde_json::json!({ "audio": audio, "mimeType": "audio/webm" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transcription"], "What is your name.");
    assert_eq!(json["language"], "en");
    assert_eq!(stt.call_count(), 1);
    let request = &stt.requests()[0];
    assert_eq!(request.file_name, "audio.webm");
}

#[tokio::test]
async fn test_sts_accepts_audio_near_transcription_limit() {
    let stt = Arc::new(MockSttProvider::with_responses(vec![SttResponse {
        text: "long recording".to_string(),
        language: Some("english".to_string()),
        no_speech_probs: vec![0.05],
        duration_secs: Some(600.0),
    }]));
    let gw = make_gateway(with_stt(base_orchestrator(), stt.clone()));
    let audio = STANDARD.encode(vec![7u8; 24 * 1024 * 1024]);
    let (status, json) = send(
        gw,
        make_post_request("/sts", serde_json::json!({ "audio": audio })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transcription"], "Long recording.");
    assert_eq!(stt.call_count(), 1);
    assert_eq!(stt.requests()[0].audio.len(), 24 * 1024 * 1024);
}

#[tokio::test]
async fn test_small_body_limit_is_raised_for_transcription() {
    let stt = Arc::new(MockSttProvider::new());
    let config = GatewayConfig {
        max_body_bytes: 1024,
        ..GatewayConfig::default()
    };
    let gw = Arc::new(GatewayServer::new(
        config,
        with_stt(base_orchestrator(), stt),
    ));
    assert_eq!(
        gw.config().max_body_bytes,
        body_limit_for_audio(TranscriptionConfig::default().max_audio_bytes)
    );
}

// --- CORS ---

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let gw = make_gateway(base_orchestrator());
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/tts")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let resp = gateway_router(gw).oneshot(request).await.unwrap();
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );
}

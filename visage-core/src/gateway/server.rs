//! HTTP gateway server built on axum.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State, rejection::JsonRejection},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{GatewayConfig, body_limit_for_audio};
use crate::error::{InputError, TranscriptionError, VisageError};
use crate::language::LanguageTag;
use crate::pipeline::{Orchestrator, PipelineOutcome, decode_audio};
use crate::types::Utterance;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayServer>;

/// The HTTP gateway: configuration plus the request pipeline.
pub struct GatewayServer {
    config: GatewayConfig,
    orchestrator: Orchestrator,
    started_at: Instant,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("config", &self.config)
            .field("llm", &self.orchestrator.llm_configured())
            .field("transcription", &self.orchestrator.transcriber().is_some())
            .field("synthesis", &self.orchestrator.synthesizer().is_some())
            .finish()
    }
}

impl GatewayServer {
    /// The body limit is raised when it could not carry the largest audio
    /// clip the transcriber accepts.
    pub fn new(mut config: GatewayConfig, orchestrator: Orchestrator) -> Self {
        if let Some(transcriber) = orchestrator.transcriber() {
            let needed = body_limit_for_audio(transcriber.max_audio_bytes());
            if config.max_body_bytes < needed {
                warn!(
                    configured = config.max_body_bytes,
                    needed, "Raising gateway body limit to fit encoded audio"
                );
                config.max_body_bytes = needed;
            }
        }
        Self {
            config,
            orchestrator,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// An error response: `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<VisageError> for ApiError {
    fn from(e: VisageError) -> Self {
        match e {
            VisageError::Input(e) | VisageError::Transcription(TranscriptionError::InvalidInput(e)) => {
                e.into()
            }
            VisageError::Transcription(TranscriptionError::NotConfigured) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Speech transcription service is not configured".to_string(),
            },
            other => {
                error!(error = %other, "Request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(status = %rejection.status(), "Rejected request body");
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// `None` for absent, "auto" or unrecognized names.
fn requested_language(language: Option<&str>) -> Option<LanguageTag> {
    let name = language?.trim();
    let tag = LanguageTag::from_name(name);
    if tag.is_none() && !name.is_empty() && !name.eq_ignore_ascii_case("auto") {
        warn!(language = name, "Ignoring unsupported language, detecting instead");
    }
    tag
}

fn reply_body(outcome: PipelineOutcome) -> Value {
    let mut body = json!({
        "messages": outcome.messages,
        "language": outcome.language,
        "degraded": outcome.degraded,
    });
    if let Some(transcription) = outcome.transcription {
        body["transcription"] = json!(transcription);
    }
    body
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(e) => {
            warn!(origin, error = %e, "Invalid CORS origin, cross-origin requests will be refused");
            layer
        }
    }
}

/// Build the axum Router with every gateway route.
pub fn router(shared: SharedGateway) -> Router {
    let cors = cors_layer(&shared.config.cors_origin);
    let body_limit = shared.config.max_body_bytes;
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/languages", get(languages_handler))
        .route("/voices", get(voices_handler))
        .route("/tts", post(text_handler))
        .route("/sts", post(speech_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                id = %Uuid::new_v4(),
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .with_state(shared)
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let pipeline = gw.orchestrator();
    let languages: Vec<&str> = LanguageTag::ALL.iter().map(|l| l.code()).collect();
    Json(json!({
        "status": "ok",
        "services": {
            "llm": pipeline.llm_configured(),
            "transcription": pipeline.transcriber().is_some(),
            "synthesis": pipeline.synthesizer().is_some(),
            "phoneticAligner": pipeline.aligner_available(),
        },
        "supportedLanguages": languages,
        "uptimeSecs": gw.uptime_secs(),
    }))
}

async fn languages_handler() -> impl IntoResponse {
    let languages: serde_json::Map<String, Value> = LanguageTag::ALL
        .iter()
        .map(|l| {
            (
                l.code().to_string(),
                json!({ "name": l.display_name(), "native": l.native_name() }),
            )
        })
        .collect();
    Json(json!({ "supportedLanguages": languages }))
}

async fn voices_handler(State(gw): State<SharedGateway>) -> Result<Json<Value>, ApiError> {
    let synthesizer = gw
        .orchestrator()
        .synthesizer()
        .ok_or_else(|| ApiError::bad_request("Speech synthesis is not configured"))?;
    let voices = synthesizer.list_voices().await.map_err(|e| {
        warn!(error = %e, "Voice listing failed");
        ApiError {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        }
    })?;
    Ok(Json(json!({ "voices": voices })))
}

async fn text_handler(
    State(gw): State<SharedGateway>,
    payload: Result<Json<TextRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or(InputError::EmptyMessage)?;
    let utterance =
        Utterance::text(message).with_language(requested_language(request.language.as_deref()));

    let outcome = gw.orchestrator().process(utterance).await?;
    Ok(Json(reply_body(outcome)))
}

async fn speech_handler(
    State(gw): State<SharedGateway>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let encoded = request.audio.ok_or(InputError::MissingAudio)?;
    let audio = decode_audio(&encoded)?;
    let mime_type = request
        .mime_type
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "audio/webm".to_string());
    info!(bytes = audio.len(), mime_type = %mime_type, "Received speech request");

    let utterance = Utterance::audio(audio, mime_type)
        .with_language(requested_language(request.language.as_deref()));
    let outcome = gw.orchestrator().process(utterance).await?;
    Ok(Json(reply_body(outcome)))
}

/// Serve the gateway on the configured address until `shutdown` is cancelled.
pub async fn run(gw: SharedGateway, shutdown: CancellationToken) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", gw.config.host, gw.config.port);
    let app = router(gw);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LipSyncConfig, LlmConfig};
    use crate::generator::ResponseGenerator;
    use crate::language::LanguageIdentifier;
    use crate::lipsync::VisemeAligner;
    use axum::body::Body;
    use tower::ServiceExt;

    fn make_shared_gateway() -> SharedGateway {
        let lipsync = LipSyncConfig {
            use_rhubarb: false,
            ..LipSyncConfig::default()
        };
        let orchestrator = Orchestrator::new(
            LanguageIdentifier::new(2, 16),
            ResponseGenerator::new(None, &LlmConfig::default()),
            VisemeAligner::new(None, &lipsync),
        );
        Arc::new(GatewayServer::new(GatewayConfig::default(), orchestrator))
    }

    async fn send(app: Router, req: axum::http::Request<Body>) -> (StatusCode, Value) {
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_requested_language() {
        assert_eq!(requested_language(Some("es")), Some(LanguageTag::Es));
        assert_eq!(requested_language(Some("French")), Some(LanguageTag::Fr));
        assert_eq!(requested_language(Some("auto")), None);
        assert_eq!(requested_language(Some("tlh")), None);
        assert_eq!(requested_language(None), None);
    }

    #[test]
    fn test_error_status_mapping() {
        let input: ApiError = VisageError::Input(InputError::MissingAudio).into();
        assert_eq!(input.status, StatusCode::BAD_REQUEST);
        let unconfigured: ApiError =
            VisageError::Transcription(TranscriptionError::NotConfigured).into();
        assert_eq!(unconfigured.status, StatusCode::INTERNAL_SERVER_ERROR);
        let nested: ApiError = VisageError::Transcription(TranscriptionError::InvalidInput(
            InputError::AudioTooSmall { size: 10, min: 1000 },
        ))
        .into();
        assert_eq!(nested.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(router(make_shared_gateway()), req).await;
        assert_eq!(status, 200);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["services"]["llm"], false);
        assert_eq!(json["supportedLanguages"].as_array().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_root_aliases_health() {
        let req = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(router(make_shared_gateway()), req).await;
        assert_eq!(status, 200);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_voices_unconfigured() {
        let req = axum::http::Request::builder()
            .uri("/voices")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(router(make_shared_gateway()), req).await;
        assert_eq!(status, 400);
        assert!(json["error"].as_str().unwrap().contains("not configured"));
    }
}

//! # HTTP Gateway
//!
//! JSON transport for the pipeline: `POST /tts` (text in), `POST /sts`
//! (recorded speech in), plus health, language and voice listings.

mod server;

pub use server::{
    ApiError, GatewayServer, SharedGateway, router as gateway_router, run as run_gateway,
};

use serde::{Deserialize, Serialize};

use crate::config::TranscriptionConfig;

/// Room for the JSON envelope and a data-URL prefix around encoded audio.
const ENVELOPE_HEADROOM: usize = 1024 * 1024;

/// Smallest body that still carries `max_audio_bytes` of base64 audio.
pub fn body_limit_for_audio(max_audio_bytes: usize) -> usize {
    max_audio_bytes.div_ceil(3) * 4 + ENVELOPE_HEADROOM
}

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Origin allowed by CORS; `*` allows any.
    pub cors_origin: String,
    /// Largest accepted request body. Audio uploads arrive base64-encoded.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origin: "http://localhost:5173".to_string(),
            max_body_bytes: body_limit_for_audio(TranscriptionConfig::default().max_audio_bytes),
        }
    }
}

//! Server Types
//!
//! Request/response bodies and the HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::error::TtsError;

/// JSON body of `POST /synthesize_base64`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeBase64Request {
    /// Text to synthesize
    pub text: String,

    /// Fast (batched) inference
    #[serde(default = "default_true")]
    pub use_fast_mode: bool,

    /// Base64-encoded reference audio
    #[serde(default)]
    pub reference_audio_base64: Option<String>,
}

/// Query string of `POST /synthesize_base64`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Base64Query {
    /// Base64-encoded reference audio, when not in the body
    #[serde(default)]
    pub reference_audio_base64: Option<String>,
}

/// Response of `POST /synthesize_base64`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base64AudioResponse {
    pub status: String,
    pub audio_base64: String,
}

impl Base64AudioResponse {
    pub fn success(audio_base64: String) -> Self {
        Self {
            status: "success".to_string(),
            audio_base64,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" or "error"
    pub status: String,

    /// Human-readable state
    pub message: String,

    /// Version
    pub version: String,

    /// Loaded model name
    #[serde(default)]
    pub model: Option<String>,

    /// Whether the vocoder uses the fused activation kernel
    pub fused_kernel: bool,

    /// Uptime (seconds)
    pub uptime: u64,
}

/// Server statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_processing_time_ms: f64,
    pub inferences: u64,
    pub cache_hits: u64,
    pub cache_entries: usize,
    pub model_loaded: bool,
    pub uptime: u64,
}

/// Error body, shaped like `{"detail": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// HTTP-facing error
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::Validation { message, .. } => ApiError::bad_request(message),
            TtsError::ModelNotLoaded => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Model not loaded")
            }
            other @ (TtsError::Inference { .. } | TtsError::Audio { .. }) => {
                ApiError::internal(format!("Speech generation failed: {}", other))
            }
            other => ApiError::internal(format!("Server error: {}", other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status.as_u16(), self.message);
        }
        let body = Json(ErrorResponse {
            detail: self.message,
        });
        (self.status, body).into_response()
    }
}

fn default_true() -> bool {
    true
}

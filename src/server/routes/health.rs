//! Health Check Routes

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::server::server_core::ServerState;
use crate::server::types::HealthResponse;

/// Health check endpoint: 200 once the model is loaded, 503 before
pub async fn health_check(
    State(state): State<Arc<ServerState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let model = state.model().await;

    let (status, body_status, message) = match &model {
        Some(_) => (StatusCode::OK, "ok", "Service is running normally"),
        None => (StatusCode::SERVICE_UNAVAILABLE, "error", "Model not loaded"),
    };

    let response = HealthResponse {
        status: body_status.to_string(),
        message: message.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: model.as_ref().map(|m| m.name().to_string()),
        fused_kernel: model.as_ref().map(|m| m.fused_kernel()).unwrap_or(false),
        uptime: state.uptime().as_secs(),
    };

    (status, Json(response))
}

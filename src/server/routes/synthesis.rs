//! Synthesis Routes

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, Multipart, Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::engine::{InferenceMode, TtsModel};
use crate::server::cache::OutputCache;
use crate::server::server_core::ServerState;
use crate::server::types::{ApiError, Base64AudioResponse, Base64Query, SynthesizeBase64Request};
use crate::server::upload::{
    decode_base64_audio, parse_form_bool, validate_extension, validate_text,
};

/// Suffix for base64 uploads, which carry no file name
const BASE64_REFERENCE_SUFFIX: &str = ".wav";

/// `POST /synthesize`: multipart upload, WAV attachment back
pub async fn synthesize(
    State(state): State<Arc<ServerState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?;

    let mut text: Option<String> = None;
    let mut use_fast_mode = true;
    let mut reference: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "reference_audio" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read reference_audio: {}", e))
                })?;
                reference = Some((filename, data));
            }
            "text" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read text: {}", e)))?;
                text = Some(value);
            }
            "use_fast_mode" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read use_fast_mode: {}", e))
                })?;
                use_fast_mode = parse_form_bool("use_fast_mode", &value)?;
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let text = text.ok_or_else(|| ApiError::bad_request("Field 'text' is required"))?;
    validate_text(&text, state.config.limits.max_text_length)?;

    let model = state.require_model().await?;

    let (filename, data) =
        reference.ok_or_else(|| ApiError::bad_request("Field 'reference_audio' is required"))?;
    let suffix = validate_extension(&filename, &state.config.limits.allowed_extensions)?;
    if data.is_empty() {
        return Err(ApiError::bad_request("Uploaded reference audio is empty"));
    }

    let mode = InferenceMode::from_fast_flag(use_fast_mode);
    let (output, audio) = synthesize_audio(state, model, text, mode, data, suffix).await?;

    let filename = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output.wav")
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        audio,
    )
        .into_response())
}

/// `POST /synthesize_base64`: base64 in, base64 out
pub async fn synthesize_base64(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<Base64Query>,
    body: Result<Json<SynthesizeBase64Request>, JsonRejection>,
) -> Result<Json<Base64AudioResponse>, ApiError> {
    let Json(request) =
        body.map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?;

    let model = state.require_model().await?;

    validate_text(&request.text, state.config.limits.max_text_length)?;

    let encoded = request
        .reference_audio_base64
        .or(query.reference_audio_base64)
        .ok_or_else(|| ApiError::bad_request("Field 'reference_audio_base64' is required"))?;
    let data = decode_base64_audio(&encoded)?;

    let mode = InferenceMode::from_fast_flag(request.use_fast_mode);
    let (_, audio) = synthesize_audio(
        state,
        model,
        request.text,
        mode,
        Bytes::from(data),
        BASE64_REFERENCE_SUFFIX.to_string(),
    )
    .await?;

    Ok(Json(Base64AudioResponse::success(
        base64::engine::general_purpose::STANDARD.encode(audio),
    )))
}

/// Cached output for the request, or a fresh inference.
///
/// A fresh inference runs in its own task: if the client goes away the
/// model still finishes, the output is cached and the staged reference is
/// removed.
async fn synthesize_audio(
    state: Arc<ServerState>,
    model: Arc<dyn TtsModel>,
    text: String,
    mode: InferenceMode,
    reference: Bytes,
    suffix: String,
) -> Result<(PathBuf, Vec<u8>), ApiError> {
    let key = OutputCache::cache_key(&text, mode, &reference);
    if let Some(hit) = state.cached_audio(&key).await {
        return Ok(hit);
    }

    let task = tokio::spawn(async move {
        state
            .synthesize_uncached(key, model, mode, &text, &reference, &suffix)
            .await
    });
    let result = task
        .await
        .map_err(|e| ApiError::internal(format!("Synthesis task failed: {}", e)))?;
    Ok(result?)
}

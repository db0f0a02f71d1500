//! HTTP request handlers for the web server.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use super::AppState;
use crate::acquire::prepare_image_bytes;
use crate::providers::OcrProvider;

/// Request body for `POST /api/ensemble`.
#[derive(Debug, Deserialize)]
pub struct EnsembleRequest {
    /// Page image (or PDF), base64 or a `data:` URL.
    pub image_base64: String,
    /// JSON schema for the extraction step.
    #[serde(default)]
    pub schema: Value,
}

/// Health check endpoint for container orchestration.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Providers filling each pipeline slot.
pub async fn api_providers(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    Json(serde_json::json!({
        "primary": describe(orchestrator.primary().as_ref()),
        "secondary": describe(orchestrator.secondary().as_ref()),
        "adjudicator": describe(orchestrator.adjudicator().as_ref()),
        "fallback": orchestrator.fallback_name(),
    }))
}

fn describe(provider: &dyn OcrProvider) -> Value {
    serde_json::json!({
        "name": provider.name(),
        "metadata": provider.metadata(),
    })
}

/// Run the ensemble on an uploaded page.
///
/// Bad input is a 400; pipeline failures come back inside the report.
pub async fn api_ensemble(
    State(state): State<AppState>,
    Json(request): Json<EnsembleRequest>,
) -> impl IntoResponse {
    let bytes = match decode_image(&request.image_base64) {
        Ok(bytes) => bytes,
        Err(e) => return bad_request(format!("Invalid base64 image: {}", e)),
    };

    let page = match tokio::task::spawn_blocking(move || prepare_image_bytes(bytes)).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => return bad_request(e.to_string()),
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    };

    let schema = if request.schema.is_null() {
        serde_json::json!({ "type": "object", "properties": {} })
    } else {
        request.schema
    };

    let report = state.orchestrator.process(&page.bytes, &schema).await;
    Json(report).into_response()
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD.decode(payload.trim())
}

fn bad_request(message: String) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

use axum::{Json, body::Bytes, extract::State, http::HeaderMap, response::IntoResponse};
use serde_json::json;

use crate::AppState;
use crate::error::AppError;

/// Payment gateway webhook. The body is taken as raw bytes so signature
/// verification runs over exactly what was sent, not a re-serialized object.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get("X-Callback-Signature")
        .and_then(|h| h.to_str().ok());
    let event = headers
        .get("X-Callback-Event")
        .and_then(|h| h.to_str().ok());

    let outcome = state
        .coordinator
        .resolve_callback(&body, signature, event)
        .await?;

    tracing::debug!(?outcome, "callback processed");
    Ok(Json(json!({ "success": true })))
}

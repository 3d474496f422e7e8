use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;

/// Enabled payment channels for the checkout page.
pub async fn list_channels(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let methods = state.methods.list_enabled().await?;
    Ok(Json(methods))
}

/// Reconciles the cached channel set against the gateway's live list.
pub async fn sync_channels(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.channel_sync.sync().await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub is_enabled: bool,
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> Result<impl IntoResponse, AppError> {
    let method = state.methods.set_enabled(&code, request.is_enabled).await?;
    Ok(Json(method))
}

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::handlers::AuthedUser;
use crate::services::coordinator::TopupRequest;

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub quantity: i64,
}

pub async fn quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<impl IntoResponse, AppError> {
    let breakdown = state.coordinator.quote(params.quantity)?;
    Ok(Json(breakdown))
}

pub async fn initiate(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Json(request): Json<TopupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = state.coordinator.initiate(user_id, request).await?;
    Ok(Json(payload))
}

pub async fn history(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
) -> Result<impl IntoResponse, AppError> {
    let views = state.coordinator.history(user_id).await?;
    Ok(Json(views))
}

pub async fn poll(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(merchant_ref): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.coordinator.poll(user_id, &merchant_ref).await?;
    Ok(Json(view))
}

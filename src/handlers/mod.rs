pub mod admin;
pub mod callback;
pub mod topup;

use axum::{
    Json,
    async_trait,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
};
use serde_json::json;

use crate::AppState;
use crate::error::AppError;

/// Authenticated user identity, supplied by the session layer in front of
/// this service via the `X-User-Id` header.
pub struct AuthedUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .map(AuthedUser)
            .ok_or_else(|| AppError::Unauthorized("missing user identity".to_string()))
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // Check database connectivity with SELECT 1 query
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let status_code = if db_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if db_status == "connected" { "healthy" } else { "unhealthy" },
            "db": db_status,
        })),
    )
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::client::GatewayError;
use crate::store::{LedgerError, StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the transaction: {0}")]
    GatewayRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient quota for user {user_id}: balance {balance}, requested {requested}")]
    InsufficientQuota {
        user_id: i64,
        balance: i64,
        requested: i64,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature => StatusCode::BAD_REQUEST,
            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientQuota { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Duplicate(what) => AppError::BadRequest(format!("duplicate {what}")),
            StoreError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Insufficient {
                user_id,
                balance,
                requested,
            } => AppError::InsufficientQuota {
                user_id,
                balance,
                requested,
            },
            LedgerError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(msg) => AppError::GatewayRejected(msg),
            other => AppError::GatewayUnavailable(other.to_string()),
        }
    }
}

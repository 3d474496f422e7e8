pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod pricing;
pub mod services;
pub mod store;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;

use crate::services::channel_sync::ChannelSyncService;
use crate::services::coordinator::ReconciliationCoordinator;
use crate::store::MethodStore;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub coordinator: Arc<ReconciliationCoordinator>,
    pub channel_sync: Arc<ChannelSyncService>,
    pub methods: Arc<dyn MethodStore>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/topup/quote", get(handlers::topup::quote))
        .route(
            "/topup",
            post(handlers::topup::initiate).get(handlers::topup::history),
        )
        .route("/topup/:merchant_ref", get(handlers::topup::poll))
        .route("/payment/callback", post(handlers::callback::callback))
        .route("/payment/channels", get(handlers::admin::list_channels))
        .route(
            "/admin/payment-channels/sync",
            post(handlers::admin::sync_channels),
        )
        .route(
            "/admin/payment-channels/:code",
            put(handlers::admin::set_enabled),
        )
        .with_state(state)
}

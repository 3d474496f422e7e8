use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;

use topup_core::config::Config;
use topup_core::gateway::{GatewayClient, GatewayConfig};
use topup_core::services::channel_sync::ChannelSyncService;
use topup_core::services::coordinator::ReconciliationCoordinator;
use topup_core::services::notifier::LogNotifier;
use topup_core::store::postgres::{PostgresMethodStore, PostgresQuotaLedger, PostgresTopupStore};
use topup_core::{AppState, create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let gateway = GatewayClient::new(GatewayConfig {
        base_url: config.gateway_base_url.clone(),
        api_key: config.gateway_api_key.clone(),
        merchant_code: config.gateway_merchant_code.clone(),
        private_key: config.gateway_private_key.clone(),
    });
    tracing::info!(
        base_url = %config.gateway_base_url,
        merchant_code = %config.gateway_merchant_code,
        "payment gateway client initialized"
    );

    let store = Arc::new(PostgresTopupStore::new(pool.clone()));
    let ledger = Arc::new(PostgresQuotaLedger::new(pool.clone()));
    let methods = Arc::new(PostgresMethodStore::new(pool.clone()));

    let coordinator = Arc::new(ReconciliationCoordinator::new(
        store,
        ledger,
        gateway.clone(),
        Arc::new(LogNotifier),
        config.quota_unit_price,
        config.return_url.clone(),
        config.topup_expiry_secs,
    ));
    let channel_sync = Arc::new(ChannelSyncService::new(gateway, methods.clone()));

    // Safety-net scan for PAID transactions whose credit never landed.
    let repair_coordinator = coordinator.clone();
    let repair_interval = Duration::from_secs(config.repair_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(repair_interval);
        loop {
            interval.tick().await;
            match repair_coordinator.repair_missing_credits().await {
                Ok(report) if report.examined > 0 => {
                    tracing::warn!(
                        examined = report.examined,
                        repaired = report.repaired,
                        "credit repair scan applied fixes"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "credit repair scan failed"),
            }
        }
    });

    let app_state = AppState {
        db: pool,
        coordinator,
        channel_sync,
        methods,
    };
    let app = create_app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

//! Reconciles the locally cached payment methods against the gateway's
//! live channel list.

use serde::Serialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::gateway::GatewayClient;
use crate::store::{MethodStore, MethodUpsert};

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub total_fetched: usize,
    pub updated_count: usize,
    pub inserted_count: usize,
}

pub struct ChannelSyncService {
    gateway: GatewayClient,
    methods: Arc<dyn MethodStore>,
}

impl ChannelSyncService {
    pub fn new(gateway: GatewayClient, methods: Arc<dyn MethodStore>) -> Self {
        Self { gateway, methods }
    }

    /// Upserts every channel the gateway currently reports. Updates leave
    /// the local `is_enabled` override untouched; channels missing from the
    /// response are kept, since the gateway may paginate or temporarily
    /// omit entries.
    pub async fn sync(&self) -> Result<SyncReport, AppError> {
        let channels = self.gateway.list_payment_channels().await;
        let total_fetched = channels.len();
        let mut updated_count = 0;
        let mut inserted_count = 0;

        for channel in &channels {
            match self.methods.upsert_from_gateway(channel).await {
                Ok(MethodUpsert::Updated) => updated_count += 1,
                Ok(MethodUpsert::Inserted) => inserted_count += 1,
                Err(e) => {
                    tracing::error!(code = %channel.code, error = %e, "failed to upsert payment channel");
                }
            }
        }

        tracing::info!(
            total_fetched,
            updated_count,
            inserted_count,
            "payment channel sync finished"
        );

        Ok(SyncReport {
            total_fetched,
            updated_count,
            inserted_count,
        })
    }
}

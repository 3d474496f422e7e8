//! HTTP client for the external payment gateway.

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{Config, Error as FailsafeError, StateMachine, backoff, failure_policy};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::gateway::signature;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned HTTP {0}")]
    Status(u16),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
}

/// Transaction-creation request before signing. The client computes the
/// signature from its own credentials.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub method: String,
    pub merchant_ref: String,
    pub amount: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub order_items: Vec<OrderItem>,
    pub return_url: String,
    pub expired_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub price: i64,
    pub quantity: i64,
}

#[derive(Serialize)]
struct CreateTransactionBody {
    method: String,
    merchant_ref: String,
    amount: i64,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    order_items: Vec<OrderItem>,
    return_url: String,
    expired_time: i64,
    signature: String,
}

/// Remote transaction state as reported by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayTransaction {
    pub reference: String,
    pub status: String,
    pub checkout_url: Option<String>,
    pub qr_url: Option<String>,
    pub pay_code: Option<String>,
    pub expired_time: Option<i64>,
}

/// A payment channel descriptor from the gateway's live list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub fee_flat: i64,
    #[serde(default)]
    pub fee_percent: f64,
    pub minimum_fee: Option<i64>,
    pub maximum_fee: Option<i64>,
    pub icon_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Explicit gateway configuration, passed in at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub merchant_code: String,
    pub private_key: String,
}

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    config: GatewayConfig,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(60));
        let policy = failure_policy::consecutive_failures(5, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        GatewayClient {
            client,
            config,
            circuit_breaker,
        }
    }

    pub fn merchant_code(&self) -> &str {
        &self.config.merchant_code
    }

    /// Verifies an inbound callback signature against the raw body bytes.
    pub fn verify_callback(&self, raw_body: &[u8], signature_hex: &str) -> bool {
        signature::verify_callback(raw_body, signature_hex, &self.config.private_key)
    }

    /// Creates a transaction at the gateway. Transport errors, 5xx responses
    /// and an open circuit surface as unavailability; a `success: false`
    /// body is a rejection.
    pub async fn create_transaction(
        &self,
        draft: &TransactionDraft,
    ) -> Result<GatewayTransaction, GatewayError> {
        let body = CreateTransactionBody {
            method: draft.method.clone(),
            merchant_ref: draft.merchant_ref.clone(),
            amount: draft.amount,
            customer_name: draft.customer_name.clone(),
            customer_email: draft.customer_email.clone(),
            customer_phone: draft.customer_phone.clone(),
            order_items: draft.order_items.clone(),
            return_url: draft.return_url.clone(),
            expired_time: draft.expired_time,
            signature: signature::sign_transaction(
                &self.config.merchant_code,
                &draft.merchant_ref,
                draft.amount,
                &self.config.private_key,
            ),
        };

        let url = format!(
            "{}/transaction/create",
            self.config.base_url.trim_end_matches('/')
        );
        let client = self.client.clone();
        let api_key = self.config.api_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&body)
                    .send()
                    .await?;

                if response.status().is_server_error() {
                    return Err(GatewayError::Status(response.status().as_u16()));
                }

                Ok(response)
            })
            .await;

        let response = Self::unwrap_circuit(result)?;
        Self::parse_envelope(response).await
    }

    /// Looks up the current state of a transaction by gateway reference.
    /// Used by the client-driven poll path.
    pub async fn transaction_detail(
        &self,
        gateway_ref: &str,
    ) -> Result<GatewayTransaction, GatewayError> {
        let url = format!(
            "{}/transaction/detail",
            self.config.base_url.trim_end_matches('/')
        );
        let client = self.client.clone();
        let api_key = self.config.api_key.clone();
        let reference = gateway_ref.to_string();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .get(&url)
                    .bearer_auth(&api_key)
                    .query(&[("reference", reference.as_str())])
                    .send()
                    .await?;

                if response.status().is_server_error() {
                    return Err(GatewayError::Status(response.status().as_u16()));
                }

                Ok(response)
            })
            .await;

        let response = Self::unwrap_circuit(result)?;
        Self::parse_envelope(response).await
    }

    /// Fetches the gateway's live payment channel list. Best effort: any
    /// failure logs a warning and yields an empty list, since this feeds a
    /// cache refresh rather than a payment.
    pub async fn list_payment_channels(&self) -> Vec<ChannelDescriptor> {
        let url = format!(
            "{}/merchant/payment-channel",
            self.config.base_url.trim_end_matches('/')
        );

        let response = match self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "payment channel list fetch failed");
                return Vec::new();
            }
        };

        match Self::parse_envelope::<Vec<ChannelDescriptor>>(response).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!(error = %e, "payment channel list response invalid");
                Vec::new()
            }
        }
    }

    fn unwrap_circuit<T>(
        result: Result<T, FailsafeError<GatewayError>>,
    ) -> Result<T, GatewayError> {
        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    async fn parse_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if !envelope.success {
            return Err(GatewayError::Rejected(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data field".to_string()))
    }
}

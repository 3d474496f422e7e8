//! Storage seams for the reconciliation core.
//!
//! The conditional update inside `transition_to_terminal` is the
//! serialization point for the whole payment flow: of any number of callers
//! racing to resolve one merchant_ref, exactly one observes `Applied` and is
//! allowed to proceed to crediting. `claim_credit` gates the ledger write
//! the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::{PaymentMethod, TopupTransaction};
use crate::domain::TopupStatus;
use crate::gateway::client::ChannelDescriptor;

pub mod memory;
pub mod postgres;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Duplicate(db_err.message().to_string());
            }
        }
        StoreError::Backend(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("insufficient quota for user {user_id}: balance {balance}, requested {requested}")]
    Insufficient {
        user_id: i64,
        balance: i64,
        requested: i64,
    },

    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Draft of a topup transaction, created in status PENDING.
#[derive(Debug, Clone)]
pub struct NewTopup {
    pub merchant_ref: String,
    pub user_id: i64,
    pub unit_price: i64,
    pub quantity: i64,
    pub subtotal: i64,
    pub discount_percent: i32,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub payment_method: String,
    pub expires_at: i64,
}

/// Checkout data assigned by the gateway once it accepts a transaction.
#[derive(Debug, Clone)]
pub struct GatewayInfo {
    pub gateway_ref: String,
    pub checkout_url: String,
    pub qr_url: Option<String>,
    pub pay_code: Option<String>,
    pub expires_at: i64,
}

/// Outcome of a conditional terminal transition.
#[derive(Debug)]
pub enum TerminalTransition {
    /// This caller won the conditional update and owns any follow-up work.
    Applied(TopupTransaction),
    /// The record was already terminal; idempotent no-op.
    AlreadyTerminal(TopupTransaction),
}

#[async_trait]
pub trait TopupStore: Send + Sync {
    async fn create(&self, draft: NewTopup) -> Result<TopupTransaction, StoreError>;

    /// Stores the gateway checkout data and moves the record to UNPAID.
    async fn attach_gateway_info(
        &self,
        merchant_ref: &str,
        info: GatewayInfo,
    ) -> Result<TopupTransaction, StoreError>;

    /// Conditionally moves a record to a terminal state. The status column
    /// changes only if the current status is PENDING or UNPAID, evaluated
    /// atomically by the backend; a record already terminal yields
    /// `AlreadyTerminal`.
    async fn transition_to_terminal(
        &self,
        merchant_ref: &str,
        target: TopupStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<TerminalTransition, StoreError>;

    /// Conditionally marks a PAID record as credited. Returns true for
    /// exactly one caller per record.
    async fn claim_credit(&self, merchant_ref: &str) -> Result<bool, StoreError>;

    /// Releases a credit claim after a failed ledger write so the repair
    /// scan can pick the record up again.
    async fn unclaim_credit(&self, merchant_ref: &str) -> Result<(), StoreError>;

    async fn find_by_merchant_ref(
        &self,
        merchant_ref: &str,
    ) -> Result<Option<TopupTransaction>, StoreError>;

    async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<TopupTransaction>, StoreError>;

    /// All transactions of one user, newest first.
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<TopupTransaction>, StoreError>;

    /// Safety-net scan: PAID transactions whose quota credit was never
    /// recorded.
    async fn find_paid_uncredited(&self) -> Result<Vec<TopupTransaction>, StoreError>;
}

#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Adds `amount` to the user's balance, returning the new balance.
    async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, LedgerError>;

    /// Removes `amount` from the user's balance, rejecting the call if the
    /// balance would go negative. Returns the new balance.
    async fn debit(&self, user_id: i64, amount: i64) -> Result<i64, LedgerError>;

    async fn balance(&self, user_id: i64) -> Result<i64, LedgerError>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum MethodUpsert {
    Inserted,
    Updated,
}

#[async_trait]
pub trait MethodStore: Send + Sync {
    async fn list(&self) -> Result<Vec<PaymentMethod>, StoreError>;

    async fn list_enabled(&self) -> Result<Vec<PaymentMethod>, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<PaymentMethod>, StoreError>;

    /// Inserts or updates a channel from the gateway's live list. Updates
    /// overwrite every gateway-owned field but never `is_enabled`; inserts
    /// default `is_enabled` to true.
    async fn upsert_from_gateway(
        &self,
        channel: &ChannelDescriptor,
    ) -> Result<MethodUpsert, StoreError>;

    /// The one locally owned field.
    async fn set_enabled(&self, code: &str, enabled: bool) -> Result<PaymentMethod, StoreError>;
}

//! In-process implementations of the storage seams.
//!
//! Used by the integration tests and for local development without a
//! database. The mutex around each map gives the same conditional-update
//! semantics the Postgres statements provide, within a single process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::db::models::{PaymentMethod, TopupTransaction};
use crate::domain::TopupStatus;
use crate::gateway::client::ChannelDescriptor;
use crate::store::{
    GatewayInfo, LedgerError, MethodStore, MethodUpsert, NewTopup, QuotaLedger, StoreError,
    TerminalTransition, TopupStore,
};

#[derive(Default)]
pub struct MemoryTopupStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rows: HashMap<String, TopupTransaction>,
    next_id: i64,
}

impl MemoryTopupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopupStore for MemoryTopupStore {
    async fn create(&self, draft: NewTopup) -> Result<TopupTransaction, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.rows.contains_key(&draft.merchant_ref) {
            return Err(StoreError::Duplicate(draft.merchant_ref));
        }

        inner.next_id += 1;
        let now = Utc::now();
        let row = TopupTransaction {
            id: inner.next_id,
            merchant_ref: draft.merchant_ref.clone(),
            gateway_ref: None,
            user_id: draft.user_id,
            unit_price: draft.unit_price,
            quantity: draft.quantity,
            subtotal: draft.subtotal,
            discount_percent: draft.discount_percent,
            discount_amount: draft.discount_amount,
            final_amount: draft.final_amount,
            payment_method: draft.payment_method,
            checkout_url: None,
            qr_url: None,
            pay_code: None,
            status: TopupStatus::Pending.as_str().to_string(),
            expires_at: draft.expires_at,
            paid_at: None,
            credited_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(draft.merchant_ref, row.clone());
        Ok(row)
    }

    async fn attach_gateway_info(
        &self,
        merchant_ref: &str,
        info: GatewayInfo,
    ) -> Result<TopupTransaction, StoreError> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .rows
            .get_mut(merchant_ref)
            .filter(|r| r.status == TopupStatus::Pending.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("pending transaction {merchant_ref}")))?;

        row.gateway_ref = Some(info.gateway_ref);
        row.checkout_url = Some(info.checkout_url);
        row.qr_url = info.qr_url;
        row.pay_code = info.pay_code;
        row.expires_at = info.expires_at;
        row.status = TopupStatus::Unpaid.as_str().to_string();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn transition_to_terminal(
        &self,
        merchant_ref: &str,
        target: TopupStatus,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<TerminalTransition, StoreError> {
        if !target.is_terminal() {
            return Err(StoreError::Backend(format!(
                "{target} is not a terminal status"
            )));
        }

        let mut inner = self.inner.lock().await;
        let row = inner
            .rows
            .get_mut(merchant_ref)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {merchant_ref}")))?;

        if row.status().is_terminal() {
            return Ok(TerminalTransition::AlreadyTerminal(row.clone()));
        }

        row.status = target.as_str().to_string();
        if paid_at.is_some() {
            row.paid_at = paid_at;
        }
        row.updated_at = Utc::now();
        Ok(TerminalTransition::Applied(row.clone()))
    }

    async fn claim_credit(&self, merchant_ref: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.rows.get_mut(merchant_ref) else {
            return Ok(false);
        };
        if row.status() != TopupStatus::Paid || row.credited_at.is_some() {
            return Ok(false);
        }
        row.credited_at = Some(Utc::now());
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn unclaim_credit(&self, merchant_ref: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.rows.get_mut(merchant_ref) {
            row.credited_at = None;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_by_merchant_ref(
        &self,
        merchant_ref: &str,
    ) -> Result<Option<TopupTransaction>, StoreError> {
        Ok(self.inner.lock().await.rows.get(merchant_ref).cloned())
    }

    async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<TopupTransaction>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .rows
            .values()
            .find(|r| r.gateway_ref.as_deref() == Some(gateway_ref))
            .cloned())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<TopupTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .rows
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn find_paid_uncredited(&self) -> Result<Vec<TopupTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rows
            .values()
            .filter(|r| r.status() == TopupStatus::Paid && r.credited_at.is_none())
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryQuotaLedger {
    balances: Mutex<HashMap<i64, i64>>,
}

impl MemoryQuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaLedger for MemoryQuotaLedger {
    async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, LedgerError> {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(user_id).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    async fn debit(&self, user_id: i64, amount: i64) -> Result<i64, LedgerError> {
        let mut balances = self.balances.lock().await;
        let balance = balances.entry(user_id).or_insert(0);
        if *balance < amount {
            return Err(LedgerError::Insufficient {
                user_id,
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    async fn balance(&self, user_id: i64) -> Result<i64, LedgerError> {
        Ok(*self.balances.lock().await.get(&user_id).unwrap_or(&0))
    }
}

#[derive(Default)]
pub struct MemoryMethodStore {
    methods: Mutex<HashMap<String, PaymentMethod>>,
}

impl MemoryMethodStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MethodStore for MemoryMethodStore {
    async fn list(&self) -> Result<Vec<PaymentMethod>, StoreError> {
        let methods = self.methods.lock().await;
        let mut rows: Vec<_> = methods.values().cloned().collect();
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(rows)
    }

    async fn list_enabled(&self) -> Result<Vec<PaymentMethod>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|m| m.is_enabled)
            .collect())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<PaymentMethod>, StoreError> {
        Ok(self.methods.lock().await.get(code).cloned())
    }

    async fn upsert_from_gateway(
        &self,
        channel: &ChannelDescriptor,
    ) -> Result<MethodUpsert, StoreError> {
        let mut methods = self.methods.lock().await;
        let now = Utc::now();
        match methods.get_mut(&channel.code) {
            Some(existing) => {
                existing.name = channel.name.clone();
                existing.method_type = channel.group.clone();
                existing.fee_flat = channel.fee_flat;
                existing.fee_percent = channel.fee_percent;
                existing.minimum_fee = channel.minimum_fee;
                existing.maximum_fee = channel.maximum_fee;
                existing.icon_url = channel.icon_url.clone();
                existing.updated_at = now;
                Ok(MethodUpsert::Updated)
            }
            None => {
                methods.insert(
                    channel.code.clone(),
                    PaymentMethod {
                        code: channel.code.clone(),
                        name: channel.name.clone(),
                        method_type: channel.group.clone(),
                        fee_flat: channel.fee_flat,
                        fee_percent: channel.fee_percent,
                        minimum_fee: channel.minimum_fee,
                        maximum_fee: channel.maximum_fee,
                        icon_url: channel.icon_url.clone(),
                        is_enabled: true,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(MethodUpsert::Inserted)
            }
        }
    }

    async fn set_enabled(&self, code: &str, enabled: bool) -> Result<PaymentMethod, StoreError> {
        let mut methods = self.methods.lock().await;
        let method = methods
            .get_mut(code)
            .ok_or_else(|| StoreError::NotFound(format!("payment method {code}")))?;
        method.is_enabled = enabled;
        method.updated_at = Utc::now();
        Ok(method.clone())
    }
}

//! Postgres implementations of the storage seams.
//!
//! The terminal transition and the credit claim are single conditional
//! UPDATE statements; the row guard in the WHERE clause is what makes them
//! safe across processes, not any in-process lock. Ledger mutations carry
//! the balance guard in the same statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::models::{PaymentMethod, TopupTransaction};
use crate::domain::TopupStatus;
use crate::gateway::client::ChannelDescriptor;
use crate::store::{
    GatewayInfo, LedgerError, MethodStore, MethodUpsert, NewTopup, QuotaLedger, StoreError,
    TerminalTransition, TopupStore,
};

#[derive(Clone)]
pub struct PostgresTopupStore {
    pool: PgPool,
}

impl PostgresTopupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TopupStore for PostgresTopupStore {
    async fn create(&self, draft: NewTopup) -> Result<TopupTransaction, StoreError> {
        let row = sqlx::query_as::<_, TopupTransaction>(
            r#"
            INSERT INTO topup_transactions (
                merchant_ref, user_id, unit_price, quantity, subtotal,
                discount_percent, discount_amount, final_amount,
                payment_method, status, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&draft.merchant_ref)
        .bind(draft.user_id)
        .bind(draft.unit_price)
        .bind(draft.quantity)
        .bind(draft.subtotal)
        .bind(draft.discount_percent)
        .bind(draft.discount_amount)
        .bind(draft.final_amount)
        .bind(&draft.payment_method)
        .bind(TopupStatus::Pending.as_str())
        .bind(draft.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn attach_gateway_info(
        &self,
        merchant_ref: &str,
        info: GatewayInfo,
    ) -> Result<TopupTransaction, StoreError> {
        let row = sqlx::query_as::<_, TopupTransaction>(
            r#"
            UPDATE topup_transactions
            SET gateway_ref = $2, checkout_url = $3, qr_url = $4, pay_code = $5,
                expires_at = $6, status = $7, updated_at = now()
            WHERE merchant_ref = $1 AND status = $8
            RETURNING *
            "#,
        )
        .bind(merchant_ref)
        .bind(&info.gateway_ref)
        .bind(&info.checkout_url)
        .bind(&info.qr_url)
        .bind(&info.pay_code)
        .bind(info.expires_at)
        .bind(TopupStatus::Unpaid.as_str())
        .bind(TopupStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("pending transaction {merchant_ref}")))
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

        let updated = sqlx::query_as::<_, TopupTransaction>(
            r#"
            UPDATE topup_transactions
            SET status = $2, paid_at = COALESCE($3, paid_at), updated_at = now()
            WHERE merchant_ref = $1 AND status IN ($4, $5)
            RETURNING *
            "#,
        )
        .bind(merchant_ref)
        .bind(target.as_str())
        .bind(paid_at)
        .bind(TopupStatus::Pending.as_str())
        .bind(TopupStatus::Unpaid.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(TerminalTransition::Applied(row));
        }

        // Lost the conditional update: either already terminal or unknown.
        match self.find_by_merchant_ref(merchant_ref).await? {
            Some(row) => Ok(TerminalTransition::AlreadyTerminal(row)),
            None => Err(StoreError::NotFound(format!("transaction {merchant_ref}"))),
        }
    }

    async fn claim_credit(&self, merchant_ref: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE topup_transactions
            SET credited_at = now(), updated_at = now()
            WHERE merchant_ref = $1 AND status = $2 AND credited_at IS NULL
            "#,
        )
        .bind(merchant_ref)
        .bind(TopupStatus::Paid.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn unclaim_credit(&self, merchant_ref: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE topup_transactions SET credited_at = NULL, updated_at = now() WHERE merchant_ref = $1",
        )
        .bind(merchant_ref)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    async fn find_by_merchant_ref(
        &self,
        merchant_ref: &str,
    ) -> Result<Option<TopupTransaction>, StoreError> {
        let row = sqlx::query_as::<_, TopupTransaction>(
            "SELECT * FROM topup_transactions WHERE merchant_ref = $1",
        )
        .bind(merchant_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_gateway_ref(
        &self,
        gateway_ref: &str,
    ) -> Result<Option<TopupTransaction>, StoreError> {
        let row = sqlx::query_as::<_, TopupTransaction>(
            "SELECT * FROM topup_transactions WHERE gateway_ref = $1",
        )
        .bind(gateway_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<TopupTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TopupTransaction>(
            "SELECT * FROM topup_transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_paid_uncredited(&self) -> Result<Vec<TopupTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TopupTransaction>(
            "SELECT * FROM topup_transactions WHERE status = $1 AND credited_at IS NULL",
        )
        .bind(TopupStatus::Paid.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[derive(Clone)]
pub struct PostgresQuotaLedger {
    pool: PgPool,
}

impl PostgresQuotaLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaLedger for PostgresQuotaLedger {
    async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, LedgerError> {
        let (balance,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO quota_balances (user_id, balance) VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET balance = quota_balances.balance + EXCLUDED.balance,
                          updated_at = now()
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(balance)
    }

    async fn debit(&self, user_id: i64, amount: i64) -> Result<i64, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE quota_balances
            SET balance = balance - $2, updated_at = now()
            WHERE user_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Backend(e.to_string()))?;

        match row {
            Some((balance,)) => Ok(balance),
            None => {
                let balance = self.balance(user_id).await?;
                Err(LedgerError::Insufficient {
                    user_id,
                    balance,
                    requested: amount,
                })
            }
        }
    }

    async fn balance(&self, user_id: i64) -> Result<i64, LedgerError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM quota_balances WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Backend(e.to_string()))?;

        Ok(row.map(|(b,)| b).unwrap_or(0))
    }
}

#[derive(Clone)]
pub struct PostgresMethodStore {
    pool: PgPool,
}

impl PostgresMethodStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MethodStore for PostgresMethodStore {
    async fn list(&self) -> Result<Vec<PaymentMethod>, StoreError> {
        let rows =
            sqlx::query_as::<_, PaymentMethod>("SELECT * FROM payment_methods ORDER BY code")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    async fn list_enabled(&self) -> Result<Vec<PaymentMethod>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentMethod>(
            "SELECT * FROM payment_methods WHERE is_enabled ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<PaymentMethod>, StoreError> {
        let row = sqlx::query_as::<_, PaymentMethod>("SELECT * FROM payment_methods WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn upsert_from_gateway(
        &self,
        channel: &ChannelDescriptor,
    ) -> Result<MethodUpsert, StoreError> {
        // Update first so an existing row keeps its is_enabled override.
        let updated = sqlx::query(
            r#"
            UPDATE payment_methods
            SET name = $2, method_type = $3, fee_flat = $4, fee_percent = $5,
                minimum_fee = $6, maximum_fee = $7, icon_url = $8, updated_at = now()
            WHERE code = $1
            "#,
        )
        .bind(&channel.code)
        .bind(&channel.name)
        .bind(&channel.group)
        .bind(channel.fee_flat)
        .bind(channel.fee_percent)
        .bind(channel.minimum_fee)
        .bind(channel.maximum_fee)
        .bind(&channel.icon_url)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if updated.rows_affected() == 1 {
            return Ok(MethodUpsert::Updated);
        }

        // Concurrent syncs may both reach the insert; the conflict clause
        // keeps the second one from failing.
        sqlx::query(
            r#"
            INSERT INTO payment_methods (
                code, name, method_type, fee_flat, fee_percent,
                minimum_fee, maximum_fee, icon_url, is_enabled
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name, method_type = EXCLUDED.method_type,
                fee_flat = EXCLUDED.fee_flat, fee_percent = EXCLUDED.fee_percent,
                minimum_fee = EXCLUDED.minimum_fee, maximum_fee = EXCLUDED.maximum_fee,
                icon_url = EXCLUDED.icon_url, updated_at = now()
            "#,
        )
        .bind(&channel.code)
        .bind(&channel.name)
        .bind(&channel.group)
        .bind(channel.fee_flat)
        .bind(channel.fee_percent)
        .bind(channel.minimum_fee)
        .bind(channel.maximum_fee)
        .bind(&channel.icon_url)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(MethodUpsert::Inserted)
    }

    async fn set_enabled(&self, code: &str, enabled: bool) -> Result<PaymentMethod, StoreError> {
        let row = sqlx::query_as::<_, PaymentMethod>(
            "UPDATE payment_methods SET is_enabled = $2, updated_at = now() WHERE code = $1 RETURNING *",
        )
        .bind(code)
        .bind(enabled)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(format!("payment method {code}")))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::TopupStatus;

/// A quota topup transaction. Append-only: rows are created PENDING, move to
/// UNPAID once the gateway accepts them, and end in exactly one terminal
/// state. They are never deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TopupTransaction {
    pub id: i64,
    pub merchant_ref: String,
    pub gateway_ref: Option<String>,
    pub user_id: i64,
    pub unit_price: i64,
    pub quantity: i64,
    pub subtotal: i64,
    pub discount_percent: i32,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub payment_method: String,
    pub checkout_url: Option<String>,
    pub qr_url: Option<String>,
    pub pay_code: Option<String>,
    pub status: String,
    /// Epoch seconds after which an UNPAID transaction counts as expired.
    pub expires_at: i64,
    pub paid_at: Option<DateTime<Utc>>,
    /// Set once the quota credit for a PAID transaction has been claimed.
    pub credited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TopupTransaction {
    pub fn status(&self) -> TopupStatus {
        TopupStatus::from_str(&self.status).unwrap_or(TopupStatus::Pending)
    }

    /// Status as seen by readers: an UNPAID record past its expiry reads as
    /// EXPIRED even before the explicit transition is persisted.
    pub fn effective_status(&self, now: DateTime<Utc>) -> TopupStatus {
        let status = self.status();
        if status == TopupStatus::Unpaid && self.expires_at < now.timestamp() {
            TopupStatus::Expired
        } else {
            status
        }
    }
}

/// A payment channel cached from the gateway. All fields except `is_enabled`
/// are owned by the gateway and overwritten on sync; `is_enabled` is the
/// local operator override.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub code: String,
    pub name: String,
    pub method_type: String,
    pub fee_flat: i64,
    pub fee_percent: f64,
    pub minimum_fee: Option<i64>,
    pub maximum_fee: Option<i64>,
    pub icon_url: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unpaid_tx(expires_at: i64) -> TopupTransaction {
        let now = Utc::now();
        TopupTransaction {
            id: 1,
            merchant_ref: "INV1700000000abcdef_U1_Q5".to_string(),
            gateway_ref: Some("T12345".to_string()),
            user_id: 1,
            unit_price: 5000,
            quantity: 5,
            subtotal: 25000,
            discount_percent: 12,
            discount_amount: 3000,
            final_amount: 22000,
            payment_method: "QRIS".to_string(),
            checkout_url: Some("https://pay.example/checkout/T12345".to_string()),
            qr_url: None,
            pay_code: None,
            status: "UNPAID".to_string(),
            expires_at,
            paid_at: None,
            credited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_effective_status_applies_lazy_expiry() {
        let now = Utc::now();
        let expired = unpaid_tx((now - Duration::hours(1)).timestamp());
        assert_eq!(expired.status(), TopupStatus::Unpaid);
        assert_eq!(expired.effective_status(now), TopupStatus::Expired);
    }

    #[test]
    fn test_effective_status_keeps_live_unpaid() {
        let now = Utc::now();
        let live = unpaid_tx((now + Duration::hours(1)).timestamp());
        assert_eq!(live.effective_status(now), TopupStatus::Unpaid);
    }

    #[test]
    fn test_effective_status_never_revives_terminal() {
        let now = Utc::now();
        let mut tx = unpaid_tx((now - Duration::hours(1)).timestamp());
        tx.status = "PAID".to_string();
        assert_eq!(tx.effective_status(now), TopupStatus::Paid);
    }
}

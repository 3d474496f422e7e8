//! Outbound user notification seam.
//!
//! Fire and forget: crediting never rolls back because a notification
//! failed, so implementations must not return errors.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn topup_credited(
        &self,
        user_id: i64,
        merchant_ref: &str,
        quantity: i64,
        new_balance: i64,
    );
}

/// Logs the notification. Stands in for the mail/messaging collaborator.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn topup_credited(
        &self,
        user_id: i64,
        merchant_ref: &str,
        quantity: i64,
        new_balance: i64,
    ) {
        tracing::info!(
            user_id,
            merchant_ref,
            quantity,
            new_balance,
            "topup credited, user notified"
        );
    }
}

//! Reconciliation coordinator: the payment state machine.
//!
//! A topup moves PENDING -> UNPAID -> one of {PAID, EXPIRED, FAILED}. The
//! webhook callback and the client-driven poll both resolve transactions
//! through the single `resolve` primitive below, so however many callers
//! race on one merchant_ref, the store's conditional update picks exactly
//! one winner and only that winner credits the quota ledger.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::models::TopupTransaction;
use crate::domain::{TopupStatus, merchant_ref};
use crate::error::AppError;
use crate::gateway::GatewayClient;
use crate::gateway::client::{OrderItem, TransactionDraft};
use crate::pricing::{self, PricingBreakdown};
use crate::services::notifier::Notifier;
use crate::store::{GatewayInfo, NewTopup, QuotaLedger, TerminalTransition, TopupStore};

#[derive(Debug, Clone, Deserialize)]
pub struct TopupRequest {
    pub quantity: i64,
    pub method: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
}

/// What the frontend needs to send the customer to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPayload {
    pub merchant_ref: String,
    pub gateway_ref: Option<String>,
    pub checkout_url: Option<String>,
    pub qr_url: Option<String>,
    pub pay_code: Option<String>,
    pub amount: i64,
    pub expires_at: i64,
    pub status: TopupStatus,
}

/// Read view of a transaction with lazy expiry applied.
#[derive(Debug, Clone, Serialize)]
pub struct TopupView {
    pub merchant_ref: String,
    pub gateway_ref: Option<String>,
    pub status: TopupStatus,
    pub quantity: i64,
    pub unit_price: i64,
    pub subtotal: i64,
    pub discount_percent: i32,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub payment_method: String,
    pub checkout_url: Option<String>,
    pub qr_url: Option<String>,
    pub pay_code: Option<String>,
    pub expires_at: i64,
    pub paid_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    #[serde(default)]
    reference: String,
    #[serde(default)]
    merchant_ref: String,
    status: String,
    #[serde(default)]
    is_closed_payment: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// This call performed the terminal transition.
    Applied(TopupStatus),
    /// Replay of an already-terminal transaction; acknowledged, no work.
    AlreadyTerminal,
    /// Payload acknowledged but not authoritative (open payment or a
    /// non-terminal status).
    Ignored,
}

#[derive(Debug, Serialize)]
pub struct RepairReport {
    pub examined: usize,
    pub repaired: usize,
}

pub struct ReconciliationCoordinator {
    store: Arc<dyn TopupStore>,
    ledger: Arc<dyn QuotaLedger>,
    gateway: GatewayClient,
    notifier: Arc<dyn Notifier>,
    unit_price: i64,
    return_url: String,
    expiry_secs: i64,
}

impl ReconciliationCoordinator {
    pub fn new(
        store: Arc<dyn TopupStore>,
        ledger: Arc<dyn QuotaLedger>,
        gateway: GatewayClient,
        notifier: Arc<dyn Notifier>,
        unit_price: i64,
        return_url: String,
        expiry_secs: i64,
    ) -> Self {
        Self {
            store,
            ledger,
            gateway,
            notifier,
            unit_price,
            return_url,
            expiry_secs,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn QuotaLedger> {
        &self.ledger
    }

    /// Pricing breakdown for a prospective topup.
    pub fn quote(&self, quantity: i64) -> Result<PricingBreakdown, AppError> {
        pricing::calculate(quantity, self.unit_price)
    }

    /// Creates a local PENDING record, registers the transaction with the
    /// gateway and returns the checkout payload. A gateway failure marks
    /// the record FAILED and surfaces the error; the caller may re-initiate,
    /// which produces a fresh merchant_ref.
    pub async fn initiate(
        &self,
        user_id: i64,
        request: TopupRequest,
    ) -> Result<CheckoutPayload, AppError> {
        if request.method.trim().is_empty() {
            return Err(AppError::BadRequest("payment method is required".to_string()));
        }

        let quote = pricing::calculate(request.quantity, self.unit_price)?;
        let merchant_ref = merchant_ref::generate(user_id, request.quantity);
        let expires_at = Utc::now().timestamp() + self.expiry_secs;

        self.store
            .create(NewTopup {
                merchant_ref: merchant_ref.clone(),
                user_id,
                unit_price: quote.unit_price,
                quantity: quote.quantity,
                subtotal: quote.subtotal,
                discount_percent: quote.discount_percent,
                discount_amount: quote.discount_amount,
                final_amount: quote.final_amount,
                payment_method: request.method.clone(),
                expires_at,
            })
            .await?;

        let draft = TransactionDraft {
            method: request.method,
            merchant_ref: merchant_ref.clone(),
            amount: quote.final_amount,
            customer_name: request.customer_name,
            customer_email: request.customer_email,
            customer_phone: request.customer_phone,
            order_items: vec![OrderItem {
                sku: "INSTALL_QUOTA".to_string(),
                name: format!("Install quota x{}", quote.quantity),
                price: quote.unit_price,
                quantity: quote.quantity,
            }],
            return_url: self.return_url.clone(),
            expired_time: expires_at,
        };

        match self.gateway.create_transaction(&draft).await {
            Ok(remote) => {
                let info = GatewayInfo {
                    gateway_ref: remote.reference,
                    checkout_url: remote.checkout_url.unwrap_or_default(),
                    qr_url: remote.qr_url,
                    pay_code: remote.pay_code,
                    expires_at: remote.expired_time.unwrap_or(expires_at),
                };
                let tx = self.store.attach_gateway_info(&merchant_ref, info).await?;

                tracing::info!(
                    %merchant_ref,
                    user_id,
                    amount = tx.final_amount,
                    "topup transaction registered with gateway"
                );

                Ok(CheckoutPayload {
                    merchant_ref: tx.merchant_ref,
                    gateway_ref: tx.gateway_ref,
                    checkout_url: tx.checkout_url,
                    qr_url: tx.qr_url,
                    pay_code: tx.pay_code,
                    amount: tx.final_amount,
                    expires_at: tx.expires_at,
                    status: TopupStatus::Unpaid,
                })
            }
            Err(e) => {
                tracing::warn!(%merchant_ref, user_id, error = %e, "gateway transaction creation failed");
                // Never leave the record PENDING indefinitely.
                if let Err(store_err) = self
                    .store
                    .transition_to_terminal(&merchant_ref, TopupStatus::Failed, None)
                    .await
                {
                    tracing::error!(%merchant_ref, error = %store_err, "failed to mark transaction FAILED");
                }
                Err(e.into())
            }
        }
    }

    /// Resolves a transaction from a signed gateway callback. Signature
    /// verification runs over the raw body bytes before anything else; a
    /// failure rejects the request with no state change.
    pub async fn resolve_callback(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        event: Option<&str>,
    ) -> Result<CallbackOutcome, AppError> {
        let signature = signature.ok_or(AppError::InvalidSignature)?;
        if !self.gateway.verify_callback(raw_body, signature) {
            tracing::warn!("callback rejected: signature mismatch");
            return Err(AppError::InvalidSignature);
        }

        if event != Some("payment_status") {
            return Err(AppError::BadRequest(format!(
                "unsupported callback event {:?}",
                event.unwrap_or("<missing>")
            )));
        }

        let payload: CallbackPayload = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::BadRequest(format!("malformed callback body: {e}")))?;

        // Open payments let the customer adjust the amount at the gateway;
        // only closed payments are authoritative for crediting.
        if payload.is_closed_payment != 1 {
            tracing::info!(
                merchant_ref = %payload.merchant_ref,
                "ignoring open-payment callback"
            );
            return Ok(CallbackOutcome::Ignored);
        }

        let record = match self.store.find_by_merchant_ref(&payload.merchant_ref).await? {
            Some(record) => record,
            None => match self.store.find_by_gateway_ref(&payload.reference).await? {
                Some(record) => record,
                None => {
                    // Either wire format carries the user and quantity; log
                    // them so an orphaned callback can be traced to a user.
                    if let Some((user_id, quantity)) = merchant_ref::parse(&payload.merchant_ref) {
                        tracing::warn!(
                            merchant_ref = %payload.merchant_ref,
                            user_id,
                            quantity,
                            "callback references a transaction we never recorded"
                        );
                    }
                    return Err(AppError::NotFound(format!(
                        "transaction {}",
                        payload.merchant_ref
                    )));
                }
            },
        };

        let target = match TopupStatus::terminal_from_gateway(&payload.status) {
            Some(target) => target,
            None if payload.status.eq_ignore_ascii_case("UNPAID") => {
                return Ok(CallbackOutcome::Ignored);
            }
            None => {
                return Err(AppError::BadRequest(format!(
                    "unrecognized payment status {}",
                    payload.status
                )));
            }
        };

        self.resolve(&record, target).await
    }

    /// Current status of one transaction, resolving it if the gateway
    /// already knows the outcome. Gateway unavailability during a poll
    /// degrades to reporting the local status.
    pub async fn poll(&self, user_id: i64, merchant_ref: &str) -> Result<TopupView, AppError> {
        let record = self
            .store
            .find_by_merchant_ref(merchant_ref)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("transaction {merchant_ref}")))?;

        let now = Utc::now();
        if record.status() == TopupStatus::Unpaid {
            if record.expires_at < now.timestamp() {
                // Lazy expiry observed; persist the explicit transition.
                if let Err(e) = self.resolve(&record, TopupStatus::Expired).await {
                    tracing::warn!(merchant_ref, error = %e, "failed to persist expiry transition");
                }
            } else if let Some(gateway_ref) = record.gateway_ref.as_deref() {
                match self.gateway.transaction_detail(gateway_ref).await {
                    Ok(remote) => {
                        if let Some(target) = TopupStatus::terminal_from_gateway(&remote.status) {
                            self.resolve(&record, target).await?;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(merchant_ref, error = %e, "gateway status lookup failed, reporting local status");
                    }
                }
            }
        }

        let current = self
            .store
            .find_by_merchant_ref(merchant_ref)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {merchant_ref}")))?;
        Ok(Self::view(&current))
    }

    /// Topup history for a user, newest first, with lazy expiry applied.
    pub async fn history(&self, user_id: i64) -> Result<Vec<TopupView>, AppError> {
        let rows = self.store.list_by_user(user_id).await?;
        let now = Utc::now();

        for row in &rows {
            if row.status() == TopupStatus::Unpaid && row.expires_at < now.timestamp() {
                if let Err(e) = self.resolve(row, TopupStatus::Expired).await {
                    tracing::warn!(merchant_ref = %row.merchant_ref, error = %e, "failed to persist expiry transition");
                }
            }
        }

        Ok(rows.iter().map(Self::view).collect())
    }

    /// Safety net: finds PAID transactions whose quota credit never landed
    /// and applies it. Run periodically.
    pub async fn repair_missing_credits(&self) -> Result<RepairReport, AppError> {
        let candidates = self.store.find_paid_uncredited().await?;
        let examined = candidates.len();
        let mut repaired = 0;

        for tx in candidates {
            tracing::warn!(
                merchant_ref = %tx.merchant_ref,
                user_id = tx.user_id,
                amount = tx.final_amount,
                "ledger credit mismatch: PAID transaction without recorded credit"
            );
            if self.credit_once(&tx).await {
                repaired += 1;
            }
        }

        Ok(RepairReport { examined, repaired })
    }

    /// The single resolution primitive both delivery paths funnel through.
    /// The store's conditional update decides the winner; only the winner
    /// of a PAID transition proceeds to crediting.
    async fn resolve(
        &self,
        record: &TopupTransaction,
        target: TopupStatus,
    ) -> Result<CallbackOutcome, AppError> {
        let paid_at = (target == TopupStatus::Paid).then(Utc::now);
        match self
            .store
            .transition_to_terminal(&record.merchant_ref, target, paid_at)
            .await?
        {
            TerminalTransition::Applied(tx) => {
                tracing::info!(
                    merchant_ref = %tx.merchant_ref,
                    user_id = tx.user_id,
                    status = %target,
                    "transaction resolved"
                );
                if target == TopupStatus::Paid {
                    self.credit_once(&tx).await;
                }
                Ok(CallbackOutcome::Applied(target))
            }
            TerminalTransition::AlreadyTerminal(_) => Ok(CallbackOutcome::AlreadyTerminal),
        }
    }

    /// Credits the ledger at most once per transaction. The claim on
    /// `credited_at` is the gate; a ledger failure releases the claim so the
    /// repair scan retries, and is logged with enough detail to find.
    async fn credit_once(&self, tx: &TopupTransaction) -> bool {
        match self.store.claim_credit(&tx.merchant_ref).await {
            Ok(true) => match self.ledger.credit(tx.user_id, tx.quantity).await {
                Ok(new_balance) => {
                    tracing::info!(
                        merchant_ref = %tx.merchant_ref,
                        user_id = tx.user_id,
                        quantity = tx.quantity,
                        new_balance,
                        "quota credited"
                    );
                    self.notifier
                        .topup_credited(tx.user_id, &tx.merchant_ref, tx.quantity, new_balance)
                        .await;
                    true
                }
                Err(e) => {
                    tracing::error!(
                        merchant_ref = %tx.merchant_ref,
                        user_id = tx.user_id,
                        quantity = tx.quantity,
                        amount = tx.final_amount,
                        error = %e,
                        "ledger credit failed after PAID transition, releasing claim for repair scan"
                    );
                    if let Err(unclaim_err) = self.store.unclaim_credit(&tx.merchant_ref).await {
                        tracing::error!(
                            merchant_ref = %tx.merchant_ref,
                            error = %unclaim_err,
                            "failed to release credit claim, operator attention required"
                        );
                    }
                    false
                }
            },
            Ok(false) => false, // credited by another caller or the repair scan
            Err(e) => {
                tracing::error!(
                    merchant_ref = %tx.merchant_ref,
                    user_id = tx.user_id,
                    error = %e,
                    "credit claim failed, repair scan will retry"
                );
                false
            }
        }
    }

    fn view(tx: &TopupTransaction) -> TopupView {
        TopupView {
            merchant_ref: tx.merchant_ref.clone(),
            gateway_ref: tx.gateway_ref.clone(),
            status: tx.effective_status(Utc::now()),
            quantity: tx.quantity,
            unit_price: tx.unit_price,
            subtotal: tx.subtotal,
            discount_percent: tx.discount_percent,
            discount_amount: tx.discount_amount,
            final_amount: tx.final_amount,
            payment_method: tx.payment_method.clone(),
            checkout_url: tx.checkout_url.clone(),
            qr_url: tx.qr_url.clone(),
            pay_code: tx.pay_code.clone(),
            expires_at: tx.expires_at,
            paid_at: tx.paid_at,
            created_at: tx.created_at,
        }
    }
}

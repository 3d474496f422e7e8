//! Conditional-update semantics of the store seams.

use chrono::Utc;
use std::sync::Arc;

use topup_core::domain::TopupStatus;
use topup_core::store::memory::{MemoryQuotaLedger, MemoryTopupStore};
use topup_core::store::{
    GatewayInfo, LedgerError, NewTopup, QuotaLedger, TerminalTransition, TopupStore,
};

fn draft(merchant_ref: &str, user_id: i64) -> NewTopup {
    NewTopup {
        merchant_ref: merchant_ref.to_string(),
        user_id,
        unit_price: 5000,
        quantity: 5,
        subtotal: 25000,
        discount_percent: 12,
        discount_amount: 3000,
        final_amount: 22000,
        payment_method: "QRIS".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
    }
}

async fn unpaid(store: &MemoryTopupStore, merchant_ref: &str, user_id: i64) {
    store.create(draft(merchant_ref, user_id)).await.unwrap();
    store
        .attach_gateway_info(
            merchant_ref,
            GatewayInfo {
                gateway_ref: format!("T-{merchant_ref}"),
                checkout_url: "https://pay.example/x".to_string(),
                qr_url: None,
                pay_code: None,
                expires_at: Utc::now().timestamp() + 3600,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_duplicate_merchant_ref_rejected() {
    let store = MemoryTopupStore::new();
    store.create(draft("INV1_U1_Q5", 1)).await.unwrap();
    assert!(store.create(draft("INV1_U1_Q5", 1)).await.is_err());
}

#[tokio::test]
async fn test_attach_moves_pending_to_unpaid() {
    let store = MemoryTopupStore::new();
    unpaid(&store, "INV1_U1_Q5", 1).await;

    let row = store
        .find_by_merchant_ref("INV1_U1_Q5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status(), TopupStatus::Unpaid);
    assert_eq!(row.gateway_ref.as_deref(), Some("T-INV1_U1_Q5"));

    let by_gateway = store
        .find_by_gateway_ref("T-INV1_U1_Q5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_gateway.merchant_ref, "INV1_U1_Q5");
}

#[tokio::test]
async fn test_terminal_transition_is_idempotent() {
    let store = MemoryTopupStore::new();
    unpaid(&store, "INV1_U1_Q5", 1).await;

    let first = store
        .transition_to_terminal("INV1_U1_Q5", TopupStatus::Paid, Some(Utc::now()))
        .await
        .unwrap();
    assert!(matches!(first, TerminalTransition::Applied(_)));

    let second = store
        .transition_to_terminal("INV1_U1_Q5", TopupStatus::Paid, Some(Utc::now()))
        .await
        .unwrap();
    assert!(matches!(second, TerminalTransition::AlreadyTerminal(_)));

    // A terminal record cannot be moved to a different terminal state either.
    let third = store
        .transition_to_terminal("INV1_U1_Q5", TopupStatus::Expired, None)
        .await
        .unwrap();
    assert!(matches!(third, TerminalTransition::AlreadyTerminal(_)));
}

#[tokio::test]
async fn test_non_terminal_target_rejected() {
    let store = MemoryTopupStore::new();
    unpaid(&store, "INV1_U1_Q5", 1).await;

    assert!(
        store
            .transition_to_terminal("INV1_U1_Q5", TopupStatus::Unpaid, None)
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transitions_have_one_winner() {
    let store = Arc::new(MemoryTopupStore::new());
    unpaid(&store, "INV1_U1_Q5", 1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .transition_to_terminal("INV1_U1_Q5", TopupStatus::Paid, Some(Utc::now()))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), TerminalTransition::Applied(_)) {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_claim_credit_succeeds_once() {
    let store = MemoryTopupStore::new();
    unpaid(&store, "INV1_U1_Q5", 1).await;

    // No claim before the record is PAID.
    assert!(!store.claim_credit("INV1_U1_Q5").await.unwrap());

    store
        .transition_to_terminal("INV1_U1_Q5", TopupStatus::Paid, Some(Utc::now()))
        .await
        .unwrap();

    assert!(store.claim_credit("INV1_U1_Q5").await.unwrap());
    assert!(!store.claim_credit("INV1_U1_Q5").await.unwrap());

    // Releasing the claim makes the record claimable again.
    store.unclaim_credit("INV1_U1_Q5").await.unwrap();
    assert!(store.claim_credit("INV1_U1_Q5").await.unwrap());
}

#[tokio::test]
async fn test_paid_uncredited_scan() {
    let store = MemoryTopupStore::new();
    unpaid(&store, "INV1_U1_Q5", 1).await;
    unpaid(&store, "INV2_U2_Q5", 2).await;

    store
        .transition_to_terminal("INV1_U1_Q5", TopupStatus::Paid, Some(Utc::now()))
        .await
        .unwrap();
    store
        .transition_to_terminal("INV2_U2_Q5", TopupStatus::Expired, None)
        .await
        .unwrap();

    let uncredited = store.find_paid_uncredited().await.unwrap();
    assert_eq!(uncredited.len(), 1);
    assert_eq!(uncredited[0].merchant_ref, "INV1_U1_Q5");

    store.claim_credit("INV1_U1_Q5").await.unwrap();
    assert!(store.find_paid_uncredited().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_credit_and_debit() {
    let ledger = MemoryQuotaLedger::new();

    assert_eq!(ledger.balance(1).await.unwrap(), 0);
    assert_eq!(ledger.credit(1, 5).await.unwrap(), 5);
    assert_eq!(ledger.debit(1, 1).await.unwrap(), 4);

    let err = ledger.debit(1, 10).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Insufficient {
            user_id: 1,
            balance: 4,
            requested: 10
        }
    ));
    // Balance untouched by the rejected debit.
    assert_eq!(ledger.balance(1).await.unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ledger_updates_are_atomic_per_user() {
    let ledger = Arc::new(MemoryQuotaLedger::new());

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move { ledger.credit(1, 1).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.balance(1).await.unwrap(), 20);
}

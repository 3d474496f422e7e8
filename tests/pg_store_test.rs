//! Postgres store tests. Ignored by default; they need DATABASE_URL pointing
//! at a disposable database.
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use std::path::Path;
use std::sync::Arc;

use topup_core::domain::TopupStatus;
use topup_core::store::postgres::{PostgresQuotaLedger, PostgresTopupStore};
use topup_core::store::{
    GatewayInfo, NewTopup, QuotaLedger, TerminalTransition, TopupStore,
};

async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");
    let migrator = Migrator::new(Path::new("./migrations"))
        .await
        .expect("Failed to load migrations");
    migrator
        .run(&pool)
        .await
        .expect("Failed to run migrations on test DB");
    pool
}

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

#[tokio::test]
#[ignore]
async fn test_pg_lifecycle_and_idempotent_transition() {
    let pool = setup_test_db().await;
    let store = PostgresTopupStore::new(pool);

    let merchant_ref = format!("INV{}pg1_U1_Q5", Utc::now().timestamp_micros());
    store.create(draft(&merchant_ref, 1)).await.unwrap();
    store
        .attach_gateway_info(
            &merchant_ref,
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

    let first = store
        .transition_to_terminal(&merchant_ref, TopupStatus::Paid, Some(Utc::now()))
        .await
        .unwrap();
    assert!(matches!(first, TerminalTransition::Applied(_)));

    let second = store
        .transition_to_terminal(&merchant_ref, TopupStatus::Paid, Some(Utc::now()))
        .await
        .unwrap();
    assert!(matches!(second, TerminalTransition::AlreadyTerminal(_)));

    assert!(store.claim_credit(&merchant_ref).await.unwrap());
    assert!(!store.claim_credit(&merchant_ref).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_pg_concurrent_transitions_have_one_winner() {
    let pool = setup_test_db().await;
    let store = Arc::new(PostgresTopupStore::new(pool));

    let merchant_ref = format!("INV{}pg2_U1_Q5", Utc::now().timestamp_micros());
    store.create(draft(&merchant_ref, 1)).await.unwrap();
    store
        .attach_gateway_info(
            &merchant_ref,
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

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let merchant_ref = merchant_ref.clone();
        handles.push(tokio::spawn(async move {
            store
                .transition_to_terminal(&merchant_ref, TopupStatus::Paid, Some(Utc::now()))
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
#[ignore]
async fn test_pg_ledger_guard_rejects_overdraft() {
    let pool = setup_test_db().await;
    let ledger = PostgresQuotaLedger::new(pool);

    let user_id = Utc::now().timestamp_micros(); // fresh user per run
    assert_eq!(ledger.credit(user_id, 5).await.unwrap(), 5);
    assert_eq!(ledger.debit(user_id, 2).await.unwrap(), 3);
    assert!(ledger.debit(user_id, 10).await.is_err());
    assert_eq!(ledger.balance(user_id).await.unwrap(), 3);
}

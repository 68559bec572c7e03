//! PostgreSQL store contract tests.
//!
//! Run with `DATABASE_URL` pointing at a scratch database:
//! `cargo test --test postgres_store -- --ignored`

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use merchant_payment_server::{
    db,
    models::{
        merchant::Merchant,
        partner::Partner,
        session::{
            CustomerInfo, EntryPoint, PaymentMethod, PaymentSession, SessionOutcome, SessionStatus,
        },
        transaction::{Transaction, TransactionStatus},
    },
    store::{PgStore, Store, StoreError},
};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    PgStore::new(pool)
}

async fn seed_merchant(store: &PgStore) -> Merchant {
    let merchant = Merchant {
        id: Uuid::new_v4(),
        business_name: "Corner Coffee".into(),
        is_active: true,
        created_at: Utc::now(),
    };
    store.insert_merchant(&merchant).await.unwrap();
    merchant
}

fn transaction(merchant_id: Uuid) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: Uuid::new_v4(),
        reference: Uuid::new_v4().to_string(),
        merchant_id,
        customer_email: "jane@example.com".into(),
        transaction_type: "payment".into(),
        status: TransactionStatus::Pending,
        payment_method: "card".into(),
        gateway: "transvoucher".into(),
        currency: "USD".into(),
        amount_cents: 10_000,
        net_amount_cents: 10_000,
        description: None,
        metadata: json!({}),
        ip_address: None,
        user_agent: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore]
async fn partner_codes_are_unique() {
    let store = store().await;
    let merchant = seed_merchant(&store).await;
    let now = Utc::now();
    let code = format!("pg{}", &Uuid::new_v4().simple().to_string()[..10]);

    let partner = Partner {
        id: Uuid::new_v4(),
        name: "Acme Pay".into(),
        code: code.clone(),
        merchant_id: Some(merchant.id),
        contact_email: None,
        webhook_url: None,
        webhook_secret: "whsec_test".into(),
        is_active: true,
        is_verified: false,
        created_at: now,
        updated_at: now,
    };
    store.insert_partner(&partner).await.unwrap();

    let copy = Partner {
        id: Uuid::new_v4(),
        ..partner
    };
    let err = store.insert_partner(&copy).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate("partner code")), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn transaction_reference_is_unique_and_settles_once() {
    let store = store().await;
    let merchant = seed_merchant(&store).await;
    let tx = transaction(merchant.id);

    store.insert_transaction(&tx).await.unwrap();
    let dup = Transaction {
        id: Uuid::new_v4(),
        ..tx.clone()
    };
    let err = store.insert_transaction(&dup).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate("reference")), "{err:?}");

    let settled = store
        .settle_transaction(&tx.reference, TransactionStatus::Success, Utc::now())
        .await
        .unwrap()
        .expect("pending transaction settles");
    assert_eq!(settled.status, TransactionStatus::Success);

    let again = store
        .settle_transaction(&tx.reference, TransactionStatus::Failed, Utc::now())
        .await
        .unwrap();
    assert!(again.is_none());

    let found = store
        .find_transaction_by_reference(&tx.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.status, TransactionStatus::Success);
}

#[tokio::test]
#[ignore]
async fn dispatch_claim_is_exclusive() {
    let store = store().await;
    let merchant = seed_merchant(&store).await;
    let now = Utc::now();
    let session = PaymentSession {
        session_id: Uuid::new_v4(),
        merchant_id: merchant.id,
        partner_id: None,
        app_key_id: None,
        amount_cents: 2_500,
        currency: "USD".into(),
        customer: CustomerInfo {
            email: "jane@example.com".into(),
            name: "Jane".into(),
            phone: "+15550100".into(),
        },
        description: "Order 7".into(),
        title: String::new(),
        payment_method: PaymentMethod::Card,
        reference_id: format!("PEX-REF-{}", &Uuid::new_v4().simple().to_string()[..8]),
        metadata: json!({}),
        callback_url: None,
        cancel_url: None,
        entry_point: EntryPoint::Api,
        status: SessionStatus::Pending,
        gateway_reference: None,
        payment_url: None,
        failure_reason: None,
        created_at: now,
        expires_at: now + Duration::minutes(5),
        completed_at: None,
        dispatched_at: None,
    };
    store.insert_session(&session).await.unwrap();
    let id = session.session_id;

    let claimed = store.claim_session_dispatch(id, now).await.unwrap();
    assert!(claimed.and_then(|s| s.dispatched_at).is_some());
    assert!(store.claim_session_dispatch(id, now).await.unwrap().is_none());

    store.release_session_dispatch(id).await.unwrap();
    assert!(store.claim_session_dispatch(id, now).await.unwrap().is_some());

    let outcome = SessionOutcome::Failed {
        reason: "declined".into(),
    };
    store.finish_session(id, &outcome, now).await.unwrap().unwrap();
    store.release_session_dispatch(id).await.unwrap();
    assert!(store.claim_session_dispatch(id, now).await.unwrap().is_none());
}

mod common;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use common::{TestApp, error_code};

const MOCK_SIGNATURE: &str = "mock-signature";

async fn transvoucher(app: &TestApp, signature: &str, body: Value) -> (StatusCode, Value) {
    app.send(
        Method::POST,
        "/api/v1/webhooks/transvoucher",
        &[("X-TransVoucher-Signature", signature)],
        Some(body),
    )
    .await
}

async fn uniwire(app: &TestApp, body: Value) -> (StatusCode, Value) {
    app.send(
        Method::POST,
        "/api/v1/webhooks/uniwire",
        &[("X-CC-Webhook-Signature", MOCK_SIGNATURE)],
        Some(body),
    )
    .await
}

fn card_event(event_type: &str, session_id: &str) -> Value {
    json!({
        "event_type": event_type,
        "data": {
            "transaction_id": 98765,
            "reference_id": "PEX-REF-0A1B2C3D",
            "metadata": { "session_id": session_id },
        }
    })
}

async fn session_status(app: &TestApp, session_id: &str) -> Value {
    let (_, session) = app
        .send(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{session_id}"),
            &[],
            None,
        )
        .await;
    session["status"].clone()
}

#[tokio::test]
async fn bad_signature_is_refused_and_changes_nothing() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;
    let (_, created) = app.make_payment(&creds, json!({})).await;
    let session_id = created["session_id"].as_str().unwrap();

    let (status, body) = transvoucher(
        &app,
        "sha256=deadbeef",
        card_event("payment_intent.succeeded", session_id),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "invalid_signature");

    let (status, _) = transvoucher(&app, "", card_event("payment_intent.succeeded", session_id)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(session_status(&app, session_id).await, "pending");
    assert!(app.notifier.events().is_empty());
}

#[tokio::test]
async fn signed_success_settles_a_pending_session_once() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;
    let (_, created) = app.make_payment(&creds, json!({})).await;
    let session_id = created["session_id"].as_str().unwrap();

    let (status, ack) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        card_event("payment_intent.succeeded", session_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{ack}");
    assert_eq!(ack["status"], "processed");
    assert_eq!(session_status(&app, session_id).await, "completed");

    let (_, tx) = app
        .partner(
            Method::GET,
            &format!("/api/v1/transactions/reference/{session_id}"),
            &creds,
            None,
        )
        .await;
    assert_eq!(tx["status"], "success");

    // A replay or a contradicting late event leaves the outcome alone.
    let (_, ack) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        card_event("payment_intent.succeeded", session_id),
    )
    .await;
    assert_eq!(ack["status"], "duplicate");
    let (_, ack) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        card_event("payment_intent.failed", session_id),
    )
    .await;
    assert_eq!(ack["status"], "duplicate");
    assert_eq!(session_status(&app, session_id).await, "completed");

    let events = app.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, "payment.completed");

    let (status, body) = app.process(session_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "already_terminal");
    assert_eq!(app.card.calls(), 0);
}

#[tokio::test]
async fn cancelled_card_payment_fails_the_session() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;
    let (_, created) = app.make_payment(&creds, json!({})).await;
    let session_id = created["session_id"].as_str().unwrap();

    let (_, ack) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        card_event("payment_intent.cancelled", session_id),
    )
    .await;
    assert_eq!(ack["status"], "processed");

    let (_, session) = app
        .send(
            Method::GET,
            &format!("/api/v1/checkout/sessions/{session_id}"),
            &[],
            None,
        )
        .await;
    assert_eq!(session["status"], "failed");
    assert_eq!(session["failure_reason"], "Payment cancelled");
    assert_eq!(app.notifier.events()[0].1, "payment.failed");
}

#[tokio::test]
async fn unrelated_and_unidentified_events() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;
    let (_, created) = app.make_payment(&creds, json!({})).await;
    let session_id = created["session_id"].as_str().unwrap();

    let (status, ack) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        card_event("payment_intent.created", session_id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ignored");
    assert_eq!(session_status(&app, session_id).await, "pending");

    let (status, body) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        json!({ "event_type": "payment_intent.succeeded", "data": {} }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "missing_session");

    let (status, _) = transvoucher(
        &app,
        MOCK_SIGNATURE,
        card_event("payment_intent.succeeded", &uuid::Uuid::new_v4().to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uniwire_invoice_callbacks() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;

    let (_, paid) = app
        .make_payment(&creds, json!({ "payment_method": "crypto" }))
        .await;
    let paid_id = paid["session_id"].as_str().unwrap();
    let (_, lapsed) = app
        .make_payment(&creds, json!({ "payment_method": "crypto" }))
        .await;
    let lapsed_id = lapsed["session_id"].as_str().unwrap();

    let passthrough = |id: &str| json!({ "session_id": id }).to_string();

    let (_, ack) = uniwire(
        &app,
        json!({ "result": { "id": "5f0c-44aa", "status": "pending", "passthrough": passthrough(paid_id) } }),
    )
    .await;
    assert_eq!(ack["status"], "ignored");

    let (_, ack) = uniwire(
        &app,
        json!({ "result": { "id": "5f0c-44aa", "status": "complete", "passthrough": passthrough(paid_id) } }),
    )
    .await;
    assert_eq!(ack["status"], "processed");
    assert_eq!(session_status(&app, paid_id).await, "completed");

    let (_, ack) = uniwire(
        &app,
        json!({ "id": "77b1-0e21", "status": "expired", "passthrough": passthrough(lapsed_id) }),
    )
    .await;
    assert_eq!(ack["status"], "processed");
    assert_eq!(session_status(&app, lapsed_id).await, "failed");

    // A card session cannot be settled through the crypto callback.
    let (_, card) = app.make_payment(&creds, json!({})).await;
    let card_id = card["session_id"].as_str().unwrap();
    let (status, _) = uniwire(
        &app,
        json!({ "id": "77b1-0e21", "status": "complete", "passthrough": passthrough(card_id) }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(session_status(&app, card_id).await, "pending");
}

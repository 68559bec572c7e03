mod common;

use axum::http::{Method, StatusCode};
use chrono::Duration;
use serde_json::json;

use common::{TRUSTED_PROXY, TestApp, error_code, start_time, uuid_field};

#[tokio::test]
async fn read_only_key_cannot_create_payments() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (status, body) = app.make_payment(&creds, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "insufficient_permissions");

    let (status, _) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_key_and_wrong_secret_look_the_same() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;

    let wrong_secret = format!("Bearer {}:sk_test_{}", creds.public_key, "0".repeat(64));
    let unknown_key = format!("Bearer pk_test_{}:{}", "0".repeat(24), creds.secret_key);

    let (status_a, body_a) = app
        .send(Method::GET, "/api/v1/transactions", &[("Authorization", wrong_secret.as_str())], None)
        .await;
    let (status_b, body_b) = app
        .send(Method::GET, "/api/v1/transactions", &[("Authorization", unknown_key.as_str())], None)
        .await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_a, status_b);
    assert_eq!(body_a, body_b);
    assert_eq!(error_code(&body_a), "invalid_api_key");
}

#[tokio::test]
async fn missing_and_malformed_credentials() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Method::GET, "/api/v1/transactions", &[], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "missing_credential");

    let (status, body) = app
        .send(
            Method::GET,
            "/api/v1/transactions",
            &[("Authorization", "Bearer no-colon-here")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "malformed_credential");
}

#[tokio::test]
async fn bearer_header_wins_over_api_key_header() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;
    let raw = format!("{}:{}", creds.public_key, creds.secret_key);
    let bearer = creds.bearer();

    let (status, _) = app
        .send(
            Method::GET,
            "/api/v1/transactions",
            &[("Authorization", bearer.as_str()), ("X-API-Key", "garbage:value")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::GET,
            "/api/v1/transactions",
            &[("Authorization", "Bearer garbage:value"), ("X-API-Key", raw.as_str())],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Other schemes do not shadow X-API-Key.
    let (status, _) = app
        .send(
            Method::GET,
            "/api/v1/transactions",
            &[("Authorization", "Basic dXNlcjpwYXNz"), ("X-API-Key", raw.as_str())],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn structured_credential_must_name_the_owning_partner() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let good = format!("{}/{}:{}", creds.partner_code, creds.public_key, creds.secret_key);
    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/verify", &[("X-API-Key", good.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["partner"]["code"], creds.partner_code.as_str());
    assert_eq!(body["data"]["key"]["key_id"], creds.key_id.to_string());

    let other = format!("someone-else/{}:{}", creds.public_key, creds.secret_key);
    let (status, body) = app
        .send(Method::POST, "/api/v1/auth/verify", &[("X-API-Key", other.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "invalid_api_key");
}

#[tokio::test]
async fn verify_key_endpoint() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/verify-key",
            &[],
            Some(json!({ "public_key": creds.public_key, "secret_key": creds.secret_key })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["partner_name"], "Acme Pay");
    assert_eq!(body["data"]["key_type"], "test");
    assert_eq!(body["data"]["scopes"], json!(["read", "write"]));

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/verify-key",
            &[],
            Some(json!({ "public_key": creds.public_key })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "missing_credential");
}

#[tokio::test]
async fn admin_surface_requires_token() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/admin/partners", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "invalid_admin_token");

    let (status, _) = app
        .send(Method::GET, "/admin/partners", &[("X-Admin-Token", "wrong")], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.admin(Method::GET, "/admin/partners", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn revoke_is_idempotent_and_final() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;
    let uri = format!("/admin/app-keys/{}", creds.key_id);

    let (status, first) = app
        .send(
            Method::DELETE,
            &uri,
            &[("X-Admin-Token", common::ADMIN_TOKEN), ("X-Admin-Actor", "ops@acme")],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["status"], "revoked");
    assert_eq!(first["revoked_by"], "ops@acme");

    app.clock.advance(Duration::minutes(1));
    let (status, second) = app.admin(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["revoked_at"], first["revoked_at"]);
    assert_eq!(second["revoked_by"], "ops@acme");

    let (status, body) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "inactive_api_key");

    let (status, body) = app
        .admin(Method::POST, &format!("{uri}/regenerate-secret"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "key_revoked");

    let (status, body) = app.admin(Method::POST, &format!("{uri}/activate"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "key_revoked");
}

#[tokio::test]
async fn regenerated_secret_replaces_the_old_one() {
    let app = TestApp::new();
    let mut creds = app.onboard(&["read"]).await;

    let (status, body) = app
        .admin(
            Method::POST,
            &format!("/admin/app-keys/{}/regenerate-secret", creds.key_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["public_key"], creds.public_key.as_str());
    let new_secret = body["secret_key"].as_str().unwrap().to_string();
    assert_ne!(new_secret, creds.secret_key);

    let (status, _) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    creds.secret_key = new_secret;
    let (status, _) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn suspended_key_is_refused_until_activated() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;
    let uri = format!("/admin/app-keys/{}", creds.key_id);

    let (_, key) = app.admin(Method::POST, &format!("{uri}/suspend"), None).await;
    assert_eq!(key["status"], "suspended");
    let (status, _) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, key) = app.admin(Method::POST, &format!("{uri}/activate"), None).await;
    assert_eq!(key["status"], "active");
    let (status, _) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn inactive_partner_locks_out_its_keys() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (status, _) = app
        .admin(
            Method::PATCH,
            &format!("/admin/partners/{}", creds.partner_id),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .partner(Method::GET, "/api/v1/transactions", &creds, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "inactive_api_key");
}

#[tokio::test]
async fn expired_key_is_refused() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (_, key) = app
        .admin(
            Method::POST,
            "/admin/app-keys",
            Some(json!({
                "partner_id": creds.partner_id,
                "expires_at": start_time() + Duration::hours(1),
            })),
        )
        .await;
    let raw = format!(
        "Bearer {}:{}",
        key["public_key"].as_str().unwrap(),
        key["secret_key"].as_str().unwrap()
    );

    let (status, _) = app
        .send(Method::GET, "/api/v1/transactions", &[("Authorization", raw.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::OK);

    app.clock.advance(Duration::hours(2));
    let (status, _) = app
        .send(Method::GET, "/api/v1/transactions", &[("Authorization", raw.as_str())], None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, listed) = app
        .admin(Method::GET, &format!("/admin/app-keys/{}", uuid_field(&key, "id")), None)
        .await;
    assert_eq!(listed["status"], "expired");
}

async fn list_from(app: &TestApp, bearer: &str, peer: &str, extra: &[(&str, &str)]) -> StatusCode {
    let mut headers = vec![("Authorization", bearer)];
    headers.extend_from_slice(extra);
    app.send_from(Some(peer), Method::GET, "/api/v1/transactions", &headers, None)
        .await
        .0
}

#[tokio::test]
async fn ip_allowlist_checks_the_real_client() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (status, key) = app
        .admin(
            Method::POST,
            "/admin/app-keys",
            Some(json!({ "partner_id": creds.partner_id, "allowed_ips": ["203.0.113.7"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{key}");
    let raw = format!(
        "Bearer {}:{}",
        key["public_key"].as_str().unwrap(),
        key["secret_key"].as_str().unwrap()
    );

    // Behind the load balancer.
    assert_eq!(
        list_from(&app, &raw, TRUSTED_PROXY, &[("X-Forwarded-For", "203.0.113.7")]).await,
        StatusCode::OK
    );
    assert_eq!(
        list_from(&app, &raw, TRUSTED_PROXY, &[("X-Forwarded-For", "198.51.100.9")]).await,
        StatusCode::UNAUTHORIZED
    );

    // Direct connections.
    assert_eq!(list_from(&app, &raw, "203.0.113.7", &[]).await, StatusCode::OK);
    assert_eq!(
        list_from(&app, &raw, "198.51.100.9", &[("X-Forwarded-For", "203.0.113.7")]).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        list_from(&app, &raw, "198.51.100.9", &[("X-Real-IP", "203.0.113.7")]).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn key_creation_validation() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let cases = [
        (json!({ "scopes": ["read", "delete"] }), "invalid_scopes"),
        (json!({ "scopes": [] }), "invalid_scopes"),
        (json!({ "key_type": "prod" }), "invalid_key_type"),
        (json!({ "expires_at": start_time() - Duration::hours(1) }), "invalid_expiry"),
        (json!({ "allowed_ips": ["not-an-ip"] }), "invalid_ip"),
    ];
    for (mut body, code) in cases {
        body["partner_id"] = json!(creds.partner_id);
        let (status, response) = app.admin(Method::POST, "/admin/app-keys", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{code}");
        assert_eq!(error_code(&response), code);
    }

    let (status, body) = app
        .admin(Method::POST, "/admin/app-keys", Some(json!({ "name": "orphan" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "missing_fields");
}

#[tokio::test]
async fn keys_never_expose_secrets_after_creation() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (_, key) = app
        .admin(Method::GET, &format!("/admin/app-keys/{}", creds.key_id), None)
        .await;
    assert!(key.get("secret_key").is_none());
    assert!(key.get("secret_hash").is_none());

    let (_, keys) = app
        .admin(Method::GET, &format!("/admin/partners/{}/app-keys", creds.partner_id), None)
        .await;
    assert_eq!(keys.as_array().unwrap().len(), 1);
    assert!(keys[0].get("secret_key").is_none());
}

#[tokio::test]
async fn usage_is_recorded_per_call() {
    let app = TestApp::new();
    let creds = app.onboard(&["read", "write"]).await;
    let stats_uri = format!("/admin/app-keys/{}/usage-stats", creds.key_id);

    let (status, stats) = app.admin(Method::GET, &stats_uri, None).await;
    assert_eq!(status, StatusCode::OK, "{stats}");
    assert_eq!(stats["total_calls"], 0);
    assert_eq!(stats["success_rate"], 0.0);
    assert_eq!(stats["by_method"], json!({}));

    let (_, created) = app.make_payment(&creds, json!({})).await;
    app.make_payment(&creds, json!({ "amount": "abc" })).await;
    app.settle_usage().await;

    let (_, stats) = app.admin(Method::GET, &stats_uri, None).await;
    assert_eq!(stats["total_calls"], 2);
    assert_eq!(stats["successful_calls"], 1);
    assert_eq!(stats["error_calls"], 1);
    assert_eq!(stats["success_rate"], 50.0);
    assert_eq!(stats["by_method"]["POST"], 2);

    let (_, logs) = app
        .admin(
            Method::GET,
            &format!("/admin/app-keys/{}/usage-logs?status_code=201", creds.key_id),
            None,
        )
        .await;
    assert_eq!(logs["total"], 1);
    assert_eq!(logs["logs"][0]["endpoint"], "/api/v1/checkout/make-payment");
    assert_eq!(logs["logs"][0]["reference_id"], created["reference_id"]);

    let (_, key) = app
        .admin(Method::GET, &format!("/admin/app-keys/{}", creds.key_id), None)
        .await;
    assert_eq!(key["usage_count"], 2);
}

#[tokio::test]
async fn usage_stats_reject_inverted_range() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (status, body) = app
        .admin(
            Method::GET,
            &format!(
                "/admin/app-keys/{}/usage-stats?start_date=2025-06-02T00:00:00Z&end_date=2025-06-01T00:00:00Z",
                creds.key_id
            ),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_date_range");
}

#[tokio::test]
async fn partner_management() {
    let app = TestApp::new();
    let creds = app.onboard(&["read"]).await;

    let (status, body) = app
        .admin(
            Method::POST,
            "/admin/partners",
            Some(json!({ "name": "Copycat", "code": creds.partner_code })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "duplicate_partner_code");

    let (status, body) = app
        .admin(
            Method::POST,
            "/admin/partners",
            Some(json!({ "name": "Bad", "code": "has space" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_partner_code");

    let (status, body) = app
        .admin(
            Method::POST,
            &format!("/admin/partners/{}/webhook-secret", creds.partner_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let secret = body["secret"].as_str().unwrap();
    assert!(secret.starts_with("whsec_"));
    assert_eq!(secret.len(), "whsec_".len() + 64);

    let (_, partner) = app
        .admin(
            Method::PATCH,
            &format!("/admin/partners/{}", creds.partner_id),
            Some(json!({ "webhook_url": "" })),
        )
        .await;
    assert!(partner["webhook_url"].is_null());
    assert!(partner.get("webhook_secret").is_none());
}

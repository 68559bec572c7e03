#![allow(dead_code)]

use std::{
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode},
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use merchant_payment_server::{
    clock::ManualClock,
    config::{KeyMaterialConfig, SessionPolicy},
    gateways::{MockBehavior, MockCardGateway, MockCryptoGateway},
    models::{partner::Partner, transaction::Transaction, webhook::NotificationResult},
    routes,
    services::webhook_service::Notifier,
    state::{AppState, Dependencies},
    store::MemoryStore,
};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Load balancer address whose forwarding headers the test app believes.
pub const TRUSTED_PROXY: &str = "10.0.0.1";

/// Captures webhook deliveries instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(Uuid, String, String)>>,
}

impl RecordingNotifier {
    /// `(partner_id, event_type, transaction reference)` per delivery.
    pub fn events(&self) -> Vec<(Uuid, String, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        partner: &Partner,
        event_type: &str,
        transaction: &Transaction,
    ) -> NotificationResult {
        self.events.lock().unwrap().push((
            partner.id,
            event_type.to_string(),
            transaction.reference.clone(),
        ));
        NotificationResult::delivered()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub card: Arc<MockCardGateway>,
    pub crypto: Arc<MockCryptoGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

/// A merchant, its partner and one issued key pair.
pub struct Onboarded {
    pub merchant_id: Uuid,
    pub partner_id: Uuid,
    pub partner_code: String,
    pub key_id: Uuid,
    pub public_key: String,
    pub secret_key: String,
}

impl Onboarded {
    pub fn bearer(&self) -> String {
        format!("Bearer {}:{}", self.public_key, self.secret_key)
    }
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_gateways(MockBehavior::Accept, MockBehavior::Accept)
    }

    pub fn with_gateways(card: MockBehavior, crypto: MockBehavior) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let card = Arc::new(MockCardGateway::new(card));
        let crypto = Arc::new(MockCryptoGateway::new(crypto));
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::new(Dependencies {
            store: Arc::new(MemoryStore::new()),
            clock: clock.clone(),
            card_gateway: card.clone(),
            crypto_gateway: crypto.clone(),
            notifier: notifier.clone(),
            key_material: KeyMaterialConfig {
                pepper: b"test-pepper".to_vec(),
                max_provision_attempts: 5,
            },
            session_policy: SessionPolicy {
                dispatch_ttl: Duration::minutes(5),
                checkout_page_ttl: Duration::hours(24),
                supported_currencies: vec!["USD".into(), "EUR".into(), "GBP".into(), "KES".into()],
                public_base_url: "https://pay.example.test".into(),
            },
            gateway_secrets: vec!["gateway-api-secret".into()],
            admin_token: ADMIN_TOKEN.into(),
            trusted_proxies: vec![TRUSTED_PROXY.parse().unwrap()],
        });

        Self {
            router: routes::router(state.clone()),
            state,
            clock,
            card,
            crypto,
            notifier,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_from(None, method, uri, headers, body).await
    }

    /// Like [`TestApp::send`], arriving from socket peer `peer`.
    pub async fn send_from(
        &self,
        peer: Option<&str>,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(peer) = peer {
            let ip: IpAddr = peer.parse().unwrap();
            builder = builder.extension(ConnectInfo(SocketAddr::new(ip, 443)));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, &[("X-Admin-Token", ADMIN_TOKEN)], body).await
    }

    pub async fn partner(
        &self,
        method: Method,
        uri: &str,
        creds: &Onboarded,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let auth = creds.bearer();
        self.send(method, uri, &[("Authorization", auth.as_str())], body)
            .await
    }

    /// Create a merchant, a partner bound to it and a key with `scopes`.
    pub async fn onboard(&self, scopes: &[&str]) -> Onboarded {
        let (status, merchant) = self
            .admin(
                Method::POST,
                "/admin/merchants",
                Some(json!({ "business_name": "Corner Coffee" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{merchant}");
        let merchant_id = uuid_field(&merchant, "id");

        let code = format!("p{}", &Uuid::new_v4().simple().to_string()[..10]);
        let (status, partner) = self
            .admin(
                Method::POST,
                "/admin/partners",
                Some(json!({
                    "name": "Acme Pay",
                    "code": code,
                    "merchant_id": merchant_id,
                    "webhook_url": "https://acme.example.test/hooks",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{partner}");
        let partner_id = uuid_field(&partner, "id");

        let key = self.issue_key(partner_id, scopes).await;

        Onboarded {
            merchant_id,
            partner_id,
            partner_code: code,
            key_id: uuid_field(&key, "id"),
            public_key: key["public_key"].as_str().unwrap().to_string(),
            secret_key: key["secret_key"].as_str().unwrap().to_string(),
        }
    }

    pub async fn issue_key(&self, partner_id: Uuid, scopes: &[&str]) -> Value {
        let (status, key) = self
            .admin(
                Method::POST,
                "/admin/app-keys",
                Some(json!({ "partner_id": partner_id, "scopes": scopes })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{key}");
        key
    }

    /// Create a card session through the partner API.
    pub async fn make_payment(&self, creds: &Onboarded, overrides: Value) -> (StatusCode, Value) {
        let mut body = payment_body();
        if let (Some(base), Value::Object(extra)) = (body.as_object_mut(), overrides) {
            base.extend(extra);
        }
        self.partner(Method::POST, "/api/v1/checkout/make-payment", creds, Some(body))
            .await
    }

    pub async fn process(&self, session_id: &str) -> (StatusCode, Value) {
        self.send(
            Method::GET,
            &format!("/api/v1/checkout/process-payment?session_id={session_id}"),
            &[],
            None,
        )
        .await
    }

    /// Wait for spawned usage recording to land.
    pub async fn settle_usage(&self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

pub fn payment_body() -> Value {
    json!({
        "amount": "100.00",
        "currency": "USD",
        "customer_email": "jane@example.com",
        "customer_name": "Jane Doe",
        "customer_phone": "+15550100",
        "description": "Order #42",
    })
}

pub fn uuid_field(value: &Value, field: &str) -> Uuid {
    value[field]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("missing uuid field {field} in {value}"))
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or("")
}

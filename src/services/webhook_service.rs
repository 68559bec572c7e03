//! Partner webhook signing and delivery.
//!
//! Partners with a `webhook_url` receive a signed POST whenever one of their
//! payments reaches a terminal state. Delivery is best-effort: failures are
//! logged and reported as a [`NotificationResult`], never as a request error.
//!
//! # Headers
//!
//! - `Content-Type: application/json`
//! - `X-Webhook-Signature: sha256=<hex HMAC-SHA256(webhook_secret, raw body)>`
//! - `X-Webhook-Event-Id: <uuid>`

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppError,
    models::{
        partner::Partner,
        transaction::Transaction,
        webhook::{NotificationResult, WebhookData, WebhookPayload},
    },
};

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        partner: &Partner,
        event_type: &str,
        transaction: &Transaction,
    ) -> NotificationResult;
}

/// Delivers webhooks over HTTP with a bounded timeout.
pub struct WebhookNotifier {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, clock })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        partner: &Partner,
        event_type: &str,
        transaction: &Transaction,
    ) -> NotificationResult {
        let Some(url) = partner.webhook_url.as_deref() else {
            return NotificationResult::failed("partner has no webhook url");
        };

        let payload = WebhookPayload {
            event_type: event_type.to_string(),
            event_id: Uuid::new_v4(),
            created_at: self.clock.now(),
            data: WebhookData {
                transaction: transaction.clone().into(),
            },
        };

        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => return NotificationResult::failed(e.to_string()),
        };
        let signature = generate_signature(&partner.webhook_secret, &body);

        let result = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Event-Id", payload.event_id.to_string())
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    partner_id = %partner.id,
                    event_id = %payload.event_id,
                    event_type,
                    "Webhook delivered"
                );
                NotificationResult::delivered()
            }
            Ok(response) => {
                let status = response.status();
                tracing::error!(
                    partner_id = %partner.id,
                    event_id = %payload.event_id,
                    status = status.as_u16(),
                    "Webhook rejected by partner endpoint"
                );
                NotificationResult::failed(format!("HTTP {}", status.as_u16()))
            }
            Err(e) => {
                tracing::error!(
                    partner_id = %partner.id,
                    event_id = %payload.event_id,
                    error = %e,
                    "Webhook delivery failed"
                );
                NotificationResult::failed(e.to_string())
            }
        }
    }
}

/// Generate HMAC-SHA256 signature for a webhook body.
///
/// # Format
///
/// `sha256=<hex_encoded_signature>`
pub fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Validate a webhook or redirect URL.
///
/// HTTPS is required, except plain HTTP to `localhost`, `127.0.0.1` or
/// `0.0.0.0`. URLs are capped at 2048 characters.
pub fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(invalid_url("URL exceeds 2048 characters"));
    }

    let parsed = url::Url::parse(url).map_err(|_| invalid_url("Invalid URL format"))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => match parsed.host_str() {
            Some("localhost" | "127.0.0.1" | "0.0.0.0") => Ok(()),
            _ => Err(invalid_url(
                "HTTP is only allowed for localhost. Use HTTPS for production.",
            )),
        },
        _ => Err(invalid_url("URL must use HTTP or HTTPS")),
    }
}

fn invalid_url(message: &str) -> AppError {
    AppError::validation("invalid_url", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::verify_hex_signature;

    #[test]
    fn signature_has_prefix_and_verifies() {
        let sig = generate_signature("whsec_test", r#"{"event_type":"payment.completed"}"#);
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);

        // Partners check it the same way inbound gateway bodies are checked.
        let body = br#"{"event_type":"payment.completed"}"#;
        assert!(verify_hex_signature("whsec_test", body, &sig));
        assert!(!verify_hex_signature("whsec_other", body, &sig));
        assert!(!verify_hex_signature("whsec_test", br#"{"event_type":"payment.failed"}"#, &sig));
    }

    #[test]
    fn url_rules() {
        assert!(validate_webhook_url("https://partner.example.com/hooks").is_ok());
        assert!(validate_webhook_url("http://localhost:8080/hook").is_ok());
        assert!(validate_webhook_url("http://127.0.0.1/hook").is_ok());
        assert!(validate_webhook_url("http://partner.example.com/hook").is_err());
        assert!(validate_webhook_url("ftp://partner.example.com").is_err());
        assert!(validate_webhook_url("not a url").is_err());

        let long = format!("https://example.com/{}", "a".repeat(2048));
        assert_eq!(validate_webhook_url(&long).unwrap_err().code(), "invalid_url");
    }
}

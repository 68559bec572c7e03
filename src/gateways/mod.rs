//! Payment gateway clients.
//!
//! Card payments go to TransVoucher, crypto invoices to Uniwire. Both clients
//! return a [`GatewayResponse`] when the provider answered with a decision
//! (accepted or rejected) and a [`GatewayError`] when it could not be reached
//! or gave an answer that cannot be interpreted.

pub mod mock;
pub mod transvoucher;
pub mod uniwire;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::session::{CustomerInfo, SessionOutcome};

pub use mock::{MockBehavior, MockCardGateway, MockCryptoGateway};
pub use transvoucher::TransVoucherClient;
pub use uniwire::UniwireClient;

/// Longest provider message surfaced to callers.
pub const MAX_GATEWAY_MESSAGE: usize = 200;

/// Normalized provider decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub success: bool,
    pub payment_url: Option<String>,
    pub gateway_reference: Option<String>,
    pub error: Option<String>,
}

impl GatewayResponse {
    pub fn accepted(payment_url: Option<String>, gateway_reference: Option<String>) -> Self {
        Self {
            success: true,
            payment_url,
            gateway_reference,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payment_url: None,
            gateway_reference: None,
            error: Some(error.into()),
        }
    }
}

/// Provider-side status of an already created payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStatus {
    pub gateway: &'static str,
    pub gateway_reference: String,
    pub status: String,
    pub raw: Value,
}

/// A provider notification about one payment.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub event_type: String,

    /// Our session id, echoed back by the provider.
    pub session_id: Option<Uuid>,

    /// `None` for events that do not finish a payment.
    pub outcome: Option<SessionOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway connection failed: {0}")]
    Network(String),

    #[error("gateway returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("gateway response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct CardPaymentRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub title: String,
    pub description: String,
    pub reference_id: String,
    pub customer: CustomerInfo,
    pub metadata: Value,
    pub redirect_url: Option<String>,
}

/// Invoice request. Profile and settlement network come from the client's
/// configuration unless overridden here.
#[derive(Debug, Clone)]
pub struct CryptoInvoiceRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub profile_id: Option<String>,
    pub network: Option<String>,
    pub passthrough: Value,
    pub notes: String,
}

#[async_trait]
pub trait CardGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_payment(
        &self,
        request: &CardPaymentRequest,
    ) -> Result<GatewayResponse, GatewayError>;

    async fn payment_status(&self, gateway_reference: &str) -> Result<GatewayStatus, GatewayError>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool;
}

#[async_trait]
pub trait CryptoGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_invoice(
        &self,
        request: &CryptoInvoiceRequest,
    ) -> Result<GatewayResponse, GatewayError>;

    async fn invoice_status(&self, invoice_id: &str) -> Result<GatewayStatus, GatewayError>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool;
}

/// Truncate a provider message and blank out any configured credential.
pub fn sanitize_message(message: &str, secrets: &[String]) -> String {
    let mut cleaned = message.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        cleaned = cleaned.replace(secret.as_str(), "[redacted]");
    }
    cleaned.chars().take(MAX_GATEWAY_MESSAGE).collect()
}

/// What a provider HTTP answer amounts to.
pub(crate) enum Reply {
    /// 2xx with a JSON body.
    Ok(Value),
    /// 4xx; carries the provider's message.
    Rejected(String),
}

/// Split a provider response into a decision or an availability failure.
///
/// 5xx, 408, 429 and non-JSON success bodies are failures to interpret, not
/// decisions.
pub(crate) async fn read_reply(response: reqwest::Response) -> Result<Reply, GatewayError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map(Reply::Ok)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
    }

    let message = error_message(&body);
    let retryable = matches!(status.as_u16(), 408 | 429);
    if status.is_client_error() && !retryable {
        Ok(Reply::Rejected(message))
    } else {
        Err(GatewayError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

/// Constant-time comparison of a hex HMAC-SHA256 signature. A `sha256=`
/// prefix on `signature` is accepted.
pub(crate) fn verify_hex_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use subtle::ConstantTimeEq;

    if secret.is_empty() {
        return false;
    }
    let Ok(mut mac) = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    let provided = signature.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);

    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Pull a human-readable error out of a provider body, falling back to the
/// raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|field| match v.get(*field) {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Object(o)) => o
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_truncated_and_redacted() {
        let secrets = vec!["sekret-key".to_string(), String::new()];
        let long = format!("bad key sekret-key {}", "x".repeat(500));
        let cleaned = sanitize_message(&long, &secrets);
        assert!(!cleaned.contains("sekret-key"));
        assert!(cleaned.starts_with("bad key [redacted]"));
        assert_eq!(cleaned.chars().count(), MAX_GATEWAY_MESSAGE);
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(error_message(r#"{"message":"Invalid amount"}"#), "Invalid amount");
        assert_eq!(error_message(r#"{"error":"Profile not found","error_code":"x"}"#), "Profile not found");
        assert_eq!(error_message(r#"{"error":{"message":"nested"}}"#), "nested");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn hex_signatures() {
        use hmac::{Hmac, Mac};
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(b"whsec").unwrap();
        mac.update(b"{\"a\":1}");
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_hex_signature("whsec", b"{\"a\":1}", &sig));
        assert!(verify_hex_signature("whsec", b"{\"a\":1}", &format!("sha256={sig}")));
        assert!(!verify_hex_signature("whsec", b"{\"a\":2}", &sig));
        assert!(!verify_hex_signature("", b"{\"a\":1}", &sig));
        assert!(!verify_hex_signature("whsec", b"{\"a\":1}", "short"));
    }
}

//! Uniwire crypto invoicing client.
//!
//! # Request signing
//!
//! Every call sends a JSON payload augmented with the request path and a
//! millisecond nonce:
//!
//! - `X-CC-KEY`: API key
//! - `X-CC-PAYLOAD`: base64 of the JSON payload
//! - `X-CC-SIGNATURE`: hex HMAC-SHA256 of that base64 string, keyed with the API secret
//!
//! The payload travels in the header; the URL is `api_url + request path`.
//!
//! Invoice callbacks are signed the same way as TransVoucher webhooks: hex
//! HMAC-SHA256 of the raw body in [`SIGNATURE_HEADER`].

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::{Map, Value, json};
use sha2::Sha256;

use super::{
    CryptoGateway, CryptoInvoiceRequest, GatewayError, GatewayEvent, GatewayResponse,
    GatewayStatus, Reply, read_reply, verify_hex_signature,
};
use crate::{
    config::UniwireSettings,
    models::{money::format_cents, session::SessionOutcome},
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-CC-Webhook-Signature";

#[derive(Debug, Clone)]
pub struct UniwireClient {
    settings: UniwireSettings,
    client: reqwest::Client,
}

impl UniwireClient {
    pub fn new(settings: UniwireSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { settings, client })
    }

    /// Hosted invoice page: UUID without dashes, upper-cased.
    pub fn invoice_url(&self, invoice_id: &str) -> String {
        format!(
            "{}{}",
            self.settings.invoice_url_base,
            invoice_id.replace('-', "").to_uppercase()
        )
    }

    /// Build the signed headers for `endpoint` (e.g. `invoices`).
    ///
    /// Returns `(request_path, encoded_payload, signature)`.
    pub fn sign(
        &self,
        endpoint: &str,
        mut payload: Map<String, Value>,
        nonce_ms: i64,
    ) -> (String, String, String) {
        let request_path = format!("/v1/{endpoint}/");
        payload.insert("request".into(), Value::String(request_path.clone()));
        payload.insert("nonce".into(), Value::String(nonce_ms.to_string()));

        let encoded = STANDARD.encode(Value::Object(payload).to_string());

        let mut mac = HmacSha256::new_from_slice(self.settings.api_secret.as_bytes())
            .expect("HMAC key length is valid");
        mac.update(encoded.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        (request_path, encoded, signature)
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        payload: Map<String, Value>,
    ) -> Result<Reply, GatewayError> {
        let nonce = chrono::Utc::now().timestamp_millis();
        let (request_path, encoded, signature) = self.sign(endpoint, payload, nonce);

        let response = self
            .client
            .request(method, format!("{}{}", self.settings.api_url, request_path))
            .header("X-CC-KEY", &self.settings.api_key)
            .header("X-CC-PAYLOAD", encoded)
            .header("X-CC-SIGNATURE", signature)
            .send()
            .await?;

        read_reply(response).await
    }
}

fn result_object(value: &Value) -> Result<&Value, GatewayError> {
    value
        .get("result")
        .filter(|r| r.is_object())
        .ok_or_else(|| GatewayError::InvalidResponse("missing result object".into()))
}

/// Read an invoice callback.
///
/// Invoices move through `new`, `pending`, `complete` and `expired`; only the
/// last two finish a payment. The session id comes back inside the
/// `passthrough` JSON string set at invoice creation.
pub fn parse_event(payload: &Value) -> GatewayEvent {
    let invoice = payload
        .get("result")
        .filter(|r| r.is_object())
        .unwrap_or(payload);
    let status = invoice
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let passthrough = match invoice.get("passthrough") {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    };
    let session_id = passthrough
        .get("session_id")
        .and_then(Value::as_str)
        .and_then(|id| id.parse().ok());

    let outcome = match status {
        "complete" => Some(SessionOutcome::Completed {
            gateway_reference: invoice
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string),
            payment_url: None,
        }),
        "expired" => Some(SessionOutcome::Failed {
            reason: "Invoice expired".to_string(),
        }),
        _ => None,
    };

    GatewayEvent {
        event_type: format!("invoice.{status}"),
        session_id,
        outcome,
    }
}

#[async_trait]
impl CryptoGateway for UniwireClient {
    fn name(&self) -> &'static str {
        "uniwire"
    }

    async fn create_invoice(
        &self,
        request: &CryptoInvoiceRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let profile_id = request
            .profile_id
            .clone()
            .unwrap_or_else(|| self.settings.profile_id.clone());
        let kind = request
            .network
            .clone()
            .unwrap_or_else(|| self.settings.network.clone());

        let mut payload = Map::new();
        payload.insert("profile_id".into(), json!(profile_id));
        payload.insert("kind".into(), json!(kind));
        payload.insert("currency".into(), json!(request.currency));
        payload.insert("amount".into(), json!(format_cents(request.amount_cents)));
        payload.insert("passthrough".into(), json!(request.passthrough.to_string()));
        payload.insert("notes".into(), json!(request.notes));

        let value = match self.call(Method::POST, "invoices", payload).await? {
            Reply::Ok(value) => value,
            Reply::Rejected(message) => return Ok(GatewayResponse::rejected(message)),
        };

        let invoice_id = result_object(&value)?
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("missing invoice id".into()))?;

        Ok(GatewayResponse::accepted(
            Some(self.invoice_url(invoice_id)),
            Some(invoice_id.to_string()),
        ))
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<GatewayStatus, GatewayError> {
        let value = match self
            .call(Method::GET, &format!("invoices/{invoice_id}"), Map::new())
            .await?
        {
            Reply::Ok(value) => value,
            Reply::Rejected(message) => {
                return Err(GatewayError::Upstream {
                    status: 400,
                    message,
                });
            }
        };

        let result = result_object(&value)?.clone();
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::InvalidResponse("missing status".into()))?
            .to_string();

        Ok(GatewayStatus {
            gateway: self.name(),
            gateway_reference: invoice_id.to_string(),
            status,
            raw: result,
        })
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool {
        verify_hex_signature(&self.settings.api_secret, payload, signature)
    }
}

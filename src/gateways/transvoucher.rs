//! TransVoucher card payment client.
//!
//! Requests carry `X-API-Key` / `X-API-Secret` headers. A created payment
//! returns a hosted `payment_url` the customer is sent to.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    CardGateway, CardPaymentRequest, GatewayError, GatewayEvent, GatewayResponse, GatewayStatus,
    Reply, read_reply, verify_hex_signature,
};
use crate::{
    config::TransVoucherSettings,
    models::{money::format_cents, session::SessionOutcome},
};

/// Header carrying the hex HMAC of a webhook body.
pub const SIGNATURE_HEADER: &str = "X-TransVoucher-Signature";

#[derive(Debug, Clone)]
pub struct TransVoucherClient {
    settings: TransVoucherSettings,
    client: reqwest::Client,
}

impl TransVoucherClient {
    pub fn new(settings: TransVoucherSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { settings, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1.0/{}", self.settings.base_url, path)
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a `payment_intent.*` notification. The session id comes back in
/// `data.metadata.session_id`.
pub fn parse_event(payload: &Value) -> GatewayEvent {
    let event_type = payload
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let data = payload.get("data").unwrap_or(&Value::Null);
    let session_id = data
        .get("metadata")
        .and_then(|m| m.get("session_id"))
        .and_then(Value::as_str)
        .and_then(|id| id.parse().ok());

    let failed = |reason: &str| SessionOutcome::Failed {
        reason: reason.to_string(),
    };
    let outcome = match event_type.as_str() {
        "payment_intent.succeeded" => Some(SessionOutcome::Completed {
            gateway_reference: string_field(data, "transaction_id"),
            payment_url: None,
        }),
        "payment_intent.failed" => Some(failed("Payment failed")),
        "payment_intent.cancelled" => Some(failed("Payment cancelled")),
        "payment_intent.expired" => Some(failed("Payment expired")),
        _ => None,
    };

    GatewayEvent {
        event_type,
        session_id,
        outcome,
    }
}

#[async_trait]
impl CardGateway for TransVoucherClient {
    fn name(&self) -> &'static str {
        "transvoucher"
    }

    async fn create_payment(
        &self,
        request: &CardPaymentRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let body = json!({
            "amount": format_cents(request.amount_cents),
            "currency": request.currency,
            "title": request.title,
            "description": request.description,
            "multiple_use": false,
            "lang": "en",
            "reference_id": request.reference_id,
            "customer_details": {
                "full_name": request.customer.name,
                "email": request.customer.email,
                "phone": request.customer.phone,
            },
            "metadata": request.metadata,
            "redirect_url": request.redirect_url,
        });

        let response = self
            .client
            .post(self.url("payment/create"))
            .header("X-API-Key", &self.settings.api_key)
            .header("X-API-Secret", &self.settings.api_secret)
            .json(&body)
            .send()
            .await?;

        let value = match read_reply(response).await? {
            Reply::Ok(value) => value,
            Reply::Rejected(message) => return Ok(GatewayResponse::rejected(message)),
        };

        if value.get("success").and_then(Value::as_bool) != Some(true) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Payment creation was declined");
            return Ok(GatewayResponse::rejected(message));
        }

        let data = value
            .get("data")
            .ok_or_else(|| GatewayError::InvalidResponse("missing data object".into()))?;
        let payment_url = string_field(data, "payment_url")
            .ok_or_else(|| GatewayError::InvalidResponse("missing payment_url".into()))?;
        let gateway_reference =
            string_field(data, "transaction_id").or_else(|| string_field(data, "reference_id"));

        Ok(GatewayResponse::accepted(Some(payment_url), gateway_reference))
    }

    async fn payment_status(&self, gateway_reference: &str) -> Result<GatewayStatus, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("payment/status/{gateway_reference}")))
            .header("X-API-Key", &self.settings.api_key)
            .header("X-API-Secret", &self.settings.api_secret)
            .send()
            .await?;

        let value = match read_reply(response).await? {
            Reply::Ok(value) => value,
            Reply::Rejected(message) => {
                return Err(GatewayError::Upstream {
                    status: 400,
                    message,
                });
            }
        };

        let data = value.get("data").cloned().unwrap_or(Value::Null);
        let status = string_field(&data, "status")
            .ok_or_else(|| GatewayError::InvalidResponse("missing status".into()))?;

        Ok(GatewayStatus {
            gateway: self.name(),
            gateway_reference: gateway_reference.to_string(),
            status,
            raw: data,
        })
    }

    /// Webhooks are signed with the API secret: hex HMAC-SHA256 of the raw body.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool {
        verify_hex_signature(&self.settings.api_secret, payload, signature)
    }
}

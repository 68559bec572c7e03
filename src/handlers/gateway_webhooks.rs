//! Inbound payment provider notifications.
//!
//! The signature is checked over the raw body before it is parsed. Events
//! that finish a payment go through the same conditional writes as
//! `process-payment`, so a replayed or late notification never overturns a
//! stored outcome.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::AppError,
    gateways::{GatewayEvent, transvoucher, uniwire},
    models::session::PaymentMethod,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// `processed`, `duplicate` (session already finished) or `ignored`.
    pub status: &'static str,
}

/// TransVoucher `payment_intent.*` events.
pub async fn transvoucher_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    receive(
        &state,
        PaymentMethod::Card,
        signature(&headers, transvoucher::SIGNATURE_HEADER),
        &body,
        transvoucher::parse_event,
    )
    .await
}

/// Uniwire invoice callbacks.
pub async fn uniwire_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    receive(
        &state,
        PaymentMethod::Crypto,
        signature(&headers, uniwire::SIGNATURE_HEADER),
        &body,
        uniwire::parse_event,
    )
    .await
}

fn signature<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn receive(
    state: &AppState,
    method: PaymentMethod,
    signature: &str,
    body: &[u8],
    parse: fn(&Value) -> GatewayEvent,
) -> Result<Json<WebhookAck>, AppError> {
    let gateway = method.gateway();
    if !state.checkout.verify_gateway_webhook(method, body, signature) {
        tracing::warn!(gateway, "Gateway webhook signature rejected");
        return Err(AppError::InvalidSignature);
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| AppError::validation("invalid_json", "Webhook body is not valid JSON"))?;
    let event = parse(&payload);
    tracing::info!(gateway, event_type = %event.event_type, "Gateway webhook received");

    let Some(outcome) = event.outcome else {
        return Ok(Json(WebhookAck { status: "ignored" }));
    };
    let session_id = event.session_id.ok_or_else(|| {
        AppError::validation("missing_session", "Webhook does not identify a payment session")
    })?;

    let session = state.checkout.get_session(session_id).await?;
    if session.payment_method != method {
        return Err(AppError::NotFound("Payment session"));
    }

    let applied = state
        .checkout
        .apply_gateway_outcome(session_id, outcome)
        .await?;
    if !applied {
        tracing::info!(
            gateway,
            session_id = %session_id,
            "Session already finished, webhook not applied"
        );
    }

    Ok(Json(WebhookAck {
        status: if applied { "processed" } else { "duplicate" },
    }))
}

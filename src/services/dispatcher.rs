//! Routes a pending session to the gateway for its payment method.
//!
//! A provider decision, accepted or declined, comes back as a
//! [`GatewayResponse`]. Anything else (timeouts, transport errors, 5xx,
//! unparseable bodies) becomes [`AppError::GatewayUnavailable`] and leaves the
//! session untouched so the caller may retry. No retries happen here.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::{
    clock::Clock,
    error::AppError,
    gateways::{
        CardGateway, CardPaymentRequest, CryptoGateway, CryptoInvoiceRequest, GatewayError,
        GatewayResponse, GatewayStatus, sanitize_message,
    },
    models::session::{PaymentMethod, PaymentSession},
};

pub struct GatewayDispatcher {
    card: Arc<dyn CardGateway>,
    crypto: Arc<dyn CryptoGateway>,
    clock: Arc<dyn Clock>,

    /// Credentials scrubbed from surfaced provider messages.
    secrets: Vec<String>,
}

impl GatewayDispatcher {
    pub fn new(
        card: Arc<dyn CardGateway>,
        crypto: Arc<dyn CryptoGateway>,
        clock: Arc<dyn Clock>,
        secrets: Vec<String>,
    ) -> Self {
        Self {
            card,
            crypto,
            clock,
            secrets,
        }
    }

    /// Send `session` to its gateway.
    ///
    /// # Errors
    ///
    /// - `State(session_expired)`: the session is past `expires_at`; no call is made
    /// - `GatewayUnavailable`: the provider could not be reached or understood
    pub async fn dispatch(&self, session: &PaymentSession) -> Result<GatewayResponse, AppError> {
        if session.is_expired(self.clock.now()) {
            return Err(AppError::state(
                "session_expired",
                "Payment session has expired",
            ));
        }

        let result = match session.payment_method {
            PaymentMethod::Card => {
                let mut metadata = match &session.metadata {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                metadata.insert("session_id".into(), json!(session.session_id));

                let request = CardPaymentRequest {
                    amount_cents: session.amount_cents,
                    currency: session.currency.clone(),
                    title: session.title.clone(),
                    description: session.description.clone(),
                    reference_id: session.reference_id.clone(),
                    customer: session.customer.clone(),
                    metadata: Value::Object(metadata),
                    redirect_url: session.callback_url.clone(),
                };
                self.card.create_payment(&request).await
            }
            PaymentMethod::Crypto => {
                let request = CryptoInvoiceRequest {
                    amount_cents: session.amount_cents,
                    currency: session.currency.clone(),
                    profile_id: None,
                    network: None,
                    passthrough: json!({
                        "session_id": session.session_id,
                        "reference_id": session.reference_id,
                        "merchant_id": session.merchant_id,
                    }),
                    notes: session.description.clone(),
                };
                self.crypto.create_invoice(&request).await
            }
        };

        match result {
            Ok(mut response) => {
                response.error = response
                    .error
                    .map(|message| sanitize_message(&message, &self.secrets));
                tracing::info!(
                    session_id = %session.session_id,
                    gateway = session.payment_method.gateway(),
                    success = response.success,
                    "Gateway answered"
                );
                Ok(response)
            }
            Err(e) => Err(self.unavailable(session, e)),
        }
    }

    /// Ask the gateway for the current status of a dispatched session.
    pub async fn query_status(&self, session: &PaymentSession) -> Result<GatewayStatus, AppError> {
        let Some(reference) = session.gateway_reference.as_deref() else {
            return Err(AppError::state(
                "not_dispatched",
                "Payment session has not been sent to a gateway",
            ));
        };

        let result = match session.payment_method {
            PaymentMethod::Card => self.card.payment_status(reference).await,
            PaymentMethod::Crypto => self.crypto.invoice_status(reference).await,
        };

        result.map_err(|e| self.unavailable(session, e))
    }

    /// Check a provider notification signature over the raw body.
    pub fn verify_webhook(&self, method: PaymentMethod, payload: &[u8], signature: &str) -> bool {
        match method {
            PaymentMethod::Card => self.card.verify_webhook(payload, signature),
            PaymentMethod::Crypto => self.crypto.verify_webhook(payload, signature),
        }
    }

    fn unavailable(&self, session: &PaymentSession, err: GatewayError) -> AppError {
        let message = sanitize_message(&err.to_string(), &self.secrets);
        tracing::warn!(
            session_id = %session.session_id,
            gateway = session.payment_method.gateway(),
            error = %message,
            "Gateway unavailable"
        );
        AppError::GatewayUnavailable(message)
    }
}

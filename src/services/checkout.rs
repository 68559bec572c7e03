//! Checkout flow shared by the external API and the hosted checkout page.
//!
//! # Flow
//!
//! 1. Create a pending session, then its pending transaction
//!    (`reference == session_id`).
//! 2. The customer opens `process-payment?session_id=...`; the session's
//!    dispatch slot is claimed and it is sent to its gateway.
//! 3. The gateway decision is written to the session and the transaction with
//!    conditional updates, then the partner is notified.
//!
//! A gateway outage leaves both records pending and frees the slot so
//! processing can be retried. Provider webhooks settle through step 3.

use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::AppError,
    gateways::{GatewayResponse, GatewayStatus},
    models::{
        session::{MakePaymentRequest, PaymentMethod, PaymentSession, SessionOutcome},
        transaction::{NewTransaction, Transaction, TransactionStatus},
    },
    services::{
        dispatcher::GatewayDispatcher,
        session_manager::{PaymentSessionManager, SessionOrigin},
        transaction_ledger::TransactionLedger,
        webhook_service::Notifier,
    },
    store::Store,
};

/// Request metadata stored on the transaction.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug)]
pub struct CreatedCheckout {
    pub session: PaymentSession,
    pub transaction: Transaction,

    /// Customer-facing processing URL. Carries only the session id.
    pub payment_url: String,
}

#[derive(Debug)]
pub struct ProcessedCheckout {
    pub session: PaymentSession,
    pub transaction: Transaction,
    pub gateway: GatewayResponse,
}

pub struct CheckoutService {
    sessions: PaymentSessionManager,
    ledger: Arc<TransactionLedger>,
    dispatcher: GatewayDispatcher,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn Store>,
}

impl CheckoutService {
    pub fn new(
        sessions: PaymentSessionManager,
        ledger: Arc<TransactionLedger>,
        dispatcher: GatewayDispatcher,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            sessions,
            ledger,
            dispatcher,
            notifier,
            store,
        }
    }

    /// Validate `request`, then create the session and its pending transaction.
    ///
    /// If the transaction cannot be recorded the session is marked failed.
    pub async fn create_session(
        &self,
        origin: SessionOrigin,
        request: MakePaymentRequest,
        client: ClientInfo,
    ) -> Result<CreatedCheckout, AppError> {
        let new = self.sessions.parse_request(origin, request)?;
        let ttl = self.sessions.ttl_for(origin.entry_point);
        let session = self.sessions.create(new, ttl).await?;

        let mut metadata = match &session.metadata {
            Value::Object(map) => map.clone(),
            _ => Default::default(),
        };
        metadata.insert("reference_id".into(), json!(session.reference_id));
        metadata.insert("created_via".into(), json!(session.entry_point.as_str()));

        let new_tx = NewTransaction {
            reference: session.session_id.to_string(),
            merchant_id: session.merchant_id,
            customer_email: session.customer.email.clone(),
            payment_method: session.payment_method.as_str().to_string(),
            gateway: session.payment_method.gateway().to_string(),
            currency: session.currency.clone(),
            amount_cents: session.amount_cents,
            description: Some(session.description.clone()),
            metadata: Value::Object(metadata),
            ip_address: client.ip_address,
            user_agent: client.user_agent,
        };

        let transaction = match self.ledger.create_once(new_tx).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(
                    session_id = %session.session_id,
                    error = %e,
                    "Transaction could not be recorded, failing session"
                );
                if let Err(mark_err) = self
                    .sessions
                    .mark_failed(session.session_id, "transaction could not be recorded")
                    .await
                {
                    tracing::error!(
                        session_id = %session.session_id,
                        error = %mark_err,
                        "Failed to mark session failed"
                    );
                }
                return Err(e);
            }
        };

        let payment_url = format!(
            "{}/api/v1/checkout/process-payment?session_id={}",
            self.sessions.policy().public_base_url.trim_end_matches('/'),
            session.session_id
        );

        Ok(CreatedCheckout {
            session,
            transaction,
            payment_url,
        })
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<PaymentSession, AppError> {
        self.sessions.get(session_id).await
    }

    /// Dispatch a pending session and record the gateway decision.
    ///
    /// The session's dispatch slot is claimed first, so concurrent calls for
    /// one session reach the gateway at most once. The slot is released when
    /// no gateway decision was obtained.
    pub async fn process(&self, session_id: Uuid) -> Result<ProcessedCheckout, AppError> {
        let session = self.sessions.claim_dispatch(session_id).await?;

        let gateway = match self.dispatcher.dispatch(&session).await {
            Ok(gateway) => gateway,
            Err(e) => {
                if let Err(release_err) = self.sessions.release_dispatch(session_id).await {
                    tracing::error!(
                        session_id = %session_id,
                        error = %release_err,
                        "Failed to release dispatch claim"
                    );
                }
                return Err(e);
            }
        };

        let outcome = if gateway.success {
            SessionOutcome::Completed {
                gateway_reference: gateway.gateway_reference.clone(),
                payment_url: gateway.payment_url.clone(),
            }
        } else {
            SessionOutcome::Failed {
                reason: gateway
                    .error
                    .clone()
                    .unwrap_or_else(|| "Payment was declined".to_string()),
            }
        };
        let (session, transaction) = self.settle(session_id, outcome).await?;

        Ok(ProcessedCheckout {
            session,
            transaction,
            gateway,
        })
    }

    /// Apply an outcome reported by a gateway notification.
    ///
    /// Returns `false` when the session had already finished; the stored
    /// outcome is kept.
    pub async fn apply_gateway_outcome(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
    ) -> Result<bool, AppError> {
        match self.settle(session_id, outcome).await {
            Ok(_) => Ok(true),
            Err(AppError::State {
                code: "already_terminal",
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Finish the session, then its transaction, then tell the partner.
    async fn settle(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
    ) -> Result<(PaymentSession, Transaction), AppError> {
        let (status, event_type) = match outcome {
            SessionOutcome::Completed { .. } => (TransactionStatus::Success, "payment.completed"),
            SessionOutcome::Failed { .. } => (TransactionStatus::Failed, "payment.failed"),
        };

        let session = self.sessions.finish(session_id, outcome).await?;
        let transaction = self
            .ledger
            .update_status(&session.session_id.to_string(), status)
            .await?;

        self.notify_partner(&session, &transaction, event_type).await;
        Ok((session, transaction))
    }

    pub fn verify_gateway_webhook(
        &self,
        method: PaymentMethod,
        payload: &[u8],
        signature: &str,
    ) -> bool {
        self.dispatcher.verify_webhook(method, payload, signature)
    }

    /// Gateway-reported status of a session owned by `merchant_id`.
    pub async fn gateway_status(
        &self,
        session_id: Uuid,
        merchant_id: Uuid,
    ) -> Result<GatewayStatus, AppError> {
        let session = self.sessions.get(session_id).await?;
        if session.merchant_id != merchant_id {
            return Err(AppError::NotFound("Payment session"));
        }
        self.dispatcher.query_status(&session).await
    }

    async fn notify_partner(
        &self,
        session: &PaymentSession,
        transaction: &Transaction,
        event_type: &str,
    ) {
        let Some(partner_id) = session.partner_id else {
            return;
        };

        let partner = match self.store.find_partner(partner_id).await {
            Ok(Some(partner)) => partner,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(partner_id = %partner_id, error = %e, "Partner lookup for webhook failed");
                return;
            }
        };
        if partner.webhook_url.is_none() {
            return;
        }

        let result = self.notifier.notify(&partner, event_type, transaction).await;
        if !result.ok {
            tracing::warn!(
                partner_id = %partner_id,
                event_type,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Partner notification not delivered"
            );
        }
    }
}

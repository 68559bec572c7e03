//! Payment session creation and terminal transitions.

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::SessionPolicy,
    error::AppError,
    models::{
        money::{normalize_currency, parse_amount},
        session::{
            CustomerInfo, EntryPoint, MakePaymentRequest, NewSession, PaymentMethod,
            PaymentSession, SessionOutcome, SessionStatus,
        },
    },
    services::webhook_service::validate_webhook_url,
    store::{Store, StoreError},
};

/// Attempts at a free generated reference or session id.
const MAX_CREATE_ATTEMPTS: u32 = 5;

const MAX_REFERENCE_LEN: usize = 100;

/// Who is asking for a session, decided by the adapter.
#[derive(Debug, Clone, Copy)]
pub struct SessionOrigin {
    pub merchant_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub app_key_id: Option<Uuid>,
    pub entry_point: EntryPoint,
}

/// Generate a merchant reference: `PEX-REF-` followed by 8 upper-case hex chars.
pub fn generate_reference() -> String {
    format!("PEX-REF-{}", hex::encode_upper(rand::random::<[u8; 4]>()))
}

pub struct PaymentSessionManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl PaymentSessionManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// TTL for sessions created through `entry_point`.
    pub fn ttl_for(&self, entry_point: EntryPoint) -> Duration {
        match entry_point {
            EntryPoint::Api => self.policy.dispatch_ttl,
            EntryPoint::CheckoutPage => self.policy.checkout_page_ttl,
        }
    }

    /// Validate a raw request body into a [`NewSession`].
    ///
    /// Missing fields are reported together, before any other check.
    pub fn parse_request(
        &self,
        origin: SessionOrigin,
        request: MakePaymentRequest,
    ) -> Result<NewSession, AppError> {
        let mut missing = Vec::new();
        if request.amount.as_ref().is_none_or(Value::is_null) {
            missing.push("amount");
        }
        let currency = present(request.currency, "currency", &mut missing);
        let email = present(request.customer_email, "customer_email", &mut missing);
        let name = present(request.customer_name, "customer_name", &mut missing);
        let phone = present(request.customer_phone, "customer_phone", &mut missing);
        let description = present(request.description, "description", &mut missing);

        if !missing.is_empty() {
            return Err(AppError::validation(
                "missing_fields",
                format!("Missing required fields: {}", missing.join(", ")),
            ));
        }

        let amount_cents = parse_amount(request.amount.as_ref().unwrap_or(&Value::Null))?;

        let payment_method = match request.payment_method.as_deref() {
            None | Some("") => PaymentMethod::Card,
            Some(method) => method
                .parse::<PaymentMethod>()
                .map_err(|e| AppError::validation("unsupported_method", e))?,
        };

        let currency = normalize_currency(&currency);
        if !self.policy.supports_currency(&currency) {
            return Err(AppError::validation(
                "unsupported_currency",
                format!("Unsupported currency: {currency}"),
            ));
        }

        if !email.contains('@') {
            return Err(AppError::validation(
                "invalid_email",
                "customer_email must be a valid email address",
            ));
        }

        let callback_url = optional(request.callback_url);
        if let Some(url) = &callback_url {
            validate_webhook_url(url)?;
        }
        let cancel_url = optional(request.cancel_url);
        if let Some(url) = &cancel_url {
            validate_webhook_url(url)?;
        }

        let metadata = match request.metadata {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(Value::Object(map)) => Value::Object(map),
            Some(_) => {
                return Err(AppError::validation(
                    "invalid_metadata",
                    "metadata must be a JSON object",
                ));
            }
        };

        let reference_id = optional(request.reference_id);
        if reference_id
            .as_ref()
            .is_some_and(|r| r.len() > MAX_REFERENCE_LEN)
        {
            return Err(AppError::validation(
                "invalid_reference",
                "reference_id must be at most 100 characters",
            ));
        }

        Ok(NewSession {
            merchant_id: origin.merchant_id,
            partner_id: origin.partner_id,
            app_key_id: origin.app_key_id,
            payment_method,
            amount_cents,
            currency,
            customer: CustomerInfo { email, name, phone },
            description,
            title: optional(request.title).unwrap_or_else(|| "Payment".to_string()),
            reference_id,
            metadata,
            callback_url,
            cancel_url,
            entry_point: origin.entry_point,
        })
    }

    /// Persist a new pending session expiring `ttl` after creation.
    ///
    /// # Errors
    ///
    /// `Conflict(duplicate_reference)` when a caller-supplied reference is
    /// already used by the merchant.
    pub async fn create(&self, new: NewSession, ttl: Duration) -> Result<PaymentSession, AppError> {
        if new.amount_cents <= 0 {
            return Err(AppError::validation(
                "invalid_amount",
                "Amount must be greater than zero",
            ));
        }

        let caller_reference = new.reference_id.clone();

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let created_at = self.clock.now();
            let session = PaymentSession {
                session_id: Uuid::new_v4(),
                merchant_id: new.merchant_id,
                partner_id: new.partner_id,
                app_key_id: new.app_key_id,
                amount_cents: new.amount_cents,
                currency: new.currency.clone(),
                customer: new.customer.clone(),
                description: new.description.clone(),
                title: new.title.clone(),
                payment_method: new.payment_method,
                reference_id: caller_reference.clone().unwrap_or_else(generate_reference),
                metadata: new.metadata.clone(),
                callback_url: new.callback_url.clone(),
                cancel_url: new.cancel_url.clone(),
                entry_point: new.entry_point,
                status: SessionStatus::Pending,
                gateway_reference: None,
                payment_url: None,
                failure_reason: None,
                created_at,
                expires_at: created_at + ttl,
                completed_at: None,
                dispatched_at: None,
            };

            match self.store.insert_session(&session).await {
                Ok(()) => {
                    tracing::info!(
                        session_id = %session.session_id,
                        merchant_id = %session.merchant_id,
                        reference_id = %session.reference_id,
                        entry_point = session.entry_point.as_str(),
                        "Payment session created"
                    );
                    return Ok(session);
                }
                Err(StoreError::Duplicate("reference")) if caller_reference.is_some() => {
                    return Err(AppError::conflict(
                        "duplicate_reference",
                        format!(
                            "A payment with reference '{}' already exists",
                            session.reference_id
                        ),
                    ));
                }
                Err(StoreError::Duplicate(what)) => {
                    tracing::warn!(attempt, what, "Session identifier collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Provisioning(
            "could not allocate a unique session reference".into(),
        ))
    }

    pub async fn get(&self, session_id: Uuid) -> Result<PaymentSession, AppError> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or(AppError::NotFound("Payment session"))
    }

    /// Take the single dispatch slot of a pending session.
    ///
    /// # Errors
    ///
    /// - `State(already_terminal)`: the session has finished
    /// - `State(dispatch_in_progress)`: another caller holds the slot
    pub async fn claim_dispatch(&self, session_id: Uuid) -> Result<PaymentSession, AppError> {
        if let Some(session) = self
            .store
            .claim_session_dispatch(session_id, self.clock.now())
            .await?
        {
            return Ok(session);
        }

        let session = self.get(session_id).await?;
        if session.is_pending() {
            tracing::warn!(session_id = %session_id, "Dispatch already in progress");
            Err(AppError::state(
                "dispatch_in_progress",
                "Payment session is already being processed",
            ))
        } else {
            Err(already_terminal())
        }
    }

    /// Give the dispatch slot back so processing can be retried.
    pub async fn release_dispatch(&self, session_id: Uuid) -> Result<(), AppError> {
        self.store.release_session_dispatch(session_id).await?;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        session_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<PaymentSession, AppError> {
        self.finish(
            session_id,
            SessionOutcome::Failed {
                reason: reason.into(),
            },
        )
        .await
    }

    /// Terminal write. Refused with `already_terminal` once the session has
    /// finished.
    pub async fn finish(
        &self,
        session_id: Uuid,
        outcome: SessionOutcome,
    ) -> Result<PaymentSession, AppError> {
        match self
            .store
            .finish_session(session_id, &outcome, self.clock.now())
            .await?
        {
            Some(session) => {
                tracing::info!(
                    session_id = %session_id,
                    status = session.status.as_str(),
                    "Payment session finished"
                );
                Ok(session)
            }
            None => {
                // Distinguish a missing session from one that already finished.
                self.get(session_id).await?;
                Err(already_terminal())
            }
        }
    }
}

fn already_terminal() -> AppError {
    AppError::state("already_terminal", "Payment session is already finished")
}

fn present(value: Option<String>, field: &'static str, missing: &mut Vec<&'static str>) -> String {
    match optional(value) {
        Some(v) => v,
        None => {
            missing.push(field);
            String::new()
        }
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

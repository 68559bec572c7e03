//! Checkout payment session model.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──▶ completed
//!    │
//!    └──────▶ failed
//! ```
//!
//! `expired` is never stored. A pending session whose `expires_at` has passed
//! reports `expired` when read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::money::format_cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Crypto,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Crypto => "crypto",
        }
    }

    /// Name of the gateway that settles this method.
    pub fn gateway(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "transvoucher",
            PaymentMethod::Crypto => "uniwire",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "crypto" => Ok(PaymentMethod::Crypto),
            _ => Err(format!("Unsupported payment method: {}", s)),
        }
    }
}

/// Which adapter created the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Api,
    CheckoutPage,
}

impl EntryPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Api => "api",
            EntryPoint::CheckoutPage => "checkout_page",
        }
    }
}

impl std::str::FromStr for EntryPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(EntryPoint::Api),
            "checkout_page" => Ok(EntryPoint::CheckoutPage),
            _ => Err(format!("Invalid entry point: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "expired" => Ok(SessionStatus::Expired),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfo {
    pub email: String,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub session_id: Uuid,
    pub merchant_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub app_key_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub customer: CustomerInfo,
    pub description: String,
    pub title: String,
    pub payment_method: PaymentMethod,

    /// Unique per merchant.
    pub reference_id: String,

    pub metadata: Value,
    pub callback_url: Option<String>,
    pub cancel_url: Option<String>,
    pub entry_point: EntryPoint,

    /// Stored status: pending, completed or failed.
    pub status: SessionStatus,

    pub gateway_reference: Option<String>,
    pub payment_url: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Set while a gateway call for this session is in flight.
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl PaymentSession {
    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now > self.expires_at
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.is_expired(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn to_response(&self, now: DateTime<Utc>) -> SessionResponse {
        SessionResponse {
            session_id: self.session_id,
            reference_id: self.reference_id.clone(),
            status: self.effective_status(now),
            amount: format_cents(self.amount_cents),
            currency: self.currency.clone(),
            payment_method: self.payment_method,
            description: self.description.clone(),
            title: self.title.clone(),
            customer_email: self.customer.email.clone(),
            customer_name: self.customer.name.clone(),
            payment_url: self.payment_url.clone(),
            failure_reason: self.failure_reason.clone(),
            callback_url: self.callback_url.clone(),
            cancel_url: self.cancel_url.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
        }
    }
}

/// Validated input to session creation.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub merchant_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub app_key_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
    pub customer: CustomerInfo,
    pub description: String,
    pub title: String,

    /// Caller-chosen reference. A generated one is used when absent.
    pub reference_id: Option<String>,

    pub metadata: Value,
    pub callback_url: Option<String>,
    pub cancel_url: Option<String>,
    pub entry_point: EntryPoint,
}

/// How a terminal session write was decided.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Completed {
        gateway_reference: Option<String>,
        payment_url: Option<String>,
    },
    Failed {
        reason: String,
    },
}

impl SessionOutcome {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionOutcome::Completed { .. } => SessionStatus::Completed,
            SessionOutcome::Failed { .. } => SessionStatus::Failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub reference_id: String,
    pub status: SessionStatus,
    pub amount: String,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub description: String,
    pub title: String,
    pub customer_email: String,
    pub customer_name: String,
    pub payment_url: Option<String>,
    pub failure_reason: Option<String>,
    pub callback_url: Option<String>,
    pub cancel_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/v1/checkout/make-payment` and the internal checkout
/// page adapter.
///
/// Fields are optional so missing ones are reported together as
/// `missing_fields` instead of a serde error.
#[derive(Debug, Default, Deserialize)]
pub struct MakePaymentRequest {
    pub amount: Option<Value>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub reference_id: Option<String>,
    pub metadata: Option<Value>,
    pub callback_url: Option<String>,
    pub cancel_url: Option<String>,
    pub title: Option<String>,
}

/// Internal checkout-page request: same payment fields plus the merchant,
/// since there is no API key to derive it from.
#[derive(Debug, Deserialize)]
pub struct CheckoutPageSessionRequest {
    pub merchant_id: Option<Uuid>,
    #[serde(flatten)]
    pub payment: MakePaymentRequest,
}

#[derive(Debug, Serialize)]
pub struct MakePaymentResponse {
    pub success: bool,
    pub transaction_id: Uuid,
    pub reference_id: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub amount: String,
    pub currency: String,
    pub payment_url: String,
    pub status: SessionStatus,
    pub payment_method: PaymentMethod,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentQuery {
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProcessPaymentResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub reference_id: String,
    pub status: SessionStatus,
    pub payment_url: Option<String>,
    pub gateway_reference: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn methods_route_to_gateways() {
        assert_eq!(PaymentMethod::Card.gateway(), "transvoucher");
        assert_eq!(PaymentMethod::Crypto.gateway(), "uniwire");
        assert_eq!("CARD".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn expiry_only_applies_to_pending() {
        let now = Utc::now();
        let mut session = PaymentSession {
            session_id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            partner_id: None,
            app_key_id: None,
            amount_cents: 100,
            currency: "USD".into(),
            customer: CustomerInfo {
                email: "a@b.c".into(),
                name: "A".into(),
                phone: "1".into(),
            },
            description: "d".into(),
            title: String::new(),
            payment_method: PaymentMethod::Card,
            reference_id: "PEX-REF-00000000".into(),
            metadata: Value::Null,
            callback_url: None,
            cancel_url: None,
            entry_point: EntryPoint::Api,
            status: SessionStatus::Pending,
            gateway_reference: None,
            payment_url: None,
            failure_reason: None,
            created_at: now - Duration::minutes(10),
            expires_at: now - Duration::minutes(5),
            completed_at: None,
            dispatched_at: None,
        };
        assert_eq!(session.effective_status(now), SessionStatus::Expired);

        session.status = SessionStatus::Completed;
        assert_eq!(session.effective_status(now), SessionStatus::Completed);
    }
}

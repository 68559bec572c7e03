//! Outbound partner webhook payloads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::transaction::TransactionResponse;

/// Body POSTed to a partner's webhook URL.
///
/// ```json
/// {
///   "event_type": "payment.completed",
///   "event_id": "5f1e...",
///   "created_at": "2025-12-21T16:00:00Z",
///   "data": { "transaction": { ... } }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: WebhookData,
}

#[derive(Debug, Serialize)]
pub struct WebhookData {
    pub transaction: TransactionResponse,
}

/// Outcome of a best-effort delivery. Never turned into a request failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationResult {
    pub ok: bool,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Returned when a secret is generated; the raw value appears only here.
#[derive(Debug, Serialize)]
pub struct SecretResponse {
    pub success: bool,
    pub secret: String,
    pub warning: &'static str,
}

pub const SECRET_WARNING: &str = "This secret will not be shown again. Please store it securely.";

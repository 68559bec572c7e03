//! Whitelabel partner model.
//!
//! A partner owns API keys and may be bound to a [`Merchant`](super::merchant::Merchant)
//! through `merchant_id`. Payment sessions created with a partner's key are
//! booked against that merchant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Represents a partner record.
///
/// `webhook_secret` is stored raw because it is used to sign outbound
/// webhooks; it is never part of [`PartnerResponse`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,

    /// Unique short identifier, also accepted as a credential prefix.
    pub code: String,

    pub merchant_id: Option<Uuid>,
    pub contact_email: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a partner.
///
/// When `code` is omitted and `merchant_id` is given, the code becomes
/// `merchant_<merchant_id>`.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePartnerRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub merchant_id: Option<Uuid>,
    pub contact_email: Option<String>,
    pub webhook_url: Option<String>,
}

/// Partial update. An empty `webhook_url` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePartnerRequest {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub webhook_url: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct PartnerResponse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub merchant_id: Option<Uuid>,
    pub contact_email: Option<String>,
    pub webhook_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Partner> for PartnerResponse {
    fn from(p: Partner) -> Self {
        Self {
            id: p.id,
            name: p.name,
            code: p.code,
            merchant_id: p.merchant_id,
            contact_email: p.contact_email,
            webhook_url: p.webhook_url,
            is_active: p.is_active,
            is_verified: p.is_verified,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Partner creation response; the only place the webhook secret appears
/// besides rotation.
#[derive(Debug, Serialize)]
pub struct CreatedPartnerResponse {
    #[serde(flatten)]
    pub partner: PartnerResponse,
    pub webhook_secret: String,
    pub warning: &'static str,
}

/// Partner codes are 1..=50 chars of ASCII letters, digits, `-` and `_`.
pub fn validate_partner_code(code: &str) -> Result<(), AppError> {
    let valid_chars = code
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if code.is_empty() || code.len() > 50 || !valid_chars {
        return Err(AppError::validation(
            "invalid_partner_code",
            "Partner code may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_codes() {
        assert!(validate_partner_code("acme_pay-01").is_ok());
        assert!(validate_partner_code("merchant_7f1c2e4a-0000-4000-8000-000000000000").is_ok());
        assert!(validate_partner_code("").is_err());
        assert!(validate_partner_code("has space").is_err());
        assert!(validate_partner_code("slash/code").is_err());
        assert!(validate_partner_code("colon:code").is_err());
    }
}

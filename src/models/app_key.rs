//! App key model for partner authentication.
//!
//! A key pair is a public key (stored in the clear, unique) and a secret that
//! is only ever stored as a salted hash. See [`crate::keys::material`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Test,
    Live,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Test => "test",
            KeyType::Live => "live",
        }
    }
}

impl std::str::FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(KeyType::Test),
            "live" => Ok(KeyType::Live),
            _ => Err(format!("Invalid key type: {}", s)),
        }
    }
}

/// Permission granted to a key. `read` covers GET endpoints, `write` covers
/// mutating ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Write => "write",
            Scope::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "read" => Ok(Scope::Read),
            "write" => Ok(Scope::Write),
            "admin" => Ok(Scope::Admin),
            _ => Err(format!("Invalid scope: {}", s)),
        }
    }
}

/// Stored lifecycle status. `Expired` is only ever derived from `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKeyStatus {
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl AppKeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppKeyStatus::Active => "active",
            AppKeyStatus::Suspended => "suspended",
            AppKeyStatus::Revoked => "revoked",
            AppKeyStatus::Expired => "expired",
        }
    }
}

impl std::str::FromStr for AppKeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AppKeyStatus::Active),
            "suspended" => Ok(AppKeyStatus::Suspended),
            "revoked" => Ok(AppKeyStatus::Revoked),
            "expired" => Ok(AppKeyStatus::Expired),
            _ => Err(format!("Invalid key status: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppKey {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub name: String,
    pub key_type: KeyType,
    pub public_key: String,

    /// `v1$<salt>$<mac>`; written only by the registry.
    pub secret_hash: String,

    pub scopes: Vec<Scope>,

    /// Client addresses allowed to use this key. Empty means unrestricted.
    pub allowed_ips: Vec<String>,

    pub status: AppKeyStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppKey {
    /// Active and not past its expiry.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == AppKeyStatus::Active && self.expires_at.is_none_or(|at| at > now)
    }

    /// Status as callers should see it: an active key past `expires_at`
    /// reports `expired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> AppKeyStatus {
        match self.status {
            AppKeyStatus::Active if self.expires_at.is_some_and(|at| at <= now) => {
                AppKeyStatus::Expired
            }
            status => status,
        }
    }

    pub fn ip_allowed(&self, ip: Option<&str>) -> bool {
        if self.allowed_ips.is_empty() {
            return true;
        }
        ip.is_some_and(|ip| self.allowed_ips.iter().any(|allowed| allowed == ip))
    }

    pub fn to_response(&self, now: DateTime<Utc>) -> AppKeyResponse {
        AppKeyResponse {
            id: self.id,
            partner_id: self.partner_id,
            name: self.name.clone(),
            key_type: self.key_type,
            public_key: self.public_key.clone(),
            scopes: self.scopes.clone(),
            allowed_ips: self.allowed_ips.clone(),
            status: self.effective_status(now),
            expires_at: self.expires_at,
            usage_count: self.usage_count,
            last_used_at: self.last_used_at,
            revoked_at: self.revoked_at,
            revoked_by: self.revoked_by.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public view of a key. Never carries the secret or its hash.
#[derive(Debug, Serialize)]
pub struct AppKeyResponse {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub name: String,
    pub key_type: KeyType,
    pub public_key: String,
    pub scopes: Vec<Scope>,
    pub allowed_ips: Vec<String>,
    pub status: AppKeyStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Key creation response; the only place the raw secret appears.
#[derive(Debug, Serialize)]
pub struct CreatedAppKeyResponse {
    #[serde(flatten)]
    pub key: AppKeyResponse,
    pub secret_key: String,
    pub warning: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppKeyRequest {
    pub partner_id: Option<Uuid>,
    pub name: Option<String>,
    pub key_type: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAppKeyRequest {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_ips: Option<Vec<String>>,
}

/// Validated settings change accepted by the registry.
#[derive(Debug, Default, Clone)]
pub struct AppKeySettings {
    pub name: Option<String>,
    pub scopes: Option<Vec<Scope>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub allowed_ips: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct AppKeyFilter {
    pub partner_id: Option<Uuid>,
    pub status: Option<AppKeyStatus>,
    pub key_type: Option<KeyType>,
}

/// Body of `POST /api/v1/auth/verify-key`.
#[derive(Debug, Deserialize)]
pub struct VerifyKeyRequest {
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
}

/// What a caller may learn about its own key after verifying it.
#[derive(Debug, Serialize)]
pub struct KeySummary {
    pub key_id: Uuid,
    pub partner_name: String,
    pub key_type: KeyType,
    pub scopes: Vec<Scope>,
    pub expires_at: Option<DateTime<Utc>>,
}

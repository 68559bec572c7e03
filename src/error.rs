//! Error types and HTTP error response handling.
//!
//! Every failure a handler can produce is an [`AppError`]. Each variant maps to
//! one HTTP status and a stable machine-readable code, rendered as:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "invalid_amount",
//!     "message": "Amount must be greater than zero"
//!   }
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Reasons an inbound API credential was refused.
///
/// The variants are kept distinct so logs can tell them apart, but several of
/// them share one external code so a caller cannot tell which public keys
/// exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication credentials were not provided")]
    MissingCredential,

    #[error("Malformed API credential")]
    MalformedCredential,

    #[error("unknown public key")]
    UnknownKey,

    #[error("secret does not match")]
    InvalidSecret,

    #[error("key is not active or has expired")]
    InactiveOrExpired,

    #[error("owning partner is inactive")]
    PartnerInactive,

    #[error("client address is not on the key allowlist")]
    IpNotAllowed,
}

impl AuthError {
    /// Code exposed to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedCredential => "malformed_credential",
            AuthError::UnknownKey | AuthError::InvalidSecret => "invalid_api_key",
            AuthError::InactiveOrExpired | AuthError::PartnerInactive | AuthError::IpNotAllowed => {
                "inactive_api_key"
            }
        }
    }

    /// Message exposed to API callers.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Authentication credentials were not provided",
            AuthError::MalformedCredential => "Malformed API credential",
            AuthError::UnknownKey | AuthError::InvalidSecret => "Invalid API key",
            AuthError::InactiveOrExpired | AuthError::PartnerInactive | AuthError::IpNotAllowed => {
                "API key is not active for this request"
            }
        }
    }
}

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation**: malformed input (400)
/// - **Authentication**: missing or refused credentials (401)
/// - **Permission**: authenticated but not allowed (403)
/// - **Lookup**: unknown resource (404)
/// - **Conflict / State**: uniqueness and lifecycle violations (409, 422)
/// - **Gateway**: upstream payment provider unreachable (502)
/// - **Internal**: storage and provisioning failures (500, details hidden)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Missing or wrong `X-Admin-Token`.
    #[error("Invalid admin token")]
    AdminUnauthorized,

    #[error("{message}")]
    PermissionDenied { code: &'static str, message: String },

    /// The named resource does not exist or is not visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// A lifecycle transition was refused.
    ///
    /// `session_expired` renders as 422; every other code renders as 409.
    #[error("{message}")]
    State { code: &'static str, message: String },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// An inbound gateway notification failed its signature check.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Key provisioning could not find a free public key.
    #[error("Provisioning failed: {0}")]
    Provisioning(String),
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn state(code: &'static str, message: impl Into<String>) -> Self {
        AppError::State {
            code,
            message: message.into(),
        }
    }

    pub fn insufficient_permissions() -> Self {
        AppError::PermissionDenied {
            code: "insufficient_permissions",
            message: "Insufficient permissions".to_string(),
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::Validation { code, .. }
            | AppError::PermissionDenied { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::State { code, .. } => *code,
            AppError::Auth(err) => err.code(),
            AppError::AdminUnauthorized => "invalid_admin_token",
            AppError::NotFound(_) => "not_found",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Provisioning(_) => "provisioning_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Auth(_) | AppError::AdminUnauthorized | AppError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::State { code, .. } if *code == "session_expired" => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::State { .. } => StatusCode::CONFLICT,
            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Provisioning(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => {
                AppError::conflict("duplicate_resource", format!("{what} already exists"))
            }
            StoreError::Database(err) => AppError::Database(err),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// Internal failures are logged here and replaced by a generic message so
/// storage details never reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Database(_) | AppError::Provisioning(_) => {
                tracing::error!(error = %self, "request failed with internal error");
                "An internal error occurred".to_string()
            }
            AppError::Auth(err) => err.public_message().to_string(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

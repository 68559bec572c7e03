//! Credential verification endpoints.

use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};

use crate::{
    error::{AppError, AuthError},
    extract::ApiJson,
    middleware::auth::AuthContext,
    models::app_key::{KeySummary, VerifyKeyRequest},
    services::checkout::ClientInfo,
    state::AppState,
};

/// Check a public key and secret pair without calling any other endpoint.
///
/// # Request Body
///
/// ```json
/// { "public_key": "pk_live_...", "secret_key": "sk_live_..." }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "key_id": "...",
///     "partner_name": "Acme",
///     "key_type": "live",
///     "scopes": ["read", "write"],
///     "expires_at": null
///   }
/// }
/// ```
///
/// Any refusal is a 401 in the standard error envelope.
pub async fn verify_key(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<VerifyKeyRequest>,
) -> Result<Json<Value>, AppError> {
    let (Some(public_key), Some(secret_key)) = (request.public_key, request.secret_key) else {
        return Err(AuthError::MissingCredential.into());
    };

    let (partner, key) = state
        .authenticator
        .authenticate(
            &format!("{}:{}", public_key.trim(), secret_key.trim()),
            client.ip_address.as_deref(),
        )
        .await?;

    let summary = KeySummary {
        key_id: key.id,
        partner_name: partner.name,
        key_type: key.key_type,
        scopes: key.scopes,
        expires_at: key.expires_at,
    };

    Ok(Json(json!({ "success": true, "data": summary })))
}

/// Echo the partner and key behind the presented credential.
pub async fn verify(Extension(auth): Extension<AuthContext>) -> Json<Value> {
    let key = KeySummary {
        key_id: auth.app_key_id,
        partner_name: auth.partner_name.clone(),
        key_type: auth.key_type,
        scopes: auth.scopes.clone(),
        expires_at: auth.expires_at,
    };

    Json(json!({
        "success": true,
        "data": {
            "partner": {
                "id": auth.partner_id,
                "name": auth.partner_name,
                "code": auth.partner_code,
                "merchant_id": auth.merchant_id,
            },
            "key": key,
        }
    }))
}

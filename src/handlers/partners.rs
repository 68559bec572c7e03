//! Admin endpoints for merchants and whitelabel partners.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{ApiJson, ApiPath},
    models::{
        merchant::{CreateMerchantRequest, Merchant},
        partner::{
            CreatePartnerRequest, CreatedPartnerResponse, PartnerResponse, UpdatePartnerRequest,
        },
        webhook::{SECRET_WARNING, SecretResponse},
    },
    state::AppState,
};

pub async fn create_merchant(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateMerchantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let merchant = state.partners.create_merchant(request).await?;
    Ok((StatusCode::CREATED, Json(merchant)))
}

pub async fn get_merchant(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Merchant>, AppError> {
    Ok(Json(state.partners.get_merchant(id).await?))
}

/// Create a partner.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Acme Pay",
///   "code": "acme",
///   "merchant_id": "...",
///   "contact_email": "ops@acme.example",
///   "webhook_url": "https://acme.example/hooks"
/// }
/// ```
///
/// # Response
///
/// 201 Created. The `webhook_secret` used to sign outbound webhooks is
/// returned only here and on rotation.
pub async fn create_partner(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreatePartnerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let partner = state.partners.create_partner(request).await?;
    let webhook_secret = partner.webhook_secret.clone();

    Ok((
        StatusCode::CREATED,
        Json(CreatedPartnerResponse {
            partner: partner.into(),
            webhook_secret,
            warning: SECRET_WARNING,
        }),
    ))
}

pub async fn list_partners(
    State(state): State<AppState>,
) -> Result<Json<Vec<PartnerResponse>>, AppError> {
    let partners = state.partners.list().await?;
    Ok(Json(partners.into_iter().map(Into::into).collect()))
}

pub async fn get_partner(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PartnerResponse>, AppError> {
    Ok(Json(state.partners.get(id).await?.into()))
}

/// Partial update. Setting `is_active` to false locks out all of the
/// partner's keys without touching them.
pub async fn update_partner(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdatePartnerRequest>,
) -> Result<Json<PartnerResponse>, AppError> {
    Ok(Json(state.partners.update(id, request).await?.into()))
}

/// Rotate the webhook signing secret.
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "secret": "whsec_...",
///   "warning": "This secret will not be shown again. Please store it securely."
/// }
/// ```
pub async fn rotate_webhook_secret(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<SecretResponse>, AppError> {
    let secret = state.partners.rotate_webhook_secret(id).await?;
    Ok(Json(SecretResponse {
        success: true,
        secret,
        warning: SECRET_WARNING,
    }))
}

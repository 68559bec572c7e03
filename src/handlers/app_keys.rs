//! Admin endpoints for app key management.
//!
//! Raw secrets appear in exactly two responses: key creation and secret
//! regeneration. Every other response carries the public view only.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Duration;
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::admin::AdminActor,
    models::{
        app_key::{
            AppKeyFilter, AppKeyResponse, AppKeySettings, CreateAppKeyRequest,
            CreatedAppKeyResponse, KeyType, UpdateAppKeyRequest,
        },
        usage::{UsageLogFilter, UsageLogPage, UsageStats, UsageStatsQuery},
        webhook::SECRET_WARNING,
    },
    services::app_key_registry::{NewAppKey, parse_scopes},
    state::AppState,
};

/// Issue a new key pair for a partner.
///
/// # Request Body
///
/// ```json
/// {
///   "partner_id": "...",
///   "name": "Production",
///   "key_type": "live",
///   "scopes": ["read", "write"],
///   "expires_at": "2026-01-01T00:00:00Z",
///   "allowed_ips": ["203.0.113.7"]
/// }
/// ```
///
/// `key_type` defaults to `test` and `scopes` to `["read", "write"]`.
///
/// # Response
///
/// 201 Created with the key and its `secret_key`, shown only this once.
pub async fn create_app_key(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateAppKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let partner_id = request.partner_id.ok_or_else(|| {
        AppError::validation("missing_fields", "Missing required fields: partner_id")
    })?;
    let partner = state.partners.get(partner_id).await?;

    let key_type = match request.key_type.as_deref() {
        None | Some("") => KeyType::Test,
        Some(raw) => raw
            .parse::<KeyType>()
            .map_err(|e| AppError::validation("invalid_key_type", e))?,
    };

    let scopes = match request.scopes {
        Some(names) => parse_scopes(&names)?,
        None => parse_scopes(&["read".to_string(), "write".to_string()])?,
    };

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{} key", key_type.as_str()));

    let (key, secret) = state
        .app_keys
        .create(
            &partner,
            NewAppKey {
                name,
                key_type,
                scopes,
                expires_at: request.expires_at,
                allowed_ips: request.allowed_ips,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedAppKeyResponse {
            key: key.to_response(state.clock.now()),
            secret_key: secret,
            warning: SECRET_WARNING,
        }),
    ))
}

/// List keys, optionally filtered by `partner_id`, `status` and `key_type`.
pub async fn list_app_keys(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<AppKeyFilter>,
) -> Result<Json<Vec<AppKeyResponse>>, AppError> {
    let now = state.clock.now();
    let keys = state.app_keys.list(&filter).await?;
    Ok(Json(keys.iter().map(|k| k.to_response(now)).collect()))
}

/// Keys of one partner.
pub async fn list_partner_app_keys(
    State(state): State<AppState>,
    ApiPath(partner_id): ApiPath<Uuid>,
) -> Result<Json<Vec<AppKeyResponse>>, AppError> {
    state.partners.get(partner_id).await?;

    let filter = AppKeyFilter {
        partner_id: Some(partner_id),
        ..Default::default()
    };
    let now = state.clock.now();
    let keys = state.app_keys.list(&filter).await?;
    Ok(Json(keys.iter().map(|k| k.to_response(now)).collect()))
}

pub async fn get_app_key(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AppKeyResponse>, AppError> {
    let key = state.app_keys.get(id).await?;
    Ok(Json(key.to_response(state.clock.now())))
}

/// Change name, scopes, expiry or IP allowlist.
pub async fn update_app_key(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateAppKeyRequest>,
) -> Result<Json<AppKeyResponse>, AppError> {
    let settings = AppKeySettings {
        name: request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        scopes: request.scopes.as_deref().map(parse_scopes).transpose()?,
        expires_at: request.expires_at,
        allowed_ips: request.allowed_ips,
    };

    let key = state.app_keys.update_settings(id, settings).await?;
    Ok(Json(key.to_response(state.clock.now())))
}

/// Revoke a key. Repeating the call returns the already revoked key.
pub async fn revoke_app_key(
    State(state): State<AppState>,
    Extension(AdminActor(actor)): Extension<AdminActor>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AppKeyResponse>, AppError> {
    let key = state.app_keys.revoke(id, &actor).await?;
    Ok(Json(key.to_response(state.clock.now())))
}

pub async fn suspend_app_key(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AppKeyResponse>, AppError> {
    let key = state.app_keys.suspend(id).await?;
    Ok(Json(key.to_response(state.clock.now())))
}

pub async fn activate_app_key(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<AppKeyResponse>, AppError> {
    let key = state.app_keys.activate(id).await?;
    Ok(Json(key.to_response(state.clock.now())))
}

/// Replace the secret. The old secret stops working immediately.
pub async fn regenerate_secret(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CreatedAppKeyResponse>, AppError> {
    let (key, secret) = state.app_keys.regenerate_secret(id).await?;
    Ok(Json(CreatedAppKeyResponse {
        key: key.to_response(state.clock.now()),
        secret_key: secret,
        warning: SECRET_WARNING,
    }))
}

/// Call statistics for `start_date`..`end_date`, last 30 days by default.
pub async fn usage_stats(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<UsageStatsQuery>,
) -> Result<Json<UsageStats>, AppError> {
    state.app_keys.get(id).await?;

    let end = query.end_date.unwrap_or_else(|| state.clock.now());
    let start = query.start_date.unwrap_or(end - Duration::days(30));
    let stats = state.usage.stats(id, start, end).await?;
    Ok(Json(stats))
}

/// Paginated call log, filterable by `method` and `status_code`.
pub async fn usage_logs(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(filter): ApiQuery<UsageLogFilter>,
) -> Result<Json<UsageLogPage>, AppError> {
    state.app_keys.get(id).await?;
    let page = state.usage.logs(id, &filter).await?;
    Ok(Json(page))
}

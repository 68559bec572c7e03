//! Admin token guard for `/admin` and `/internal` routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{error::AppError, state::AppState};

/// Who performed an admin action, from `X-Admin-Actor` (default `admin`).
#[derive(Debug, Clone)]
pub struct AdminActor(pub String);

pub async fn admin_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("X-Admin-Token")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::AdminUnauthorized)?;

    let expected = state.admin_token.as_bytes();
    if expected.is_empty() || !bool::from(token.as_bytes().ct_eq(expected)) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin token");
        return Err(AppError::AdminUnauthorized);
    }

    let actor = request
        .headers()
        .get("X-Admin-Actor")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("admin")
        .to_string();
    request.extensions_mut().insert(AdminActor(actor));

    Ok(next.run(request).await)
}

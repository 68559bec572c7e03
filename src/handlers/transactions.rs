//! Transaction read endpoints.
//!
//! All routes need the `read` scope and only ever show transactions of the
//! caller's own merchant. A transaction owned by another merchant is reported
//! as not found.

use axum::{
    Extension, Json,
    extract::State,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{ApiPath, ApiQuery},
    middleware::auth::AuthContext,
    models::{
        app_key::Scope,
        transaction::{
            Transaction, TransactionListQuery, TransactionPage, TransactionResponse,
            TransactionStats, TransactionStatsQuery,
        },
    },
    state::AppState,
};

/// List transactions, newest first.
///
/// # Query Parameters
///
/// `status`, `payment_method`, `currency`, `date_from`, `date_to`, `search`
/// (reference or customer email), `amount_min`, `amount_max`, `page`,
/// `page_size` (max 100).
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<TransactionListQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    auth.require(Scope::Read)?;
    let page = state.ledger.list(auth.merchant()?, query).await?;
    Ok(Json(page))
}

/// Totals for a named `period` (today, week, month, quarter, year) or a
/// `date_from`/`date_to` range. Defaults to the last 30 days.
pub async fn transaction_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<TransactionStatsQuery>,
) -> Result<Json<TransactionStats>, AppError> {
    auth.require(Scope::Read)?;
    let stats = state.ledger.stats(auth.merchant()?, query).await?;
    Ok(Json(stats))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    auth.require(Scope::Read)?;
    let tx = state.ledger.find_by_id(id).await?;
    owned_by(tx, &auth).map(Json)
}

/// Look up by reference, which equals the payment session id.
pub async fn get_transaction_by_reference(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(reference): ApiPath<String>,
) -> Result<Json<TransactionResponse>, AppError> {
    auth.require(Scope::Read)?;
    let tx = state.ledger.find_by_reference(&reference).await?;
    owned_by(tx, &auth).map(Json)
}

fn owned_by(tx: Transaction, auth: &AuthContext) -> Result<TransactionResponse, AppError> {
    if tx.merchant_id != auth.merchant()? {
        return Err(AppError::NotFound("Transaction"));
    }
    Ok(tx.into())
}

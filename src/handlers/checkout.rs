//! Checkout endpoints.
//!
//! Two adapters feed the same [`CheckoutService`](crate::services::checkout::CheckoutService):
//! the partner API (`make-payment`, 5 minute sessions) and the internal hosted
//! checkout page (24 hour sessions). Customers then hit `process-payment`
//! with nothing but the session id.

use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{ApiJson, ApiPath},
    middleware::auth::{AuthContext, UsageReference},
    models::{
        app_key::Scope,
        money::format_cents,
        session::{
            CheckoutPageSessionRequest, EntryPoint, MakePaymentRequest, MakePaymentResponse,
            ProcessPaymentQuery, ProcessPaymentResponse, SessionResponse,
        },
    },
    services::{
        checkout::{ClientInfo, CreatedCheckout},
        session_manager::SessionOrigin,
    },
    state::AppState,
};

fn created_response(created: CreatedCheckout) -> impl IntoResponse {
    let session = created.session;
    let body = MakePaymentResponse {
        success: true,
        transaction_id: created.transaction.id,
        reference_id: session.reference_id.clone(),
        session_id: session.session_id,
        expires_at: session.expires_at,
        amount: format_cents(session.amount_cents),
        currency: session.currency,
        payment_url: created.payment_url,
        status: session.status,
        payment_method: session.payment_method,
        message: "Payment session created successfully",
    };

    (
        StatusCode::CREATED,
        Extension(UsageReference(session.reference_id)),
        Json(body),
    )
}

/// Create a payment session for the authenticated partner's merchant.
///
/// # Request Body
///
/// ```json
/// {
///   "amount": "100.00",
///   "currency": "USD",
///   "customer_email": "jane@example.com",
///   "customer_name": "Jane Doe",
///   "customer_phone": "+15550100",
///   "description": "Order #42",
///   "payment_method": "card"
/// }
/// ```
///
/// # Response
///
/// 201 Created with the session, its pending transaction and a
/// `payment_url` valid for 5 minutes.
///
/// # Security
///
/// Requires the `write` scope.
pub async fn make_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    client: ClientInfo,
    ApiJson(request): ApiJson<MakePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Scope::Write)?;

    let origin = SessionOrigin {
        merchant_id: auth.merchant()?,
        partner_id: Some(auth.partner_id),
        app_key_id: Some(auth.app_key_id),
        entry_point: EntryPoint::Api,
    };

    let created = state
        .checkout
        .create_session(origin, request, client)
        .await?;

    Ok(created_response(created))
}

/// Hosted checkout page adapter. Admin-token protected.
pub async fn create_checkout_page_session(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<CheckoutPageSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let merchant_id = request.merchant_id.ok_or_else(|| {
        AppError::validation("missing_fields", "Missing required fields: merchant_id")
    })?;
    state.partners.get_merchant(merchant_id).await?;

    let origin = SessionOrigin {
        merchant_id,
        partner_id: None,
        app_key_id: None,
        entry_point: EntryPoint::CheckoutPage,
    };

    let created = state
        .checkout
        .create_session(origin, request.payment, client)
        .await?;

    Ok(created_response(created))
}

/// Dispatch a session to its gateway.
///
/// Public: the session id is the only input. A declined payment answers
/// 200 with `success: false`; an unreachable gateway answers 502 and the
/// session stays pending.
pub async fn process_payment(
    State(state): State<AppState>,
    query: Result<Query<ProcessPaymentQuery>, QueryRejection>,
) -> Result<Json<ProcessPaymentResponse>, AppError> {
    let Query(query) = query
        .map_err(|_| AppError::validation("invalid_session_id", "session_id must be a UUID"))?;
    let session_id = query.session_id.ok_or_else(|| {
        AppError::validation("missing_fields", "Missing required fields: session_id")
    })?;

    let processed = state.checkout.process(session_id).await?;

    Ok(Json(ProcessPaymentResponse {
        success: processed.gateway.success,
        session_id: processed.session.session_id,
        reference_id: processed.session.reference_id,
        status: processed.session.status,
        payment_url: processed.session.payment_url,
        gateway_reference: processed.session.gateway_reference,
        error: processed.gateway.error,
    }))
}

/// Public session lookup by id. Expiry is reported, never stored.
pub async fn get_session(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.checkout.get_session(session_id).await?;
    Ok(Json(session.to_response(state.clock.now())))
}

/// Provider-side status of a session owned by the caller's merchant.
pub async fn gateway_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Scope::Read)?;

    let status = state
        .checkout
        .gateway_status(session_id, auth.merchant()?)
        .await?;

    Ok(Json(status))
}

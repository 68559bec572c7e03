//! HTTP router.
//!
//! Three route groups, each with its own guard:
//! - public: health, key verification, customer-facing checkout, and gateway
//!   webhooks (authenticated by their own signatures)
//! - partner API: `Authorization: Bearer` or `X-API-Key` credentials
//! - admin and internal: `X-Admin-Token`

use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{app_keys, auth, checkout, gateway_webhooks, health, partners, transactions},
    middleware::{admin::admin_middleware, auth::auth_middleware},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/auth/verify-key", post(auth::verify_key))
        .route(
            "/api/v1/checkout/process-payment",
            get(checkout::process_payment).post(checkout::process_payment),
        )
        .route(
            "/api/v1/checkout/sessions/{session_id}",
            get(checkout::get_session),
        )
        .route(
            "/api/v1/webhooks/transvoucher",
            post(gateway_webhooks::transvoucher_webhook),
        )
        .route(
            "/api/v1/webhooks/uniwire",
            post(gateway_webhooks::uniwire_webhook),
        );

    // Partner API (scopes are checked per handler)
    let partner_routes = Router::new()
        .route("/api/v1/auth/verify", post(auth::verify))
        .route(
            "/api/v1/checkout/make-payment",
            post(checkout::make_payment),
        )
        .route(
            "/api/v1/checkout/sessions/{session_id}/gateway-status",
            get(checkout::gateway_status),
        )
        .route("/api/v1/transactions", get(transactions::list_transactions))
        .route(
            "/api/v1/transactions/stats",
            get(transactions::transaction_stats),
        )
        .route(
            "/api/v1/transactions/reference/{reference}",
            get(transactions::get_transaction_by_reference),
        )
        .route(
            "/api/v1/transactions/{id}",
            get(transactions::get_transaction),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/merchants", post(partners::create_merchant))
        .route("/admin/merchants/{id}", get(partners::get_merchant))
        .route(
            "/admin/partners",
            get(partners::list_partners).post(partners::create_partner),
        )
        .route(
            "/admin/partners/{id}",
            get(partners::get_partner).patch(partners::update_partner),
        )
        .route(
            "/admin/partners/{id}/webhook-secret",
            post(partners::rotate_webhook_secret),
        )
        .route(
            "/admin/partners/{id}/app-keys",
            get(app_keys::list_partner_app_keys),
        )
        .route(
            "/admin/app-keys",
            get(app_keys::list_app_keys).post(app_keys::create_app_key),
        )
        .route(
            "/admin/app-keys/{id}",
            get(app_keys::get_app_key)
                .patch(app_keys::update_app_key)
                .delete(app_keys::revoke_app_key),
        )
        .route(
            "/admin/app-keys/{id}/suspend",
            post(app_keys::suspend_app_key),
        )
        .route(
            "/admin/app-keys/{id}/activate",
            post(app_keys::activate_app_key),
        )
        .route(
            "/admin/app-keys/{id}/regenerate-secret",
            post(app_keys::regenerate_secret),
        )
        .route("/admin/app-keys/{id}/usage-stats", get(app_keys::usage_stats))
        .route("/admin/app-keys/{id}/usage-logs", get(app_keys::usage_logs))
        .route(
            "/internal/checkout/sessions",
            post(checkout::create_checkout_page_session),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ]);

    Router::new()
        .merge(public_routes)
        .merge(partner_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

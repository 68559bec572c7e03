//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives request data (JSON body, path, query, auth context)
//! 2. Delegates to a service
//! 3. Returns a JSON response or an [`AppError`](crate::error::AppError)

/// Admin app key management
pub mod app_keys;
/// Credential verification
pub mod auth;
/// Payment sessions and processing
pub mod checkout;
/// Provider notifications
pub mod gateway_webhooks;
pub mod health;
/// Admin merchant and partner management
pub mod partners;
pub mod transactions;

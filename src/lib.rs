//! Merchant payment server.
//!
//! Partners authenticate with issued app keys, create checkout payment
//! sessions for their merchant, and are notified by signed webhook once the
//! card (TransVoucher) or crypto (Uniwire) gateway has decided.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, or an in-memory store for development
//! - **Authentication**: public key + secret, HMAC-SHA256 hashed with a server pepper
//! - **Format**: JSON requests/responses

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gateways;
pub mod handlers;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

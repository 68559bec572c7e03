//! HTTP middleware components.
//!
//! Both guards run as route layers and reject before the handler runs:
//! - `auth`: partner API keys, plus usage accounting after the handler
//! - `admin`: the shared admin token

pub mod admin;
pub mod auth;

//! Data models for database entities and API requests/responses.

pub mod app_key;
pub mod merchant;
pub mod money;
pub mod partner;
pub mod session;
pub mod transaction;
pub mod usage;
pub mod webhook;

//! Business logic services.
//!
//! Services contain the payment and key-management rules, separated from HTTP
//! handlers. They talk to storage only through the [`Store`](crate::store::Store)
//! trait and read time only from a [`Clock`](crate::clock::Clock).

pub mod app_key_registry;
pub mod checkout;
pub mod dispatcher;
pub mod partner_service;
pub mod session_manager;
pub mod transaction_ledger;
pub mod usage_accountant;
pub mod webhook_service;

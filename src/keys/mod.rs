//! Credential material: key pairs, secret hashing and webhook secrets.

pub mod material;

pub use material::{GeneratedKeyPair, KeyMaterial, UNMATCHABLE_HASH, generate_webhook_secret};

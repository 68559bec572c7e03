//! Application configuration management.
//!
//! `main` is the only place that reads the environment. The flat [`Config`] it
//! loads is projected into the small settings structs each component takes in
//! its constructor, so nothing below `main` touches ambient state.

use std::{
    net::{AddrParseError, IpAddr},
    time::Duration as StdDuration,
};

use chrono::Duration;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string, or `memory://`
///   for the in-memory store
/// - `ADMIN_TOKEN` (required): shared token for the `/admin` surface
/// - `KEY_PEPPER` (required): server-side secret mixed into key hashes
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PUBLIC_BASE_URL` (optional): base used when building payment URLs
/// - `SUPPORTED_CURRENCIES` (optional): comma separated, defaults to `USD,EUR,GBP,KES`
/// - `TRUSTED_PROXIES` (optional): comma separated proxy addresses whose
///   `X-Forwarded-For` / `X-Real-IP` headers are believed
/// - `TRANSVOUCHER_*`, `UNIWIRE_*`: gateway endpoints and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    pub admin_token: String,

    pub key_pepper: String,

    #[serde(default = "default_provision_attempts")]
    pub key_provision_attempts: u32,

    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    #[serde(default = "default_dispatch_ttl")]
    pub dispatch_session_ttl_secs: i64,

    #[serde(default = "default_checkout_page_ttl")]
    pub checkout_page_session_ttl_secs: i64,

    #[serde(default = "default_currencies")]
    pub supported_currencies: Vec<String>,

    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    #[serde(default = "default_transvoucher_url")]
    pub transvoucher_base_url: String,

    #[serde(default)]
    pub transvoucher_api_key: String,

    #[serde(default)]
    pub transvoucher_api_secret: String,

    #[serde(default = "default_uniwire_url")]
    pub uniwire_api_url: String,

    #[serde(default)]
    pub uniwire_api_key: String,

    #[serde(default)]
    pub uniwire_api_secret: String,

    #[serde(default)]
    pub uniwire_profile_id: String,

    #[serde(default = "default_uniwire_network")]
    pub uniwire_network: String,

    #[serde(default = "default_uniwire_invoice_base")]
    pub uniwire_invoice_url_base: String,
}

fn default_port() -> u16 {
    3000
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_provision_attempts() -> u32 {
    5
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_webhook_timeout() -> u64 {
    5
}

fn default_dispatch_ttl() -> i64 {
    5 * 60
}

fn default_checkout_page_ttl() -> i64 {
    24 * 60 * 60
}

fn default_currencies() -> Vec<String> {
    ["USD", "EUR", "GBP", "KES"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_transvoucher_url() -> String {
    "https://api.transvoucher.com".to_string()
}

fn default_uniwire_url() -> String {
    "https://api.uniwire.com".to_string()
}

fn default_uniwire_network() -> String {
    "ETH".to_string()
}

fn default_uniwire_invoice_base() -> String {
    "https://uniwire.com/invoice/".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// An optional `.env` file is loaded first.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot be
    /// parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>()
    }

    pub fn key_material(&self) -> KeyMaterialConfig {
        KeyMaterialConfig {
            pepper: self.key_pepper.as_bytes().to_vec(),
            max_provision_attempts: self.key_provision_attempts.max(1),
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            dispatch_ttl: Duration::seconds(self.dispatch_session_ttl_secs),
            checkout_page_ttl: Duration::seconds(self.checkout_page_session_ttl_secs),
            supported_currencies: self
                .supported_currencies
                .iter()
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
            public_base_url: self.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            timeout: StdDuration::from_secs(self.gateway_timeout_secs),
            transvoucher: TransVoucherSettings {
                base_url: self.transvoucher_base_url.trim_end_matches('/').to_string(),
                api_key: self.transvoucher_api_key.clone(),
                api_secret: self.transvoucher_api_secret.clone(),
            },
            uniwire: UniwireSettings {
                api_url: self.uniwire_api_url.trim_end_matches('/').to_string(),
                api_key: self.uniwire_api_key.clone(),
                api_secret: self.uniwire_api_secret.clone(),
                profile_id: self.uniwire_profile_id.clone(),
                network: self.uniwire_network.clone(),
                invoice_url_base: self.uniwire_invoice_url_base.clone(),
            },
        }
    }

    /// Parsed `TRUSTED_PROXIES`. Blank entries are skipped.
    pub fn trusted_proxy_addrs(&self) -> Result<Vec<IpAddr>, AddrParseError> {
        self.trusted_proxies
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect()
    }

    pub fn webhook_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.webhook_timeout_secs)
    }
}

/// Inputs to key generation and hashing.
#[derive(Debug, Clone)]
pub struct KeyMaterialConfig {
    /// Server-side secret keyed into every secret hash.
    pub pepper: Vec<u8>,

    /// How many public keys to try before giving up on a collision streak.
    pub max_provision_attempts: u32,
}

/// Lifetime and validation rules for payment sessions.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// TTL of sessions created through the external API.
    pub dispatch_ttl: Duration,

    /// TTL of sessions created for the hosted checkout page.
    pub checkout_page_ttl: Duration,

    /// Upper-case ISO codes accepted on session creation.
    pub supported_currencies: Vec<String>,

    pub public_base_url: String,
}

impl SessionPolicy {
    pub fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == currency)
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Upper bound on any single outbound gateway call.
    pub timeout: StdDuration,
    pub transvoucher: TransVoucherSettings,
    pub uniwire: UniwireSettings,
}

impl GatewaySettings {
    /// Credential values that must never appear in surfaced gateway messages.
    pub fn secrets(&self) -> Vec<String> {
        [
            &self.transvoucher.api_key,
            &self.transvoucher.api_secret,
            &self.uniwire.api_key,
            &self.uniwire.api_secret,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TransVoucherSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct UniwireSettings {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub profile_id: String,
    /// Settlement network requested on invoices, e.g. `ETH`.
    pub network: String,
    pub invoice_url_base: String,
}

//! Shared application state.

use std::{net::IpAddr, sync::Arc};

use crate::{
    clock::Clock,
    config::{KeyMaterialConfig, SessionPolicy},
    gateways::{CardGateway, CryptoGateway},
    keys::KeyMaterial,
    middleware::auth::ApiKeyAuthenticator,
    services::{
        app_key_registry::AppKeyRegistry, checkout::CheckoutService,
        dispatcher::GatewayDispatcher, partner_service::PartnerService,
        session_manager::PaymentSessionManager, transaction_ledger::TransactionLedger,
        usage_accountant::UsageAccountant, webhook_service::Notifier,
    },
    store::Store,
};

/// Everything the services are built from. Assembled by `main` or a test.
pub struct Dependencies {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub card_gateway: Arc<dyn CardGateway>,
    pub crypto_gateway: Arc<dyn CryptoGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub key_material: KeyMaterialConfig,
    pub session_policy: SessionPolicy,

    /// Credentials scrubbed from surfaced gateway messages.
    pub gateway_secrets: Vec<String>,

    pub admin_token: String,

    /// Peers whose forwarding headers are believed.
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub authenticator: Arc<ApiKeyAuthenticator>,
    pub app_keys: Arc<AppKeyRegistry>,
    pub partners: Arc<PartnerService>,
    pub usage: Arc<UsageAccountant>,
    pub ledger: Arc<TransactionLedger>,
    pub checkout: Arc<CheckoutService>,
    pub admin_token: Arc<str>,
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    pub fn new(deps: Dependencies) -> Self {
        let Dependencies {
            store,
            clock,
            card_gateway,
            crypto_gateway,
            notifier,
            key_material,
            session_policy,
            gateway_secrets,
            admin_token,
            trusted_proxies,
        } = deps;

        let ledger = Arc::new(TransactionLedger::new(store.clone(), clock.clone()));
        let checkout = CheckoutService::new(
            PaymentSessionManager::new(store.clone(), clock.clone(), session_policy),
            ledger.clone(),
            GatewayDispatcher::new(card_gateway, crypto_gateway, clock.clone(), gateway_secrets),
            notifier,
            store.clone(),
        );

        Self {
            authenticator: Arc::new(ApiKeyAuthenticator::new(
                store.clone(),
                KeyMaterial::new(&key_material),
                clock.clone(),
            )),
            app_keys: Arc::new(AppKeyRegistry::new(store.clone(), &key_material, clock.clone())),
            partners: Arc::new(PartnerService::new(store.clone(), clock.clone())),
            usage: Arc::new(UsageAccountant::new(store.clone(), clock.clone())),
            ledger,
            checkout: Arc::new(checkout),
            admin_token: admin_token.into(),
            trusted_proxies: trusted_proxies.into(),
            store,
            clock,
        }
    }
}

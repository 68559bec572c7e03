//! Merchant Payment Server - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open storage: PostgreSQL (running migrations) or `memory://`
//! 3. Build gateway clients and the webhook notifier
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::EnvFilter;

use merchant_payment_server::{
    clock::{Clock, SystemClock},
    config::Config,
    db,
    gateways::{
        CardGateway, CryptoGateway, MockBehavior, MockCardGateway, MockCryptoGateway,
        TransVoucherClient, UniwireClient,
    },
    routes,
    services::webhook_service::WebhookNotifier,
    state::{AppState, Dependencies},
    store::{MemoryStore, PgStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let in_memory = config.database_url.starts_with("memory://");
    let store: Arc<dyn Store> = if in_memory {
        tracing::warn!("Using in-memory store; data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = db::create_pool(&config.database_url).await?;
        tracing::info!("Database pool created");

        db::run_migrations(&pool).await?;
        tracing::info!("Database migrations complete");
        Arc::new(PgStore::new(pool))
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateways = config.gateway_settings();

    let card_gateway: Arc<dyn CardGateway> =
        if in_memory && gateways.transvoucher.api_key.is_empty() {
            tracing::warn!("No TransVoucher credentials; card payments use the mock gateway");
            Arc::new(MockCardGateway::new(MockBehavior::Accept))
        } else {
            Arc::new(TransVoucherClient::new(
                gateways.transvoucher.clone(),
                gateways.timeout,
            )?)
        };

    let crypto_gateway: Arc<dyn CryptoGateway> =
        if in_memory && gateways.uniwire.api_key.is_empty() {
            tracing::warn!("No Uniwire credentials; crypto payments use the mock gateway");
            Arc::new(MockCryptoGateway::new(MockBehavior::Accept))
        } else {
            Arc::new(UniwireClient::new(gateways.uniwire.clone(), gateways.timeout)?)
        };

    let notifier = Arc::new(WebhookNotifier::new(config.webhook_timeout(), clock.clone())?);

    let state = AppState::new(Dependencies {
        store,
        clock,
        card_gateway,
        crypto_gateway,
        notifier,
        key_material: config.key_material(),
        session_policy: config.session_policy(),
        gateway_secrets: gateways.secrets(),
        admin_token: config.admin_token.clone(),
        trusted_proxies: config.trusted_proxy_addrs()?,
    });

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Connect info feeds the client address used by key IP allowlists.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

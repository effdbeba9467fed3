mod address;
mod chain;
mod config;
mod entities;
mod error;
mod http;
mod issuer;
mod service;
mod state;
mod store;
mod verification;

use std::sync::Arc;
use std::time::Duration;

use crate::chain::ChainClient;
use crate::config::ApiConfig;
use crate::issuer::{SigningIdentity, TransactionIssuer};
use crate::service::FaucetService;
use crate::state::AppState;
use crate::store::CooldownStore;
use crate::verification::CaptchaVerifier;
use anyhow::{Context, Result, bail};
use axum::Router;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let chain_client = ChainClient::new(&config.chain.rpc_url, config.chain.request_timeout())
        .context("Failed to initialize chain RPC client")?;

    // Fail startup outright when the endpoint is unreachable or serves a
    // different network; a faucet pointed at the wrong chain id would sign
    // transactions nobody can replay here but that still leak the key's
    // nonce sequence.
    let reported_chain_id = chain_client
        .chain_id()
        .await
        .context("Chain endpoint unreachable at startup")?;
    if reported_chain_id != config.chain.chain_id {
        bail!(
            "Chain id mismatch: endpoint reports {reported_chain_id}, configured {}",
            config.chain.chain_id
        );
    }

    let identity = SigningIdentity::from_hex(&config.faucet.private_key)
        .context("Failed to load faucet signing key")?;
    info!("Faucet address: {}", identity.address());

    let issuer = TransactionIssuer::new(
        chain_client,
        identity,
        config.chain.chain_id,
        config.faucet.dispense_amount_wei,
        config.faucet.gas_limit,
    );
    let verifier = CaptchaVerifier::new(
        config.verification.siteverify_url.clone(),
        config.verification.secret.clone(),
        config.verification.request_timeout(),
    )
    .context("Failed to initialize verification client")?;

    let store = CooldownStore::new(database.clone());
    let service = Arc::new(FaucetService::new(
        verifier,
        store,
        issuer,
        config.faucet.cooldown_secs,
    ));
    let app_state = AppState::new(database, service);

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Faucet API listening on {local_addr}");

    let router: Router = http::router(app_state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.database.max_connections >= config.database.min_connections.unwrap_or(1),
        "Max connections must be >= min connections"
    );
    assert!(
        config.database.max_connections <= 128,
        "Connection pool oversized"
    );

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

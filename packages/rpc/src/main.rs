mod auth;
mod config;
mod db;
mod erc20;
mod eth;
mod keystore;
mod metrics;
mod registration;
mod rpc;
mod server;

use std::sync::Arc;

use canton_rs::canton::{CantonClient, CantonClientConfig, TokenProvider};
use canton_rs::evm::EvmClient;
use tokio::sync::Semaphore;

use config::Config;
use erc20::Facade;
use keystore::Keystore;
use metrics::Metrics;
use server::AppState;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting Wayfinder RPC facade");

    let config = Config::load()?;
    tracing::info!(
        chain_id = config.ethereum.chain_id,
        token = %config.token.symbol,
        port = config.server.port,
        "Configuration loaded"
    );

    let db = db::create_pool(&config.database.url()).await?;
    tracing::info!("Database connected");

    let auth = match &config.canton.auth {
        Some(auth_config) => Some(TokenProvider::new(auth_config.to_auth_config())?),
        None => None,
    };
    let canton = Arc::new(CantonClient::new(
        CantonClientConfig {
            rpc_url: config.canton.rpc_url.clone(),
            relayer_party: config.canton.relayer_party.clone(),
        },
        auth,
    )?);

    let facade = Arc::new(Facade {
        db,
        canton,
        templates: config.templates(),
        keystore: Keystore::new(&config.token.keystore_master_key)?,
        token_name: config.token.name.clone(),
        token_symbol: config.token.symbol.clone(),
        token_decimals: config.token.decimals,
        token_contract: config.ethereum.token_contract.to_lowercase(),
        balance_ttl_seconds: config.token.balance_ttl_seconds as i64,
        chain_id: config.ethereum.chain_id,
    });

    let state = AppState {
        facade,
        evm: Arc::new(EvmClient::new(
            &config.ethereum.rpc_url,
            config.ethereum.chain_id,
        )?),
        metrics: Arc::new(Metrics::new()),
        submissions: Arc::new(Semaphore::new(config.server.submission_queue_limit)),
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server.port));
    server::serve(addr, state, config.server.rate_limit_per_hour).await
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wayfinder_rpc=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

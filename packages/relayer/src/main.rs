mod api;
mod cleanup;
mod config;
mod db;
mod metrics;
mod pipelines;
mod reconciler;
mod retry;

use std::sync::Arc;
use std::time::Instant;

use canton_rs::canton::{CantonClient, CantonClientConfig, TokenProvider};
use canton_rs::evm::{EvmClient, EvmSigner};

use config::Config;
use pipelines::PipelineManager;
use reconciler::Reconciler;

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

    tracing::info!("Starting Wayfinder bridge relayer");

    let config = Config::load()?;
    tracing::info!(
        evm_chain_id = config.ethereum.chain_id,
        canton_domain = %config.canton.domain_id,
        token = %config.bridge.token_symbol,
        "Configuration loaded"
    );

    let db = db::create_pool(&config.database.url()).await?;
    tracing::info!("Database connected");

    db::run_migrations(&db).await?;
    tracing::info!("Database migrations complete");

    let canton = Arc::new(build_canton_client(&config)?);

    // Utility modes run to completion instead of starting the pipelines
    match std::env::args().nth(1).as_deref() {
        Some("cleanup-withdrawals") => {
            return cleanup::run_cleanup(&config, canton).await;
        }
        Some("reconcile-full") => {
            let reconciler = Reconciler::new(&config, db, canton);
            return reconciler.full_reconcile().await;
        }
        Some(other) => {
            return Err(eyre::eyre!("unknown mode: {}", other));
        }
        None => {}
    }

    let signer = Arc::new(EvmSigner::new(
        &config.ethereum.rpc_url,
        config.ethereum.chain_id,
        &config.ethereum.relayer_private_key,
        config.ethereum.gas_limit,
        config.ethereum.max_gas_price,
    )?);

    // Shutdown channel fed by SIGINT/SIGTERM
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    let manager = PipelineManager::new(&config, db.clone(), canton.clone(), signer)?;
    tracing::info!("Pipelines initialized, starting processing");

    metrics::UP.set(1.0);

    // Status API
    let api_state = api::ApiState {
        db,
        evm: Arc::new(EvmClient::new(&config.ethereum.rpc_url, config.ethereum.chain_id)?),
        canton,
        started_at: Instant::now(),
    };
    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], 9090));
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_addr, api_state).await {
            tracing::error!(error = %e, "Status API error");
        }
    });

    let result = manager.run(shutdown_rx).await;

    metrics::UP.set(0.0);
    tracing::info!("Wayfinder bridge relayer stopped");
    result
}

fn build_canton_client(config: &Config) -> eyre::Result<CantonClient> {
    let auth = match &config.canton.auth {
        Some(auth_config) => Some(TokenProvider::new(auth_config.to_auth_config())?),
        None => None,
    };

    CantonClient::new(
        CantonClientConfig {
            rpc_url: config.canton.rpc_url.clone(),
            relayer_party: config.canton.relayer_party.clone(),
        },
        auth,
    )
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wayfinder_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

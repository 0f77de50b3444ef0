use eyre::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use canton_rs::canton::CantonClient;
use canton_rs::evm::EvmSigner;

use crate::config::Config;
use crate::reconciler::Reconciler;

pub mod deposit;
pub mod withdrawal;

pub use deposit::{DepositProcessor, DepositWatcher};
pub use withdrawal::{WithdrawalPoller, WithdrawalProcessor};

/// Owns the long-lived pipeline workers
pub struct PipelineManager {
    deposit_watcher: DepositWatcher,
    deposit_processor: DepositProcessor,
    withdrawal_poller: WithdrawalPoller,
    withdrawal_processor: WithdrawalProcessor,
    reconciler: Reconciler,
}

impl PipelineManager {
    pub fn new(
        config: &Config,
        db: PgPool,
        canton: Arc<CantonClient>,
        signer: Arc<EvmSigner>,
    ) -> Result<Self> {
        Ok(Self {
            deposit_watcher: DepositWatcher::new(config, db.clone())?,
            deposit_processor: DepositProcessor::new(config, db.clone(), canton.clone())?,
            withdrawal_poller: WithdrawalPoller::new(config, db.clone(), canton.clone()),
            withdrawal_processor: WithdrawalProcessor::new(config, db.clone(), canton.clone(), signer)?,
            reconciler: Reconciler::new(config, db, canton),
        })
    }

    /// Run all workers concurrently.
    /// Returns when any worker fails or the shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        join_set.spawn(self.deposit_watcher.run());
        join_set.spawn(self.deposit_processor.run());
        join_set.spawn(self.withdrawal_poller.run());
        join_set.spawn(self.withdrawal_processor.run());
        join_set.spawn(self.reconciler.run());

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping pipelines");
                // Let in-flight submissions settle; deterministic command ids
                // make any cut-off retry safe on restart.
                join_set.shutdown().await;
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                let result = match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A pipeline worker exited unexpectedly without error");
                        Err(eyre::eyre!("pipeline worker exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A pipeline worker stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A pipeline task panicked: {:?}", e);
                        Err(eyre::eyre!("pipeline task panicked: {}", e))
                    }
                    None => {
                        error!("All pipeline tasks exited unexpectedly");
                        Err(eyre::eyre!("all pipeline tasks exited unexpectedly"))
                    }
                };
                // Flush stderr so the error above is visible in block-buffered
                // environments (Docker, systemd pipes) before the process exits.
                use std::io::Write;
                let _ = std::io::stderr().flush();
                result
            }
        }
    }
}

//! Operator utility: reclaim stale pending withdrawals
//!
//! Enumerates every Pending `WithdrawalEvent` on the ledger and completes it
//! with a `cleanup-stale-...` marker instead of a real EVM transaction hash.
//! Run after a permanent EVM-side failure, once the operator has decided the
//! withdrawal will never be paid out on chain.

use eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use canton_rs::canton::{templates, CantonClient, Command, WithdrawalEvent, WithdrawalEventStatus};
use canton_rs::hash::cleanup_marker;
use canton_rs::{withdrawal_complete_command_id, BridgeTemplates};

use crate::config::Config;

pub async fn run_cleanup(config: &Config, canton: Arc<CantonClient>) -> Result<()> {
    let bridge_templates: BridgeTemplates = config.templates();

    let events = canton
        .active_contracts(&bridge_templates.withdrawal_event(), None)
        .await?;

    let mut completed = 0usize;
    let mut skipped = 0usize;

    for event in &events {
        let withdrawal = match WithdrawalEvent::from_event(event) {
            Ok(w) => w,
            Err(e) => {
                warn!(contract_id = %event.contract_id, error = %e, "Undecodable WithdrawalEvent, skipping");
                skipped += 1;
                continue;
            }
        };

        if withdrawal.status != WithdrawalEventStatus::Pending {
            continue;
        }

        let marker = cleanup_marker(&withdrawal.contract_id);
        let command = Command::exercise(
            &bridge_templates.withdrawal_event(),
            withdrawal.contract_id.clone(),
            "CompleteWithdrawal",
            templates::complete_withdrawal_args(&marker),
        );
        let command_id = withdrawal_complete_command_id(&withdrawal.contract_id);

        match canton.submit_and_wait(&[command], &command_id, &[], None).await {
            Ok(_) => {
                info!(
                    contract_id = %withdrawal.contract_id,
                    amount = %withdrawal.amount,
                    marker = %marker,
                    "Stale withdrawal completed"
                );
                completed += 1;
            }
            Err(e) if e.is_duplicate_command() => {
                info!(contract_id = %withdrawal.contract_id, "Already completed");
            }
            Err(e) => {
                warn!(contract_id = %withdrawal.contract_id, error = %e, "Failed to complete");
                skipped += 1;
            }
        }
    }

    info!(completed, skipped, total = events.len(), "Cleanup finished");
    Ok(())
}

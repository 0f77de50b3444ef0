//! Withdrawal pipeline: Canton burn -> EVM unlock
//!
//! The poller scans the ledger for Pending `WithdrawalEvent` contracts and
//! journals them under their contract id. The processor drives each row
//! through
//!
//! ```text
//! detected --lookup-user--> ready --submit-evm-unlock--> submitted
//! submitted --receipt-ok--> confirmed --complete-on-canton--> closed
//! submitted --receipt-bad--> failed
//! ```
//!
//! Each withdrawal owns its own contract id and nonce; withdrawals never
//! serialise on each other. A reverted receipt is terminal: the Canton event
//! stays Pending for the operator to clean up or replay manually.

use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use canton_rs::canton::{
    templates, CantonClient, Command, WithdrawalEvent, WithdrawalEventStatus,
};
use canton_rs::evm::{EvmSigner, SubmitOutcome};
use canton_rs::{decimal_to_wei, withdrawal_complete_command_id, BridgeTemplates, TransferStatus};

use crate::config::Config;
use crate::db::{self, NewWithdrawal, Transfer};
use crate::metrics;
use crate::retry::{classify_evm_error, ErrorClass, RetryConfig};

/// How long a single tick waits on a fresh unlock receipt before handing the
/// transfer back to the next cycle
const RECEIPT_WAIT: Duration = Duration::from_secs(30);

// ============================================================================
// Poller
// ============================================================================

/// Polls Canton for Pending WithdrawalEvent contracts
pub struct WithdrawalPoller {
    db: PgPool,
    canton: Arc<CantonClient>,
    templates: BridgeTemplates,
    token_symbol: String,
    poll_interval: Duration,
}

impl WithdrawalPoller {
    pub fn new(config: &Config, db: PgPool, canton: Arc<CantonClient>) -> Self {
        Self {
            db,
            canton,
            templates: config.templates(),
            token_symbol: config.bridge.token_symbol.clone(),
            poll_interval: Duration::from_millis(config.canton.polling_interval_ms),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Withdrawal poller started");

        loop {
            if let Err(e) = self.tick().await {
                metrics::ERRORS
                    .with_label_values(&["withdrawal_poller", "transient"])
                    .inc();
                warn!(error = %e, "Withdrawal poller tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn tick(&self) -> Result<()> {
        let offset = self.canton.ledger_end().await?;
        let events = self
            .canton
            .active_contracts(&self.templates.withdrawal_event(), Some(offset))
            .await?;

        for event in &events {
            let withdrawal = match WithdrawalEvent::from_event(event) {
                Ok(w) => w,
                Err(e) => {
                    error!(
                        contract_id = %event.contract_id,
                        error = %e,
                        "Failed to decode WithdrawalEvent"
                    );
                    continue;
                }
            };

            if withdrawal.status != WithdrawalEventStatus::Pending {
                continue;
            }
            if withdrawal.token_symbol != self.token_symbol {
                debug!(symbol = %withdrawal.token_symbol, "Skipping burn of unmapped token");
                continue;
            }
            if withdrawal.amount <= bigdecimal::BigDecimal::from(0) {
                warn!(contract_id = %withdrawal.contract_id, "Skipping zero-amount burn event");
                continue;
            }

            let new_withdrawal = NewWithdrawal {
                canton_contract_id: withdrawal.contract_id.clone(),
                token_symbol: withdrawal.token_symbol.clone(),
                amount: withdrawal.amount.to_string(),
                evm_address: withdrawal.evm_destination.clone(),
                fingerprint: withdrawal.fingerprint.to_hex(),
            };

            let inserted =
                db::insert_withdrawal_detected(&self.db, &new_withdrawal, offset).await?;
            if inserted {
                metrics::WITHDRAWALS_DETECTED
                    .with_label_values(&[self.token_symbol.as_str()])
                    .inc();
                info!(
                    contract_id = %withdrawal.contract_id,
                    amount = %withdrawal.amount,
                    destination = %withdrawal.evm_destination,
                    "New withdrawal detected"
                );
            }
        }

        db::advance_cursor(&self.db, db::CURSOR_CANTON_BURNS, offset).await?;
        metrics::CURSOR_POSITION
            .with_label_values(&["canton_burns"])
            .set(offset as f64);
        metrics::LAST_SUCCESSFUL_POLL
            .with_label_values(&["withdrawal_poller"])
            .set(Utc::now().timestamp() as f64);

        Ok(())
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Drives journalled withdrawals to the EVM unlock and Canton completion
pub struct WithdrawalProcessor {
    db: PgPool,
    canton: Arc<CantonClient>,
    signer: Arc<EvmSigner>,
    templates: BridgeTemplates,
    bridge_address: Address,
    token_address: Address,
    token_decimals: u8,
    min_amount: BigDecimal,
    max_amount: BigDecimal,
    processing_interval: Duration,
    batch_size: i64,
    lease_seconds: i64,
    max_retries: i32,
    retry: RetryConfig,
}

impl WithdrawalProcessor {
    pub fn new(
        config: &Config,
        db: PgPool,
        canton: Arc<CantonClient>,
        signer: Arc<EvmSigner>,
    ) -> Result<Self> {
        Ok(Self {
            db,
            canton,
            signer,
            templates: config.templates(),
            bridge_address: Address::from_str(&config.ethereum.bridge_contract)
                .wrap_err("Invalid bridge contract address")?,
            token_address: Address::from_str(&config.ethereum.token_contract)
                .wrap_err("Invalid token contract address")?,
            token_decimals: config.bridge.token_decimals,
            min_amount: config
                .bridge
                .min_transfer_amount
                .parse()
                .wrap_err("Invalid min_transfer_amount")?,
            max_amount: config
                .bridge
                .max_transfer_amount
                .parse()
                .wrap_err("Invalid max_transfer_amount")?,
            processing_interval: Duration::from_millis(config.bridge.processing_interval_ms),
            batch_size: config.bridge.batch_size as i64,
            lease_seconds: config.bridge.lease_seconds as i64,
            max_retries: config.bridge.max_retries as i32,
            retry: RetryConfig::new(
                config.bridge.max_retries,
                Duration::from_millis(config.bridge.retry_delay_ms),
            ),
        })
    }

    pub async fn run(self) -> Result<()> {
        info!("Withdrawal processor started");

        loop {
            match db::claim_transfers(
                &self.db,
                "withdrawal",
                &["detected", "ready", "submitted", "confirmed"],
                self.max_retries,
                self.lease_seconds,
                self.batch_size,
            )
            .await
            {
                Ok(transfers) => {
                    for transfer in transfers {
                        if let Err(e) = self.process(&transfer).await {
                            error!(
                                transfer_id = transfer.id,
                                error = %e,
                                "Failed to process withdrawal"
                            );
                        }
                    }
                    metrics::LAST_SUCCESSFUL_POLL
                        .with_label_values(&["withdrawal_processor"])
                        .set(Utc::now().timestamp() as f64);
                }
                Err(e) => {
                    metrics::ERRORS
                        .with_label_values(&["withdrawal_processor", "transient"])
                        .inc();
                    warn!(error = %e, "Failed to claim withdrawals");
                }
            }

            tokio::time::sleep(self.processing_interval).await;
        }
    }

    async fn process(&self, transfer: &Transfer) -> Result<()> {
        let status = TransferStatus::parse(&transfer.status)?;
        match status {
            TransferStatus::Detected => self.lookup_user_and_submit(transfer).await,
            TransferStatus::Ready => self.submit_unlock(transfer).await,
            TransferStatus::Submitted => self.check_receipt(transfer).await,
            TransferStatus::Confirmed => {
                let tx_hash = transfer
                    .evm_tx_hash
                    .clone()
                    .ok_or_else(|| eyre!("Confirmed withdrawal {} has no tx hash", transfer.id))?;
                self.complete_on_canton(transfer, &tx_hash).await
            }
            other => {
                warn!(transfer_id = transfer.id, status = %other, "Unexpected withdrawal status claimed");
                db::release_lease(&self.db, transfer.id).await
            }
        }
    }

    async fn lookup_user_and_submit(&self, transfer: &Transfer) -> Result<()> {
        let amount: BigDecimal = transfer
            .amount
            .parse()
            .map_err(|_| eyre!("Journalled amount is not a decimal: {}", transfer.amount))?;

        if amount < self.min_amount || amount > self.max_amount {
            db::update_transfer_failed(
                &self.db,
                transfer.id,
                &format!(
                    "amount {} outside bounds [{}, {}]",
                    amount, self.min_amount, self.max_amount
                ),
            )
            .await?;
            metrics::TRANSFERS_FAILED
                .with_label_values(&["withdrawal"])
                .inc();
            return Ok(());
        }

        // The burn carries its own destination; the user row just has to
        // exist so the audit trail lines up. Registration may lag a burn
        // observed right after a deposit, so absence is transient.
        let user = db::get_user_by_fingerprint(&self.db, &transfer.fingerprint).await?;
        if user.is_none() {
            let backoff = self.retry.backoff_for_attempt(transfer.attempts as u32);
            if transfer.attempts + 1 >= self.max_retries {
                metrics::TRANSFERS_FAILED
                    .with_label_values(&["withdrawal"])
                    .inc();
                return db::update_transfer_failed(
                    &self.db,
                    transfer.id,
                    &format!("no registered user for fingerprint {}", transfer.fingerprint),
                )
                .await;
            }
            return db::record_transfer_retry(
                &self.db,
                transfer.id,
                "detected",
                "user not registered yet",
                backoff.as_secs_f64(),
            )
            .await;
        }

        if !db::update_transfer_status(&self.db, transfer.id, "detected", "ready").await? {
            return Ok(());
        }

        self.submit_unlock(transfer).await
    }

    async fn submit_unlock(&self, transfer: &Transfer) -> Result<()> {
        let amount: BigDecimal = transfer
            .amount
            .parse()
            .map_err(|_| eyre!("Journalled amount is not a decimal: {}", transfer.amount))?;
        let wei = decimal_to_wei(&amount, self.token_decimals)?;

        let destination = transfer
            .evm_address
            .as_deref()
            .ok_or_else(|| eyre!("Withdrawal {} has no destination", transfer.id))?;
        let to = Address::from_str(destination)
            .map_err(|_| eyre!("Invalid destination address: {}", destination))?;

        let contract_id = transfer
            .canton_contract_id
            .as_deref()
            .ok_or_else(|| eyre!("Withdrawal {} has no contract id", transfer.id))?;

        debug!(
            transfer_id = transfer.id,
            discriminator = %withdrawal_complete_command_id(contract_id),
            "Submitting unlock"
        );

        let outcome = match self
            .signer
            .submit_unlock(self.bridge_address, self.token_address, to, wei)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::UNLOCKS_SUBMITTED.with_label_values(&["error"]).inc();
                return self.handle_evm_error(transfer, "ready", e).await;
            }
        };

        let tx_hash = match outcome {
            SubmitOutcome::Deferred { gas_price, cap } => {
                info!(
                    transfer_id = transfer.id,
                    gas_price, cap, "Unlock deferred, gas price above cap"
                );
                metrics::UNLOCKS_SUBMITTED.with_label_values(&["deferred"]).inc();
                return db::release_lease(&self.db, transfer.id).await;
            }
            SubmitOutcome::Submitted { tx_hash, nonce } => {
                info!(
                    transfer_id = transfer.id,
                    tx_hash = %tx_hash,
                    nonce,
                    "Unlock submitted"
                );
                metrics::UNLOCKS_SUBMITTED.with_label_values(&["ok"]).inc();
                tx_hash
            }
        };

        let tx_hash_hex = format!("{:?}", tx_hash);
        if !db::update_withdrawal_submitted(&self.db, transfer.id, &tx_hash_hex).await? {
            warn!(transfer_id = transfer.id, "Withdrawal advanced elsewhere during submit");
            return Ok(());
        }

        // Watch the receipt briefly; unresolved receipts are re-observed on
        // the next claim of the submitted row.
        match self.signer.wait_for_receipt(tx_hash, RECEIPT_WAIT).await? {
            Some(receipt) => {
                self.settle_receipt(transfer, &tx_hash_hex, receipt.status())
                    .await
            }
            None => {
                debug!(transfer_id = transfer.id, "Receipt not yet available");
                db::release_lease(&self.db, transfer.id).await
            }
        }
    }

    async fn check_receipt(&self, transfer: &Transfer) -> Result<()> {
        let tx_hash_hex = transfer
            .evm_tx_hash
            .as_deref()
            .ok_or_else(|| eyre!("Submitted withdrawal {} has no tx hash", transfer.id))?;
        let tx_hash = tx_hash_hex
            .parse()
            .map_err(|_| eyre!("Invalid journalled tx hash: {}", tx_hash_hex))?;

        match self.signer.wait_for_receipt(tx_hash, Duration::ZERO).await? {
            Some(receipt) => {
                self.settle_receipt(transfer, tx_hash_hex, receipt.status())
                    .await
            }
            None => db::release_lease(&self.db, transfer.id).await,
        }
    }

    async fn settle_receipt(
        &self,
        transfer: &Transfer,
        tx_hash_hex: &str,
        ok: bool,
    ) -> Result<()> {
        if !ok {
            // A reverted unlock is fatal for this withdrawal; the Canton
            // event stays Pending for the operator.
            metrics::TRANSFERS_FAILED
                .with_label_values(&["withdrawal"])
                .inc();
            error!(
                transfer_id = transfer.id,
                tx_hash = %tx_hash_hex,
                "Unlock transaction reverted"
            );
            return db::update_transfer_failed(
                &self.db,
                transfer.id,
                &format!("unlock reverted: {}", tx_hash_hex),
            )
            .await;
        }

        if !db::update_transfer_status(&self.db, transfer.id, "submitted", "confirmed").await? {
            return Ok(());
        }

        self.complete_on_canton(transfer, tx_hash_hex).await
    }

    /// Close the loop: archive the WithdrawalEvent with the mined tx hash
    async fn complete_on_canton(&self, transfer: &Transfer, tx_hash: &str) -> Result<()> {
        let contract_id = transfer
            .canton_contract_id
            .as_deref()
            .ok_or_else(|| eyre!("Withdrawal {} has no contract id", transfer.id))?;

        let command = Command::exercise(
            &self.templates.withdrawal_event(),
            contract_id,
            "CompleteWithdrawal",
            templates::complete_withdrawal_args(tx_hash),
        );
        let command_id = withdrawal_complete_command_id(contract_id);

        match self
            .canton
            .submit_and_wait(&[command], &command_id, &[], None)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_duplicate_command() => {
                debug!(transfer_id = transfer.id, "Completion deduplicated on Canton");
            }
            Err(e) if e.is_transient() => {
                // Status stays confirmed; the loop retries the completion
                metrics::ERRORS
                    .with_label_values(&["withdrawal_processor", "transient"])
                    .inc();
                let backoff = self.retry.backoff_for_attempt(transfer.attempts as u32);
                warn!(
                    transfer_id = transfer.id,
                    error = %e,
                    "Completion failed transiently, will retry"
                );
                return db::record_transfer_retry(
                    &self.db,
                    transfer.id,
                    "confirmed",
                    &e.to_string(),
                    backoff.as_secs_f64(),
                )
                .await;
            }
            Err(e) => {
                metrics::TRANSFERS_FAILED
                    .with_label_values(&["withdrawal"])
                    .inc();
                error!(transfer_id = transfer.id, error = %e, "Completion rejected by Canton");
                return db::update_transfer_failed(&self.db, transfer.id, &e.to_string()).await;
            }
        }

        db::update_transfer_status(&self.db, transfer.id, "confirmed", "closed").await?;
        metrics::TRANSFERS_CLOSED
            .with_label_values(&["withdrawal"])
            .inc();
        let elapsed = (Utc::now() - transfer.created_at).num_milliseconds() as f64 / 1000.0;
        metrics::PROCESSING_LATENCY
            .with_label_values(&["withdrawal"])
            .observe(elapsed.max(0.0));

        info!(
            transfer_id = transfer.id,
            contract_id = %contract_id,
            tx_hash = %tx_hash,
            "Withdrawal completed and closed"
        );
        Ok(())
    }

    async fn handle_evm_error(
        &self,
        transfer: &Transfer,
        rewind_status: &str,
        error: eyre::Report,
    ) -> Result<()> {
        let class = classify_evm_error(&error.to_string());

        match class {
            ErrorClass::Permanent => {
                metrics::TRANSFERS_FAILED
                    .with_label_values(&["withdrawal"])
                    .inc();
                error!(transfer_id = transfer.id, error = %error, "Withdrawal failed permanently");
                db::update_transfer_failed(&self.db, transfer.id, &error.to_string()).await
            }
            _ => {
                if transfer.attempts + 1 >= self.max_retries {
                    metrics::TRANSFERS_FAILED
                        .with_label_values(&["withdrawal"])
                        .inc();
                    error!(
                        transfer_id = transfer.id,
                        attempts = transfer.attempts + 1,
                        error = %error,
                        "Withdrawal exhausted retries"
                    );
                    return db::update_transfer_failed(&self.db, transfer.id, &error.to_string())
                        .await;
                }
                let backoff = self.retry.backoff_for_attempt(transfer.attempts as u32);
                warn!(
                    transfer_id = transfer.id,
                    attempt = transfer.attempts + 1,
                    error = %error,
                    "Withdrawal attempt failed, will retry"
                );
                db::record_transfer_retry(
                    &self.db,
                    transfer.id,
                    rewind_status,
                    &error.to_string(),
                    backoff.as_secs_f64(),
                )
                .await
            }
        }
    }
}

//! Deposit pipeline: EVM lock -> Canton mint
//!
//! Two workers. The watcher pulls confirmed Deposit logs in bounded windows
//! and journals them (insert + cursor advance in one transaction). The
//! processor drives each journalled row through the state machine
//!
//! ```text
//! detected --ensure-mapping--> mapped --submit-mint--> submitted
//! submitted --mint-tx-committed--> confirmed --record-audit--> closed
//! ```
//!
//! The mint command id is derived from the deposit's event coordinates, so a
//! crash between Canton accepting the command and the journal write is healed
//! by resubmission: Canton answers Duplicate and the processor recovers the
//! holding CID from the active contract set.

use alloy::primitives::{Address, U256};
use alloy::rpc::types::{Filter, Log};
use bigdecimal::BigDecimal;
use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use canton_rs::canton::{
    templates, CantonClient, CantonError, Cip56Holding, Command, FingerprintMapping,
};
use canton_rs::evm::{deposit_event_signature, EvmClient};
use canton_rs::{
    deposit_mint_command_id, wei_to_decimal, BridgeTemplates, Fingerprint, TransferStatus,
};

use crate::config::Config;
use crate::db::{self, NewAuditEvent, NewDeposit, Transfer};
use crate::metrics;
use crate::retry::{classify_canton_error, ErrorClass, RetryConfig};

/// Largest block window pulled per watcher tick
const MAX_BLOCK_WINDOW: u64 = 1000;

// ============================================================================
// Watcher
// ============================================================================

/// Watches the bridge contract for confirmed Deposit events
pub struct DepositWatcher {
    db: PgPool,
    evm: EvmClient,
    bridge_address: Address,
    token_address: Address,
    token_symbol: String,
    token_decimals: u8,
    confirmation_blocks: u64,
    start_block: u64,
    poll_interval: Duration,
}

impl DepositWatcher {
    pub fn new(config: &Config, db: PgPool) -> Result<Self> {
        let evm = EvmClient::new(&config.ethereum.rpc_url, config.ethereum.chain_id)?;
        let bridge_address = Address::from_str(&config.ethereum.bridge_contract)
            .wrap_err("Invalid bridge contract address")?;
        let token_address = Address::from_str(&config.ethereum.token_contract)
            .wrap_err("Invalid token contract address")?;

        Ok(Self {
            db,
            evm,
            bridge_address,
            token_address,
            token_symbol: config.bridge.token_symbol.clone(),
            token_decimals: config.bridge.token_decimals,
            confirmation_blocks: config.ethereum.confirmation_blocks,
            start_block: config.ethereum.start_block,
            poll_interval: Duration::from_millis(config.ethereum.polling_interval_ms),
        })
    }

    pub async fn run(self) -> Result<()> {
        info!(
            bridge = %self.bridge_address,
            confirmations = self.confirmation_blocks,
            "Deposit watcher started"
        );

        loop {
            if let Err(e) = self.tick().await {
                metrics::ERRORS
                    .with_label_values(&["deposit_watcher", "transient"])
                    .inc();
                warn!(error = %e, "Deposit watcher tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn tick(&self) -> Result<()> {
        let last = match db::get_cursor(&self.db, db::CURSOR_EVM_DEPOSITS).await? {
            Some(position) => position as u64,
            None => self.start_block.saturating_sub(1),
        };

        let confirmed = self.evm.confirmed_block(self.confirmation_blocks).await?;
        if confirmed <= last {
            return Ok(());
        }

        let from_block = last + 1;
        let to_block = confirmed.min(last + MAX_BLOCK_WINDOW);

        debug!(from_block, to_block, "Scanning for deposit events");

        let filter = Filter::new()
            .address(self.bridge_address)
            .event_signature(deposit_event_signature())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.evm.get_logs(&filter).await?;

        for log in &logs {
            match parse_deposit_log(log, self.token_address, &self.token_symbol, self.token_decimals)
            {
                Ok(Some(deposit)) => {
                    let block = deposit.evm_block_number;
                    let inserted =
                        db::insert_deposit_detected(&self.db, &deposit, block).await?;
                    if inserted {
                        metrics::DEPOSITS_DETECTED
                            .with_label_values(&[self.token_symbol.as_str()])
                            .inc();
                        info!(
                            tx_hash = %deposit.evm_tx_hash,
                            log_index = deposit.evm_log_index,
                            fingerprint = %deposit.fingerprint,
                            amount = %deposit.amount,
                            "New deposit detected"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // Decode failures are permanent; there is no row to fail,
                    // so surface loudly and move on.
                    metrics::ERRORS
                        .with_label_values(&["deposit_watcher", "permanent"])
                        .inc();
                    error!(
                        tx_hash = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        error = %e,
                        "Failed to decode deposit log"
                    );
                }
            }
        }

        db::advance_cursor(&self.db, db::CURSOR_EVM_DEPOSITS, to_block as i64).await?;
        metrics::CURSOR_POSITION
            .with_label_values(&["evm_deposits"])
            .set(to_block as f64);
        metrics::BLOCKS_PROCESSED
            .with_label_values(&["evm"])
            .inc_by((to_block - from_block + 1) as f64);
        metrics::LAST_SUCCESSFUL_POLL
            .with_label_values(&["deposit_watcher"])
            .set(Utc::now().timestamp() as f64);

        Ok(())
    }

}

/// Decode a Deposit(user, amount, cantonRecipient, token) log.
///
/// Returns `Ok(None)` for deposits of unmapped tokens and zero amounts.
fn parse_deposit_log(
    log: &Log,
    token_address: Address,
    token_symbol: &str,
    token_decimals: u8,
) -> Result<Option<NewDeposit>> {
    // topics[0] = signature
    // topics[1] = user (address, left-padded)
    // topics[2] = cantonRecipient (bytes32 fingerprint)
    // topics[3] = token (address, left-padded)
    let topics = log.topics();
    if topics.len() != 4 {
        return Err(eyre!("Deposit log has {} topics, expected 4", topics.len()));
    }

    let token = Address::from_slice(&topics[3].as_slice()[12..32]);
    if token != token_address {
        debug!(%token, "Skipping deposit of unmapped token");
        return Ok(None);
    }

    let user = Address::from_slice(&topics[1].as_slice()[12..32]);
    let fingerprint = Fingerprint::from_hex(&hex::encode(topics[2].as_slice()))?;

    let data = log.data().data.as_ref();
    if data.len() < 32 {
        return Err(eyre!("Deposit log data too short: {} bytes", data.len()));
    }
    let amount = U256::from_be_slice(&data[0..32]);
    if amount.is_zero() {
        warn!(user = %user, "Skipping zero-amount deposit");
        return Ok(None);
    }

    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| eyre!("Missing transaction hash"))?;
    let block_number = log
        .block_number
        .ok_or_else(|| eyre!("Missing block number"))?;
    let log_index = log.log_index.ok_or_else(|| eyre!("Missing log index"))?;

    Ok(Some(NewDeposit {
        evm_tx_hash: format!("{:?}", tx_hash),
        evm_block_number: block_number as i64,
        evm_log_index: log_index as i32,
        token_symbol: token_symbol.to_string(),
        amount: wei_to_decimal(amount, token_decimals).to_string(),
        evm_address: format!("{:?}", user).to_lowercase(),
        fingerprint: fingerprint.to_hex(),
    }))
}

// ============================================================================
// Processor
// ============================================================================

/// Drives journalled deposits to the Canton mint
pub struct DepositProcessor {
    db: PgPool,
    canton: Arc<CantonClient>,
    templates: BridgeTemplates,
    token_symbol: String,
    min_amount: BigDecimal,
    max_amount: BigDecimal,
    processing_interval: Duration,
    batch_size: i64,
    lease_seconds: i64,
    max_retries: i32,
    retry: RetryConfig,
    /// TokenConfig contract the mint choice is exercised on, resolved lazily
    token_config_cid: Mutex<Option<String>>,
    /// WayfinderBridgeConfig contract RegisterUser is exercised on
    bridge_config_cid: Mutex<Option<String>>,
}

impl DepositProcessor {
    pub fn new(config: &Config, db: PgPool, canton: Arc<CantonClient>) -> Result<Self> {
        Ok(Self {
            db,
            canton,
            templates: config.templates(),
            token_symbol: config.bridge.token_symbol.clone(),
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
            token_config_cid: Mutex::new(None),
            bridge_config_cid: Mutex::new(None),
        })
    }

    pub async fn run(self) -> Result<()> {
        info!("Deposit processor started");

        loop {
            match db::claim_transfers(
                &self.db,
                "deposit",
                &["detected", "mapped", "submitted", "confirmed"],
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
                                "Failed to process deposit"
                            );
                        }
                    }
                    metrics::LAST_SUCCESSFUL_POLL
                        .with_label_values(&["deposit_processor"])
                        .set(Utc::now().timestamp() as f64);
                }
                Err(e) => {
                    metrics::ERRORS
                        .with_label_values(&["deposit_processor", "transient"])
                        .inc();
                    warn!(error = %e, "Failed to claim deposits");
                }
            }

            tokio::time::sleep(self.processing_interval).await;
        }
    }

    async fn process(&self, transfer: &Transfer) -> Result<()> {
        let amount: BigDecimal = transfer
            .amount
            .parse()
            .map_err(|_| eyre!("Journalled amount is not a decimal: {}", transfer.amount))?;

        // Bounds are a permanent rejection, checked before any ledger work
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
            metrics::TRANSFERS_FAILED.with_label_values(&["deposit"]).inc();
            return Ok(());
        }

        let status = TransferStatus::parse(&transfer.status)?;
        let result = match status {
            TransferStatus::Detected => self.ensure_mapping_and_mint(transfer, &amount).await,
            TransferStatus::Mapped | TransferStatus::Submitted => {
                self.submit_mint(transfer, &amount).await
            }
            // Crash window between confirmed and closed: the mint landed and
            // was journalled, only the close remains. The audit event arrives
            // via the reconciler stream.
            TransferStatus::Confirmed => {
                if db::update_transfer_status(&self.db, transfer.id, "confirmed", "closed").await? {
                    metrics::TRANSFERS_CLOSED.with_label_values(&["deposit"]).inc();
                }
                Ok(())
            }
            other => {
                warn!(transfer_id = transfer.id, status = %other, "Unexpected deposit status claimed");
                db::release_lease(&self.db, transfer.id).await?;
                return Ok(());
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => self.handle_error(transfer, e).await,
        }
    }

    async fn ensure_mapping_and_mint(
        &self,
        transfer: &Transfer,
        amount: &BigDecimal,
    ) -> Result<()> {
        self.ensure_mapping(transfer).await?;

        if !db::update_transfer_status(&self.db, transfer.id, "detected", "mapped").await? {
            // Another worker advanced the row; leave it to them
            return Ok(());
        }

        self.submit_mint(transfer, amount).await
    }

    /// Resolve the user's FingerprintMapping, registering on Canton when none
    /// exists. Registration uses a deterministic command id per fingerprint so
    /// concurrent duplicates collapse on the ledger.
    async fn ensure_mapping(&self, transfer: &Transfer) -> Result<()> {
        if let Some(user) = db::get_user_by_fingerprint(&self.db, &transfer.fingerprint).await? {
            if user.mapping_contract_id.is_some() {
                return Ok(());
            }
        }

        // The journal has no mapping; ask the ledger before registering
        let mappings = self
            .canton
            .active_contracts(&self.templates.fingerprint_mapping(), None)
            .await
            .map_err(|e| eyre!(CantonProcessError(e)))?;

        for event in &mappings {
            if let Ok(mapping) = FingerprintMapping::from_event(event) {
                if mapping.fingerprint.to_hex() == transfer.fingerprint {
                    self.persist_mapping(transfer, &mapping).await?;
                    return Ok(());
                }
            }
        }

        // No mapping anywhere: allocate a party and register
        let hint = format!("user-{}", &transfer.fingerprint[..16.min(transfer.fingerprint.len())]);
        let user_party = self
            .canton
            .allocate_party(&hint)
            .await
            .map_err(|e| eyre!(CantonProcessError(e)))?;

        let bridge_config_cid = self.bridge_config_cid().await?;
        let command = Command::exercise(
            &self.templates.bridge_config(),
            bridge_config_cid,
            "RegisterUser",
            templates::register_user_args(
                &user_party,
                &transfer.fingerprint,
                transfer.evm_address.as_deref(),
            ),
        );
        let command_id = format!("register-user-{}", transfer.fingerprint);

        match self
            .canton
            .submit_and_wait(&[command], &command_id, &[], None)
            .await
        {
            Ok(tree) => {
                let created = tree
                    .find_created(&self.templates.fingerprint_mapping())
                    .ok_or_else(|| eyre!("RegisterUser returned no FingerprintMapping"))?;
                let mapping = FingerprintMapping::from_event(created)?;
                info!(
                    fingerprint = %transfer.fingerprint,
                    party = %mapping.user_party,
                    mapping_cid = %mapping.contract_id,
                    "Registered user on Canton"
                );
                self.persist_mapping(transfer, &mapping).await
            }
            Err(e) if e.is_duplicate_command() => {
                // A prior attempt (or a concurrent worker) won; re-query
                debug!(fingerprint = %transfer.fingerprint, "RegisterUser deduplicated, re-querying");
                let mappings = self
                    .canton
                    .active_contracts(&self.templates.fingerprint_mapping(), None)
                    .await
                    .map_err(|e| eyre!(CantonProcessError(e)))?;
                for event in &mappings {
                    if let Ok(mapping) = FingerprintMapping::from_event(event) {
                        if mapping.fingerprint.to_hex() == transfer.fingerprint {
                            self.persist_mapping(transfer, &mapping).await?;
                            return Ok(());
                        }
                    }
                }
                Err(eyre!("Mapping not found after duplicate RegisterUser"))
            }
            Err(e) => Err(eyre!(CantonProcessError(e))),
        }
    }

    async fn persist_mapping(
        &self,
        transfer: &Transfer,
        mapping: &FingerprintMapping,
    ) -> Result<()> {
        let evm_address = mapping
            .evm_address
            .clone()
            .or_else(|| transfer.evm_address.clone())
            .unwrap_or_default();
        db::upsert_user(
            &self.db,
            &evm_address,
            &transfer.fingerprint,
            &mapping.user_party,
            None,
            Some(&mapping.contract_id),
        )
        .await?;
        Ok(())
    }

    async fn submit_mint(&self, transfer: &Transfer, amount: &BigDecimal) -> Result<()> {
        let user = db::get_user_by_fingerprint(&self.db, &transfer.fingerprint)
            .await?
            .ok_or_else(|| eyre!("No user row for mapped deposit {}", transfer.id))?;

        // Rows arriving here are 'mapped' in the journal (either claimed as
        // such or just advanced by ensure_mapping_and_mint); 'submitted' rows
        // are crash-recovery resubmissions and skip the CAS.
        if transfer.status != "submitted"
            && !db::update_transfer_status(&self.db, transfer.id, "mapped", "submitted").await?
        {
            return Ok(());
        }

        let evm_tx_hash = transfer
            .evm_tx_hash
            .as_deref()
            .ok_or_else(|| eyre!("Deposit {} has no EVM tx hash", transfer.id))?;
        let log_index = transfer
            .evm_log_index
            .ok_or_else(|| eyre!("Deposit {} has no log index", transfer.id))?;
        let command_id = deposit_mint_command_id(evm_tx_hash, log_index);

        let token_config_cid = self.token_config_cid().await?;
        let command = Command::exercise(
            &self.templates.token_config(),
            token_config_cid,
            "IssuerMint",
            templates::issuer_mint_args(
                &user.canton_party_id,
                amount,
                Utc::now(),
                &transfer.fingerprint,
                Some(evm_tx_hash),
            ),
        );

        let (holding_cid, audit_event) = match self
            .canton
            .submit_and_wait(&[command], &command_id, &[], None)
            .await
        {
            Ok(tree) => {
                metrics::MINTS_SUBMITTED.with_label_values(&["ok"]).inc();
                let holding = tree
                    .find_created(&self.templates.cip56_holding())
                    .ok_or_else(|| eyre!("IssuerMint returned no CIP56Holding"))?;
                let audit = tree
                    .find_created(&self.templates.bridge_mint_event())
                    .map(|ev| ev.contract_id.clone());
                (holding.contract_id.clone(), audit)
            }
            Err(e) if e.is_duplicate_command() => {
                metrics::MINTS_SUBMITTED.with_label_values(&["duplicate"]).inc();
                debug!(
                    transfer_id = transfer.id,
                    command_id = %command_id,
                    "Mint deduplicated on Canton, recovering holding CID"
                );
                let cid = self.recover_holding_cid(&user.canton_party_id, amount).await?;
                (cid, None)
            }
            Err(e) => {
                metrics::MINTS_SUBMITTED.with_label_values(&["error"]).inc();
                return Err(eyre!(CantonProcessError(e)));
            }
        };

        if !db::update_deposit_confirmed(&self.db, transfer.id, &holding_cid).await? {
            warn!(transfer_id = transfer.id, "Deposit already confirmed elsewhere");
            return Ok(());
        }

        // Local audit append with the ledger's own event contract id keeps the
        // reconciler's later insert idempotent. Skipped on the duplicate path,
        // where the stream will deliver the event.
        if let Some(event_cid) = audit_event {
            let ledger_offset = db::get_cursor(&self.db, db::CURSOR_CANTON_AUDIT)
                .await?
                .unwrap_or(0);
            db::record_audit_event(
                &self.db,
                &NewAuditEvent {
                    contract_id: event_cid,
                    kind: "bridge_mint".to_string(),
                    token_symbol: self.token_symbol.clone(),
                    amount: amount.to_string(),
                    fingerprint: Some(transfer.fingerprint.clone()),
                    sender_fingerprint: None,
                    recipient_fingerprint: None,
                    ledger_offset,
                },
            )
            .await?;
        }

        db::update_transfer_status(&self.db, transfer.id, "confirmed", "closed").await?;
        metrics::TRANSFERS_CLOSED.with_label_values(&["deposit"]).inc();
        let elapsed = (Utc::now() - transfer.created_at).num_milliseconds() as f64 / 1000.0;
        metrics::PROCESSING_LATENCY
            .with_label_values(&["deposit"])
            .observe(elapsed.max(0.0));

        info!(
            transfer_id = transfer.id,
            holding_cid = %holding_cid,
            amount = %amount,
            "Deposit minted and closed"
        );
        Ok(())
    }

    /// Crash recovery: find the holding the deduplicated mint created, by
    /// owner and exact amount.
    async fn recover_holding_cid(
        &self,
        owner_party: &str,
        amount: &BigDecimal,
    ) -> Result<String> {
        let holdings = self
            .canton
            .active_contracts(&self.templates.cip56_holding(), None)
            .await
            .map_err(|e| eyre!(CantonProcessError(e)))?;

        for event in &holdings {
            if let Ok(holding) = Cip56Holding::from_event(event) {
                if holding.owner_party == owner_party
                    && holding.token_symbol == self.token_symbol
                    && holding.amount == *amount
                {
                    return Ok(holding.contract_id);
                }
            }
        }

        Err(eyre!(
            "No holding with amount {} found for deduplicated mint",
            amount
        ))
    }

    async fn token_config_cid(&self) -> Result<String> {
        let mut cached = self.token_config_cid.lock().await;
        if let Some(cid) = cached.as_ref() {
            return Ok(cid.clone());
        }
        let contracts = self
            .canton
            .active_contracts(&self.templates.token_config(), None)
            .await
            .map_err(|e| eyre!(CantonProcessError(e)))?;
        let cid = contracts
            .first()
            .map(|ev| ev.contract_id.clone())
            .ok_or_else(|| eyre!("No TokenConfig contract on ledger"))?;
        *cached = Some(cid.clone());
        Ok(cid)
    }

    async fn bridge_config_cid(&self) -> Result<String> {
        let mut cached = self.bridge_config_cid.lock().await;
        if let Some(cid) = cached.as_ref() {
            return Ok(cid.clone());
        }
        let contracts = self
            .canton
            .active_contracts(&self.templates.bridge_config(), None)
            .await
            .map_err(|e| eyre!(CantonProcessError(e)))?;
        let cid = contracts
            .first()
            .map(|ev| ev.contract_id.clone())
            .ok_or_else(|| eyre!("No WayfinderBridgeConfig contract on ledger"))?;
        *cached = Some(cid.clone());
        Ok(cid)
    }

    /// Apply the failure taxonomy to a processing error
    async fn handle_error(&self, transfer: &Transfer, error: eyre::Report) -> Result<()> {
        let class = match error.downcast_ref::<CantonProcessError>() {
            Some(CantonProcessError(canton_err)) => classify_canton_error(canton_err),
            None => ErrorClass::Transient,
        };

        match class {
            ErrorClass::Permanent | ErrorClass::Auth => {
                metrics::ERRORS
                    .with_label_values(&["deposit_processor", "permanent"])
                    .inc();
                metrics::TRANSFERS_FAILED.with_label_values(&["deposit"]).inc();
                error!(transfer_id = transfer.id, error = %error, "Deposit failed permanently");
                db::update_transfer_failed(&self.db, transfer.id, &error.to_string()).await
            }
            ErrorClass::Duplicate => {
                // Already handled inline; reaching here means recovery failed
                metrics::ERRORS
                    .with_label_values(&["deposit_processor", "transient"])
                    .inc();
                let backoff = self.retry.backoff_for_attempt(transfer.attempts as u32);
                db::record_transfer_retry(
                    &self.db,
                    transfer.id,
                    &transfer.status,
                    &error.to_string(),
                    backoff.as_secs_f64(),
                )
                .await
            }
            ErrorClass::Transient => {
                metrics::ERRORS
                    .with_label_values(&["deposit_processor", "transient"])
                    .inc();
                if transfer.attempts + 1 >= self.max_retries {
                    metrics::TRANSFERS_FAILED.with_label_values(&["deposit"]).inc();
                    error!(
                        transfer_id = transfer.id,
                        attempts = transfer.attempts + 1,
                        error = %error,
                        "Deposit exhausted retries"
                    );
                    return db::update_transfer_failed(&self.db, transfer.id, &error.to_string())
                        .await;
                }

                // Pre-submission stages rewind to detected; submitted rows
                // stay put and re-resolve via command deduplication.
                let rewind = match transfer.status.as_str() {
                    "submitted" => "submitted",
                    _ => "detected",
                };
                let backoff = self.retry.backoff_for_attempt(transfer.attempts as u32);
                warn!(
                    transfer_id = transfer.id,
                    attempt = transfer.attempts + 1,
                    backoff_secs = backoff.as_secs(),
                    error = %error,
                    "Deposit attempt failed, will retry"
                );
                db::record_transfer_retry(
                    &self.db,
                    transfer.id,
                    rewind,
                    &error.to_string(),
                    backoff.as_secs_f64(),
                )
                .await
            }
        }
    }
}

/// Wrapper keeping the typed ledger error available through eyre for the
/// taxonomy in `handle_error`.
#[derive(Debug)]
struct CantonProcessError(CantonError);

impl std::fmt::Display for CantonProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CantonProcessError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{b256, Bytes, LogData, B256};

    const TOKEN: Address = Address::new([0x22; 20]);

    fn deposit_log(token: Address, amount: U256) -> Log {
        let user = Address::new([0x70; 20]);
        let mut user_topic = [0u8; 32];
        user_topic[12..32].copy_from_slice(user.as_slice());
        let mut token_topic = [0u8; 32];
        token_topic[12..32].copy_from_slice(token.as_slice());
        let fingerprint = [0xabu8; 32];

        let topics = vec![
            deposit_event_signature(),
            B256::from(user_topic),
            B256::from(fingerprint),
            B256::from(token_topic),
        ];
        let data = Bytes::from(amount.to_be_bytes::<32>().to_vec());

        Log {
            inner: alloy::primitives::Log {
                address: Address::new([0x11; 20]),
                data: LogData::new_unchecked(topics, data),
            },
            block_number: Some(42),
            transaction_hash: Some(b256!(
                "00000000000000000000000000000000000000000000000000000000000000aa"
            )),
            log_index: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_deposit_log() {
        let amount = U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64));
        let log = deposit_log(TOKEN, amount);

        let deposit = parse_deposit_log(&log, TOKEN, "PROMPT", 18)
            .unwrap()
            .expect("mapped token decodes");

        assert_eq!(deposit.evm_block_number, 42);
        assert_eq!(deposit.evm_log_index, 3);
        assert_eq!(deposit.token_symbol, "PROMPT");
        assert_eq!(deposit.amount, "100.000000000000000000");
        assert_eq!(deposit.fingerprint, "ab".repeat(32));
        assert_eq!(deposit.evm_address, format!("0x{}", "70".repeat(20)));
    }

    #[test]
    fn test_parse_skips_unmapped_token_and_zero_amount() {
        let other_token = Address::new([0x33; 20]);
        let log = deposit_log(other_token, U256::from(5u64));
        assert!(parse_deposit_log(&log, TOKEN, "PROMPT", 18).unwrap().is_none());

        let zero = deposit_log(TOKEN, U256::ZERO);
        assert!(parse_deposit_log(&zero, TOKEN, "PROMPT", 18).unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_logs() {
        // Wrong topic count
        let mut log = deposit_log(TOKEN, U256::from(1u64));
        let topics = log.topics()[..2].to_vec();
        log.inner.data = LogData::new_unchecked(topics, log.inner.data.data.clone());
        assert!(parse_deposit_log(&log, TOKEN, "PROMPT", 18).is_err());

        // Truncated amount payload
        let mut log = deposit_log(TOKEN, U256::from(1u64));
        let topics = log.topics().to_vec();
        log.inner.data = LogData::new_unchecked(topics, Bytes::from(vec![0u8; 8]));
        assert!(parse_deposit_log(&log, TOKEN, "PROMPT", 18).is_err());

        // Missing transaction coordinates
        let mut log = deposit_log(TOKEN, U256::from(1u64));
        log.transaction_hash = None;
        assert!(parse_deposit_log(&log, TOKEN, "PROMPT", 18).is_err());
    }

    #[test]
    fn test_parse_is_deterministic_for_replay() {
        let amount = U256::from(7u64);
        let log = deposit_log(TOKEN, amount);
        let first = parse_deposit_log(&log, TOKEN, "PROMPT", 18).unwrap().unwrap();
        let second = parse_deposit_log(&log, TOKEN, "PROMPT", 18).unwrap().unwrap();
        assert_eq!(first.evm_tx_hash, second.evm_tx_hash);
        assert_eq!(first.amount, second.amount);
        assert_eq!(
            deposit_mint_command_id(&first.evm_tx_hash, first.evm_log_index),
            deposit_mint_command_id(&second.evm_tx_hash, second.evm_log_index)
        );
    }
}

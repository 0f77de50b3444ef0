//! ERC-20 semantics over Canton holdings
//!
//! Reads serve from the cached balance table, refreshing from the ledger's
//! active holdings when the cache is stale. Writes select a sender holding,
//! exercise its Transfer choice with a deterministic command id, and return a
//! synthesized transaction hash so wallets have an anchor to display. All
//! Canton failures surface as the retryable upstream error code — command
//! deduplication makes client retries safe.

use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use canton_rs::canton::{templates, CantonClient, Cip56Holding, Command};
use canton_rs::{
    erc20_transfer_command_id, synthetic_tx_hash, truncate_to_canton_scale, BridgeTemplates,
};

use crate::db::{self, User};
use crate::keystore::Keystore;
use crate::rpc::RpcError;

pub struct Facade {
    pub db: PgPool,
    pub canton: Arc<CantonClient>,
    pub templates: BridgeTemplates,
    pub keystore: Keystore,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimals: u8,
    /// ERC-20 contract address wallets believe they are talking to
    pub token_contract: String,
    pub balance_ttl_seconds: i64,
    pub chain_id: u64,
}

impl Facade {
    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.token_name
    }

    pub fn symbol(&self) -> &str {
        &self.token_symbol
    }

    pub fn decimals(&self) -> u8 {
        self.token_decimals
    }

    pub async fn total_supply(&self) -> Result<BigDecimal, RpcError> {
        let folded = db::fold_total_supply(&self.db, &self.token_symbol)
            .await
            .map_err(|e| RpcError::upstream(e.to_string()))?;
        BigDecimal::from_str(&folded)
            .map_err(|_| RpcError::upstream("total supply fold is not a decimal"))
    }

    /// Caller lookup shared by every authenticated method
    pub async fn require_user(&self, evm_address: &str) -> Result<User, RpcError> {
        db::get_user_by_evm_address(&self.db, evm_address)
            .await
            .map_err(|e| RpcError::upstream(e.to_string()))?
            .ok_or_else(RpcError::unregistered_caller)
    }

    /// Cached balance, refreshed from Canton when older than the TTL
    pub async fn balance_of(&self, user: &User) -> Result<BigDecimal, RpcError> {
        let cached = db::get_cached_balance(&self.db, &user.fingerprint, &self.token_symbol)
            .await
            .map_err(|e| RpcError::upstream(e.to_string()))?;

        if let Some(cached) = &cached {
            let age = Utc::now() - cached.updated_at;
            if age.num_seconds() <= self.balance_ttl_seconds {
                return BigDecimal::from_str(&cached.balance)
                    .map_err(|_| RpcError::upstream("cached balance is not a decimal"));
            }
            debug!(
                fingerprint = %user.fingerprint,
                age_seconds = age.num_seconds(),
                "Cached balance stale, refreshing from ledger"
            );
        }

        self.refresh_balance(user).await
    }

    /// On-demand refresh: sum the user's active holdings and overwrite the
    /// cache. The reconciler's audit fold remains the long-run authority.
    pub async fn refresh_balance(&self, user: &User) -> Result<BigDecimal, RpcError> {
        let holdings = self.user_holdings(user).await?;
        let total: BigDecimal = holdings
            .iter()
            .map(|h| h.amount.clone())
            .fold(BigDecimal::from(0), |acc, amount| acc + amount);

        db::overwrite_balance(
            &self.db,
            &user.fingerprint,
            &self.token_symbol,
            &total.to_string(),
        )
        .await
        .map_err(|e| RpcError::upstream(e.to_string()))?;

        Ok(total)
    }

    async fn user_holdings(&self, user: &User) -> Result<Vec<Cip56Holding>, RpcError> {
        let events = self
            .canton
            .active_contracts(&self.templates.cip56_holding(), None)
            .await
            .map_err(|e| RpcError::upstream(e.to_string()))?;

        Ok(events
            .iter()
            .filter_map(|ev| Cip56Holding::from_event(ev).ok())
            .filter(|h| {
                h.owner_party == user.canton_party_id && h.token_symbol == self.token_symbol
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Execute an ERC-20 style transfer on Canton. Returns the synthesized
    /// transaction hash and the command id used on the ledger.
    pub async fn transfer(
        &self,
        sender_address: &str,
        recipient_address: &str,
        amount: &BigDecimal,
    ) -> Result<(String, String), RpcError> {
        if amount <= &BigDecimal::from(0) {
            return Err(RpcError::invalid_params("amount must be positive"));
        }
        let amount = truncate_to_canton_scale(amount);

        let sender = self.require_user(sender_address).await?;
        let recipient = db::get_user_by_evm_address(&self.db, recipient_address)
            .await
            .map_err(|e| RpcError::upstream(e.to_string()))?
            .ok_or_else(RpcError::unregistered_recipient)?;

        // Custodial signing is the only write path the facade mediates;
        // native parties submit to Canton directly.
        let encrypted_key = sender.encrypted_canton_private_key.as_deref().ok_or_else(|| {
            RpcError::new(
                crate::rpc::ERR_UNREGISTERED_CALLER,
                "caller has no custodial signing key",
            )
        })?;

        let balance = self.balance_of(&sender).await?;
        if balance < amount {
            return Err(RpcError::insufficient_balance());
        }

        // Select the smallest holding that covers the amount; the Transfer
        // choice splits it on the ledger.
        let holdings = self.user_holdings(&sender).await?;
        let holding = holdings
            .iter()
            .filter(|h| h.amount >= amount)
            .min_by(|a, b| a.amount.cmp(&b.amount))
            .ok_or_else(|| {
                // Fragmented holdings: total covers it but no single contract does
                RpcError::new(
                    crate::rpc::ERR_INSUFFICIENT_BALANCE,
                    "no single holding covers the amount; consolidate holdings first",
                )
            })?;

        let command_id = erc20_transfer_command_id(
            &sender.evm_address,
            &recipient.evm_address,
            &amount.to_string(),
            Utc::now().timestamp(),
        );
        let party_signature = self
            .keystore
            .sign_command(encrypted_key, &command_id)
            .map_err(|e| RpcError::upstream(e.to_string()))?;

        let command = Command::exercise(
            &self.templates.cip56_holding(),
            holding.contract_id.clone(),
            "Transfer",
            templates::holding_transfer_args(&recipient.canton_party_id, &amount),
        );

        match self
            .canton
            .submit_and_wait(
                &[command],
                &command_id,
                std::slice::from_ref(&sender.canton_party_id),
                Some(&party_signature),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_duplicate_command() => {
                debug!(command_id = %command_id, "Transfer deduplicated on Canton");
            }
            Err(e) => {
                warn!(command_id = %command_id, error = %e, "Canton transfer failed");
                return Err(RpcError::upstream(e.to_string()));
            }
        }

        // Optimistic cache move; the reconciler's fold is authoritative
        if let Err(e) = db::apply_transfer_to_cache(
            &self.db,
            &sender.fingerprint,
            &recipient.fingerprint,
            &self.token_symbol,
            &amount.to_string(),
        )
        .await
        {
            warn!(error = %e, "Failed to update cached balances after transfer");
        }

        let tx_hash = synthetic_tx_hash(&command_id);
        info!(
            sender = %sender.evm_address,
            recipient = %recipient.evm_address,
            amount = %amount,
            tx_hash = %tx_hash,
            "Transfer executed on Canton"
        );
        Ok((tx_hash, command_id))
    }
}

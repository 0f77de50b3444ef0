//! EVM transaction submitter with managed nonces
//!
//! Owns the relayer key and a local nonce counter seeded from the node's
//! pending nonce. There is exactly one `EvmSigner` per process; all unlock
//! submissions flow through it so no two transactions ever race on a nonce.
//! A "nonce too low/high" error invalidates the counter, which re-seeds on
//! the next lease.

use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::fillers::{FillProvider, JoinFill, WalletFiller};
use alloy::providers::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use eyre::{eyre, Result, WrapErr};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::contracts::WayfinderBridge;

type WalletProvider = FillProvider<
    JoinFill<Identity, WalletFiller<EthereumWallet>>,
    RootProvider<Http<Client>>,
    Http<Client>,
    Ethereum,
>;

/// Receipt poll cadence while waiting for inclusion
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome of an unlock submission attempt
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Transaction accepted by the node
    Submitted { tx_hash: B256, nonce: u64 },
    /// Current gas price exceeds the configured cap; try again next tick
    Deferred { gas_price: u128, cap: u128 },
}

/// Nonce-disciplined transaction submitter for the relayer key
pub struct EvmSigner {
    provider: WalletProvider,
    address: Address,
    chain_id: u64,
    gas_limit: u64,
    max_gas_price: u128,
    /// Local counter; `None` means re-seed from the node before next use
    next_nonce: Mutex<Option<u64>>,
}

impl EvmSigner {
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        private_key: &str,
        gas_limit: u64,
        max_gas_price: u128,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid relayer private key")?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .on_http(rpc_url.parse().wrap_err("Failed to parse EVM RPC URL")?);

        info!(
            relayer_address = %address,
            chain_id,
            gas_limit,
            max_gas_price,
            "EVM signer initialized"
        );

        Ok(Self {
            provider,
            address,
            chain_id,
            gas_limit,
            max_gas_price,
            next_nonce: Mutex::new(None),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Lease the next nonce, seeding from the node's pending count when the
    /// local counter has been invalidated.
    async fn lease_nonce(&self) -> Result<u64> {
        let mut guard = self.next_nonce.lock().await;
        let nonce = match *guard {
            Some(nonce) => nonce,
            None => {
                let seeded = self
                    .provider
                    .get_transaction_count(self.address)
                    .await
                    .wrap_err("Failed to seed nonce from node")?;
                debug!(nonce = seeded, "Nonce counter seeded from pending count");
                seeded
            }
        };
        *guard = Some(nonce + 1);
        Ok(nonce)
    }

    /// Invalidate the local counter after a nonce race; next lease re-seeds.
    pub async fn reset_nonce(&self) {
        let mut guard = self.next_nonce.lock().await;
        *guard = None;
    }

    /// Submit `unlockToCanton(token, to, amount)` with an explicit nonce, gas
    /// limit and gas price. Defers (without consuming a nonce) while the
    /// network gas price exceeds the configured cap.
    pub async fn submit_unlock(
        &self,
        bridge: Address,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<SubmitOutcome> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .wrap_err("Failed to get gas price")?;

        if self.max_gas_price > 0 && gas_price > self.max_gas_price {
            return Ok(SubmitOutcome::Deferred {
                gas_price,
                cap: self.max_gas_price,
            });
        }

        let nonce = self.lease_nonce().await?;
        let contract = WayfinderBridge::new(bridge, &self.provider);

        debug!(
            %token,
            %to,
            amount = %amount,
            nonce,
            gas_price,
            "Submitting unlockToCanton"
        );

        let pending = contract
            .unlockToCanton(token, to, amount)
            .nonce(nonce)
            .gas(self.gas_limit)
            .gas_price(gas_price)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if is_nonce_error(&message) {
                    warn!(nonce, error = %message, "Nonce race detected, resetting counter");
                    // Counter is stale; drop it so the next lease re-seeds
                    if let Ok(mut guard) = self.next_nonce.try_lock() {
                        *guard = None;
                    }
                }
                eyre!("Failed to send unlock transaction: {}", message)
            })?;

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, nonce, "Unlock transaction sent");

        Ok(SubmitOutcome::Submitted { tx_hash, nonce })
    }

    /// Poll for the receipt of a submitted transaction until `timeout`.
    ///
    /// `Ok(None)` means still unresolved; the caller re-observes on its next
    /// tick rather than blocking a worker slot.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .wrap_err("Failed to poll transaction receipt")?
            {
                return Ok(Some(receipt));
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// Whether an RPC error message indicates a nonce race
pub fn is_nonce_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("already known")
        || lower.contains("replacement transaction underpriced")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_nonce_error() {
        assert!(is_nonce_error("nonce too low: next nonce 5, tx nonce 3"));
        assert!(is_nonce_error("Nonce too high"));
        assert!(is_nonce_error("already known"));
        assert!(!is_nonce_error("execution reverted"));
        assert!(!is_nonce_error("connection refused"));
    }
}

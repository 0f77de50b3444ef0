//! Read-only EVM node client
//!
//! Block tip tracking, log filtering, gas price reads, and receipt lookups.
//! Transaction submission lives in [`crate::evm::signer`], which owns the
//! relayer key and its nonce state.

use alloy::primitives::B256;
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log, TransactionReceipt};
use alloy::transports::http::{Client, Http};
use eyre::{Result, WrapErr};

/// Read-only provider wrapper for one EVM chain
pub struct EvmClient {
    provider: RootProvider<Http<Client>>,
    chain_id: u64,
}

impl EvmClient {
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let url = rpc_url.parse().wrap_err("Failed to parse EVM RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self { provider, chain_id })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Latest block number at the node's tip
    pub async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("Failed to get block number")
    }

    /// Tip minus the confirmation depth; events at or below this block are
    /// considered final for the bridge.
    pub async fn confirmed_block(&self, confirmation_blocks: u64) -> Result<u64> {
        let tip = self.block_number().await?;
        Ok(tip.saturating_sub(confirmation_blocks))
    }

    pub async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .wrap_err("Failed to get gas price")
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider
            .get_logs(filter)
            .await
            .wrap_err("Failed to get logs")
    }

    pub async fn get_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .wrap_err("Failed to get transaction receipt")
    }
}

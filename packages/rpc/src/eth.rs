//! Ethereum JSON-RPC subset
//!
//! Enough of the standard surface for browser wallets to treat the facade as
//! a regular RPC node: chain id, block number, gas price, transaction count,
//! `eth_call` decoded against the ERC-20 ABI, and `eth_sendRawTransaction`
//! for wallet-signed transfers. A raw transaction is journalled before any
//! ledger work so the calldata cache always covers what was accepted.

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, U256};
use alloy::sol_types::{SolCall, SolValue};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, warn};

use canton_rs::evm::{EvmClient, ERC20};
use canton_rs::{decimal_to_wei, wei_to_decimal};

use crate::db;
use crate::erc20::Facade;
use crate::rpc::RpcError;

/// A decoded wallet-signed ERC-20 transfer
#[derive(Debug)]
pub struct DecodedTransfer {
    pub tx_hash: String,
    pub from: Address,
    pub to_contract: Address,
    pub recipient: Address,
    pub amount: U256,
    pub raw_hex: String,
}

/// Decode and sender-recover a raw RLP transaction carrying an ERC-20
/// `transfer(to, amount)` call.
pub fn decode_raw_transfer(raw_hex: &str) -> Result<DecodedTransfer, RpcError> {
    let stripped = raw_hex.trim_start_matches("0x");
    let bytes = hex::decode(stripped)
        .map_err(|_| RpcError::invalid_params("raw transaction is not valid hex"))?;

    let envelope = TxEnvelope::decode_2718(&mut bytes.as_slice())
        .map_err(|e| RpcError::invalid_params(format!("undecodable transaction: {}", e)))?;

    let (from, to, input, tx_hash) = match &envelope {
        TxEnvelope::Legacy(tx) => (
            tx.recover_signer(),
            tx.tx().to,
            tx.tx().input.clone(),
            *tx.hash(),
        ),
        TxEnvelope::Eip2930(tx) => (
            tx.recover_signer(),
            tx.tx().to,
            tx.tx().input.clone(),
            *tx.hash(),
        ),
        TxEnvelope::Eip1559(tx) => (
            tx.recover_signer(),
            tx.tx().to,
            tx.tx().input.clone(),
            *tx.hash(),
        ),
        _ => {
            return Err(RpcError::invalid_params(
                "unsupported transaction type; use legacy or EIP-1559",
            ))
        }
    };

    let from =
        from.map_err(|_| RpcError::invalid_params("failed to recover transaction signer"))?;
    let to_contract = to
        .to()
        .copied()
        .ok_or_else(|| RpcError::invalid_params("contract creation is not supported"))?;

    let call = ERC20::transferCall::abi_decode(&input, true).map_err(|_| {
        RpcError::invalid_params("calldata is not an ERC-20 transfer(address,uint256)")
    })?;

    Ok(DecodedTransfer {
        tx_hash: format!("{:?}", tx_hash),
        from,
        to_contract,
        recipient: call.to,
        amount: call.amount,
        raw_hex: format!("0x{}", stripped),
    })
}

fn hex_u64(value: u64) -> Value {
    json!(format!("0x{:x}", value))
}

fn param_str(params: &Value, index: usize) -> Result<&str, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("missing string param {}", index)))
}

/// Dispatch one eth_* method. `caller` is the EIP-191-authenticated address
/// when the request carried auth headers.
pub async fn dispatch(
    facade: &Facade,
    evm: &EvmClient,
    method: &str,
    params: &Value,
    caller: Option<Address>,
) -> Result<Value, RpcError> {
    match method {
        "eth_chainId" => Ok(hex_u64(facade.chain_id)),

        "eth_blockNumber" => {
            let block = evm
                .block_number()
                .await
                .map_err(|e| RpcError::upstream(e.to_string()))?;
            Ok(hex_u64(block))
        }

        "eth_gasPrice" => {
            let price = evm
                .gas_price()
                .await
                .map_err(|e| RpcError::upstream(e.to_string()))?;
            Ok(json!(format!("0x{:x}", price)))
        }

        "eth_getTransactionCount" => {
            let address = param_str(params, 0)?;
            let count = db::count_evm_transactions(&facade.db, address)
                .await
                .map_err(|e| RpcError::upstream(e.to_string()))?;
            Ok(hex_u64(count as u64))
        }

        "eth_call" => eth_call(facade, params, caller).await,

        "eth_sendRawTransaction" => send_raw_transaction(facade, params, caller).await,

        other => Err(RpcError::method_not_found(other)),
    }
}

/// Decode an eth_call against the known ERC-20 ABI and answer from the cache
async fn eth_call(
    facade: &Facade,
    params: &Value,
    caller: Option<Address>,
) -> Result<Value, RpcError> {
    let call_obj = params
        .get(0)
        .ok_or_else(|| RpcError::invalid_params("missing call object"))?;
    let data_hex = call_obj
        .get("data")
        .or_else(|| call_obj.get("input"))
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("call object has no data"))?;
    let data = hex::decode(data_hex.trim_start_matches("0x"))
        .map_err(|_| RpcError::invalid_params("call data is not valid hex"))?;
    if data.len() < 4 {
        return Err(RpcError::invalid_params("call data shorter than a selector"));
    }

    let selector: [u8; 4] = data[0..4].try_into().expect("length checked above");

    let encoded: Vec<u8> = match selector {
        ERC20::nameCall::SELECTOR => facade.name().to_string().abi_encode(),
        ERC20::symbolCall::SELECTOR => facade.symbol().to_string().abi_encode(),
        ERC20::decimalsCall::SELECTOR => U256::from(facade.decimals()).abi_encode(),
        ERC20::totalSupplyCall::SELECTOR => {
            let supply = facade.total_supply().await?;
            decimal_to_wei(&supply, facade.token_decimals)
                .map_err(|e| RpcError::upstream(e.to_string()))?
                .abi_encode()
        }
        ERC20::balanceOfCall::SELECTOR => {
            let call = ERC20::balanceOfCall::abi_decode(&data, true)
                .map_err(|_| RpcError::invalid_params("malformed balanceOf calldata"))?;

            // Balance reads are authenticated: the signer may only read
            // their own balance.
            let caller = caller.ok_or_else(RpcError::unregistered_caller)?;
            if caller != call.account {
                return Err(RpcError::new(
                    crate::rpc::ERR_UNREGISTERED_CALLER,
                    "signature does not match queried account",
                ));
            }

            let user = facade
                .require_user(&format!("{:?}", call.account))
                .await?;
            let balance = facade.balance_of(&user).await?;
            decimal_to_wei(&balance, facade.token_decimals)
                .map_err(|e| RpcError::upstream(e.to_string()))?
                .abi_encode()
        }
        _ => {
            debug!(selector = %hex::encode(selector), "Unknown eth_call selector");
            return Err(RpcError::invalid_params("unsupported ERC-20 selector"));
        }
    };

    Ok(json!(format!("0x{}", hex::encode(encoded))))
}

/// The wallet-signed transfer path: recover the sender from the transaction
/// itself, verify the decoded call, execute on Canton.
async fn send_raw_transaction(
    facade: &Facade,
    params: &Value,
    _caller: Option<Address>,
) -> Result<Value, RpcError> {
    let raw_hex = param_str(params, 0)?;
    let decoded = decode_raw_transfer(raw_hex)?;

    let token_contract = Address::from_str(&facade.token_contract)
        .map_err(|_| RpcError::upstream("misconfigured token contract address"))?;
    if decoded.to_contract != token_contract {
        return Err(RpcError::invalid_params(format!(
            "transaction targets {:?}, expected the bridged token contract",
            decoded.to_contract
        )));
    }

    let amount = wei_to_decimal(decoded.amount, facade.token_decimals);
    let sender = format!("{:?}", decoded.from);
    let recipient = format!("{:?}", decoded.recipient);

    // Journal the calldata before touching the ledger
    db::insert_evm_transaction(
        &facade.db,
        &decoded.tx_hash,
        &sender,
        Some(&recipient),
        Some(&amount.to_string()),
        &decoded.raw_hex,
        None,
    )
    .await
    .map_err(|e| RpcError::upstream(e.to_string()))?;

    match facade.transfer(&sender, &recipient, &amount).await {
        Ok((_synth_hash, command_id)) => {
            if let Err(e) =
                db::mark_evm_transaction_executed(&facade.db, &decoded.tx_hash, &command_id).await
            {
                warn!(error = %e, "Failed to mark raw transaction executed");
            }
            // Wallets track the hash of the transaction they signed
            Ok(json!(decoded.tx_hash))
        }
        Err(e) => {
            let _ = db::update_evm_transaction_status(&facade.db, &decoded.tx_hash, "failed")
                .await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_selector_extraction() {
        let calldata = ERC20::balanceOfCall {
            account: Address::ZERO,
        }
        .abi_encode();
        assert_eq!(&calldata[0..4], ERC20::balanceOfCall::SELECTOR);

        let decoded = ERC20::balanceOfCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.account, Address::ZERO);
    }

    #[test]
    fn test_transfer_calldata_round_trip() {
        let recipient = Address::from_str("0x7099aabb0000000000000000000000000000aac8").unwrap();
        let calldata = ERC20::transferCall {
            to: recipient,
            amount: U256::from(1_000_000u64),
        }
        .abi_encode();

        let decoded = ERC20::transferCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.to, recipient);
        assert_eq!(decoded.amount, U256::from(1_000_000u64));
    }

    #[test]
    fn test_decode_raw_transfer_rejects_garbage() {
        assert!(decode_raw_transfer("0xzz").is_err());
        assert!(decode_raw_transfer("0xdeadbeef").is_err());
    }

    #[test]
    fn test_hex_encoding_helpers() {
        assert_eq!(hex_u64(0x7a69), json!("0x7a69"));
        assert_eq!(hex_u64(0), json!("0x0"));
    }
}

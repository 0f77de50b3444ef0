//! Request authentication by EIP-191 personal-sign signature
//!
//! Authenticated methods carry two headers:
//!
//! - `X-Signature`: 65-byte personal-sign signature, hex
//! - `X-Message`: `"<method>:<unix-ts>"`
//!
//! The recovered address must belong to a registered user and the timestamp
//! must be within the freshness window, which bounds replay of a captured
//! header pair to a five-minute slice per method.

use alloy::primitives::{Address, Signature};
use chrono::Utc;

use crate::rpc::RpcError;

/// Maximum allowed |now - ts| in seconds
pub const MAX_TIMESTAMP_SKEW: i64 = 300;

/// Verify headers for `method` and recover the caller's address
pub fn verify_signed_request(
    signature_hex: &str,
    message: &str,
    method: &str,
) -> Result<Address, RpcError> {
    verify_at(signature_hex, message, method, Utc::now().timestamp())
}

fn verify_at(
    signature_hex: &str,
    message: &str,
    method: &str,
    now_ts: i64,
) -> Result<Address, RpcError> {
    let (msg_method, ts) = message
        .rsplit_once(':')
        .ok_or_else(|| RpcError::invalid_params("X-Message must be '<method>:<unix-ts>'"))?;

    if msg_method != method {
        return Err(RpcError::invalid_params(format!(
            "X-Message names method '{}', request is '{}'",
            msg_method, method
        )));
    }

    let ts: i64 = ts
        .parse()
        .map_err(|_| RpcError::invalid_params("X-Message timestamp is not a unix epoch"))?;
    if (now_ts - ts).abs() > MAX_TIMESTAMP_SKEW {
        return Err(RpcError::invalid_params("signed message expired"));
    }

    let raw = signature_hex.trim_start_matches("0x");
    let bytes = hex::decode(raw)
        .map_err(|_| RpcError::invalid_params("X-Signature is not valid hex"))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|_| RpcError::invalid_params("X-Signature must be 65 bytes"))?;

    signature
        .recover_address_from_msg(message)
        .map_err(|_| RpcError::invalid_params("failed to recover signer from X-Signature"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    fn signer() -> PrivateKeySigner {
        "0x0000000000000000000000000000000000000000000000000000000000000007"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_recovers_signer_address() {
        let signer = signer();
        let message = "erc20_balanceOf:1700000000";
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        let hex_sig = format!("0x{}", hex::encode(signature.as_bytes()));

        let recovered =
            verify_at(&hex_sig, message, "erc20_balanceOf", 1_700_000_000).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn test_rejects_stale_timestamp() {
        let signer = signer();
        let message = "erc20_transfer:1700000000";
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        let hex_sig = format!("0x{}", hex::encode(signature.as_bytes()));

        let result = verify_at(&hex_sig, message, "erc20_transfer", 1_700_000_000 + 301);
        assert!(result.is_err());

        // Inside the window it passes
        assert!(verify_at(&hex_sig, message, "erc20_transfer", 1_700_000_000 + 299).is_ok());
    }

    #[test]
    fn test_rejects_method_mismatch() {
        let signer = signer();
        let message = "erc20_balanceOf:1700000000";
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        let hex_sig = format!("0x{}", hex::encode(signature.as_bytes()));

        assert!(verify_at(&hex_sig, message, "erc20_transfer", 1_700_000_000).is_err());
    }

    #[test]
    fn test_rejects_garbage_signature() {
        assert!(verify_at("0xzz", "m:1700000000", "m", 1_700_000_000).is_err());
        assert!(verify_at("0xdead", "m:1700000000", "m", 1_700_000_000).is_err());
        assert!(verify_at("0xdead", "no-timestamp", "m", 1_700_000_000).is_err());
    }
}

//! Deterministic command IDs and synthesized transaction hashes
//!
//! Both ledgers deduplicate on client-chosen identifiers: Canton on the
//! submission `commandId`, the journal on unique event coordinates. Every
//! submission the bridge makes derives its identifier from the triggering
//! event, so a retry after a crash lands on the ledger's dedup rail instead of
//! double-applying.

use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Command id for the Canton mint of a detected EVM deposit.
///
/// Keyed on the deposit's EVM event coordinates, which the journal holds
/// unique per deposit.
pub fn deposit_mint_command_id(evm_tx_hash: &str, log_index: i32) -> String {
    format!("deposit-mint-{}:{}", evm_tx_hash, log_index)
}

/// Command id for the Canton completion choice after an EVM unlock is mined.
pub fn withdrawal_complete_command_id(canton_contract_id: &str) -> String {
    format!("withdrawal-complete-{}", canton_contract_id)
}

/// Command id for a facade-initiated Canton holding transfer.
///
/// Hashes sender, recipient, amount, and the request timestamp so a client
/// retry of the same logical transfer deduplicates on Canton while distinct
/// transfers never collide.
pub fn erc20_transfer_command_id(
    sender: &str,
    recipient: &str,
    amount: &str,
    unix_ts: i64,
) -> String {
    let mut data = Vec::with_capacity(sender.len() + recipient.len() + amount.len() + 8);
    data.extend_from_slice(sender.as_bytes());
    data.extend_from_slice(recipient.as_bytes());
    data.extend_from_slice(amount.as_bytes());
    data.extend_from_slice(&unix_ts.to_be_bytes());
    format!("erc20-transfer-{}", hex::encode(keccak256(&data)))
}

/// Synthesize a transaction hash from a command id so wallets have an anchor
/// to display for Canton-side writes.
pub fn synthetic_tx_hash(command_id: &str) -> String {
    format!("0x{}", hex::encode(keccak256(command_id.as_bytes())))
}

/// Marker "EVM tx hash" recorded when an operator reclaims a stale pending
/// withdrawal instead of paying it out.
pub fn cleanup_marker(canton_contract_id: &str) -> String {
    let digest = keccak256(canton_contract_id.as_bytes());
    format!("cleanup-stale-{}", hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_known_vector() {
        // keccak256("") is the well-known empty hash
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_deposit_mint_command_id_deterministic() {
        let a = deposit_mint_command_id("0xabc", 3);
        let b = deposit_mint_command_id("0xabc", 3);
        assert_eq!(a, b);
        assert_eq!(a, "deposit-mint-0xabc:3");
        assert_ne!(a, deposit_mint_command_id("0xabc", 4));
    }

    #[test]
    fn test_erc20_transfer_command_id() {
        let a = erc20_transfer_command_id("0x11", "0x22", "1.0", 1700000000);
        let b = erc20_transfer_command_id("0x11", "0x22", "1.0", 1700000000);
        assert_eq!(a, b);
        assert!(a.starts_with("erc20-transfer-"));
        // Timestamp participates in the discriminator
        assert_ne!(a, erc20_transfer_command_id("0x11", "0x22", "1.0", 1700000001));
    }

    #[test]
    fn test_synthetic_tx_hash_shape() {
        let h = synthetic_tx_hash("deposit-mint-0xabc:0");
        assert!(h.starts_with("0x"));
        assert_eq!(h.len(), 66);
    }

    #[test]
    fn test_cleanup_marker() {
        let m = cleanup_marker("00aabbcc");
        assert!(m.starts_with("cleanup-stale-"));
        assert_eq!(m, cleanup_marker("00aabbcc"));
        assert_ne!(m, cleanup_marker("00aabbcd"));
    }
}

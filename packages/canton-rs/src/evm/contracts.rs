//! EVM bridge contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the lock/unlock
//! escrow contract and the standard ERC-20 interface the facade decodes
//! wallet calldata against.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Lock/unlock escrow over a standard ERC-20.
    ///
    /// `cantonRecipient` is the user's 32-byte Canton fingerprint.
    #[sol(rpc)]
    contract WayfinderBridge {
        /// Register an ERC-20 <-> Canton token mapping (owner only)
        function addTokenMapping(address erc20, bytes32 cantonTokenId) external;

        /// Lock tokens for minting on Canton
        function depositToCanton(address token, uint256 amount, bytes32 cantonRecipient) external;

        /// Release locked tokens for a Canton burn (relayer only)
        function unlockToCanton(address token, address to, uint256 amount) external;

        /// Locked balance per token
        function lockedBalance(address token) external view returns (uint256);

        /// Emitted on every deposit; the watcher's source of truth
        event Deposit(
            address indexed user,
            uint256 amount,
            bytes32 indexed cantonRecipient,
            address indexed token
        );

        /// Emitted when the relayer releases tokens
        event Unlock(address indexed token, address indexed to, uint256 amount);
    }

    /// Standard ERC-20 interface
    #[sol(rpc)]
    contract ERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);

        event Transfer(address indexed from, address indexed to, uint256 value);
        event Approval(address indexed owner, address indexed spender, uint256 value);
    }
}

/// keccak256("Deposit(address,uint256,bytes32,address)")
pub fn deposit_event_signature() -> alloy::primitives::B256 {
    alloy::primitives::keccak256(b"Deposit(address,uint256,bytes32,address)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_erc20_transfer_selector() {
        // Canonical ERC-20 transfer(address,uint256) selector
        assert_eq!(ERC20::transferCall::SELECTOR, [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(ERC20::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_deposit_event_signature_stable() {
        let sig = deposit_event_signature();
        assert_eq!(sig, deposit_event_signature());
        assert_ne!(sig, alloy::primitives::B256::ZERO);
    }
}

//! Canton-RS: Shared Chain Library for the Wayfinder Canton Bridge
//!
//! This crate provides the plumbing shared by the relayer and the RPC facade:
//!
//! - **Types** - Fingerprints, transfer lifecycle states, amount conversion
//!   between EVM wei and Canton decimal amounts
//! - **Hash Computation** - Deterministic command IDs and synthesized
//!   transaction hashes
//! - **EVM Module** - Provider wrapper, bridge/ERC-20 contract bindings,
//!   nonce-managed transaction submitter
//! - **Canton Module** - JSON Ledger API client, OAuth2 token cache, ledger
//!   value codec, template/choice builders, typed contract payload decoders
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! canton-rs = { path = "../canton-rs" }
//! ```

pub mod hash;
pub mod redact;
pub mod types;

pub mod canton;
pub mod evm;

// Re-export commonly used items at the crate root
pub use hash::{
    deposit_mint_command_id, erc20_transfer_command_id, keccak256, synthetic_tx_hash,
    withdrawal_complete_command_id,
};

pub use types::{
    decimal_to_wei, truncate_to_canton_scale, wei_to_decimal, AuditEventKind, Direction,
    Fingerprint, TransferStatus, CANTON_NUMERIC_SCALE,
};

pub use canton::{
    auth::{AuthConfig, TokenProvider},
    client::{CantonClient, CantonClientConfig, CantonError, Command, CreatedEvent, TreeEvent},
    templates::{BridgeTemplates, TemplateId},
    value::LfValue,
};

pub use evm::{
    client::EvmClient,
    signer::{EvmSigner, SubmitOutcome},
};

pub use redact::Redacted;

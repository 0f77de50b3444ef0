//! EVM gateway: read-only client, contract bindings, and the nonce-managed
//! transaction submitter.

pub mod client;
pub mod contracts;
pub mod signer;

pub use client::EvmClient;
pub use contracts::{deposit_event_signature, WayfinderBridge, ERC20};
pub use signer::{is_nonce_error, EvmSigner, SubmitOutcome};

//! Canton ledger gateway: JSON Ledger API client, OAuth token cache, value
//! codec, template set, and typed payload decoders.

pub mod auth;
pub mod client;
pub mod events;
pub mod templates;
pub mod value;

pub use auth::{AuthConfig, BearerToken, TokenProvider};
pub use client::{
    CantonClient, CantonClientConfig, CantonError, Command, CreatedEvent, LedgerUpdate,
    TransactionTree, TreeEvent,
};
pub use events::{
    AuditEvent, Cip56Holding, FingerprintMapping, WithdrawalEvent, WithdrawalEventStatus,
};
pub use templates::{BridgeTemplates, TemplateId};
pub use value::{LfValue, ValueError};

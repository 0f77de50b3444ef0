#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Note: We use String for amount fields to avoid BigDecimal/sqlx version
// conflicts. The database stores amounts as NUMERIC(38,18). When inserting we
// cast text to NUMERIC in the SQL query ($1::NUMERIC); when reading, amounts
// are cast back to TEXT.

/// A journalled cross-ledger transfer
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    /// 'deposit' or 'withdrawal'
    pub direction: String,
    pub evm_tx_hash: Option<String>,
    pub evm_block_number: Option<i64>,
    pub evm_log_index: Option<i32>,
    /// Burn-event CID for withdrawals, mint-holding CID for deposits
    pub canton_contract_id: Option<String>,
    pub token_symbol: String,
    pub amount: String,
    pub evm_address: Option<String>,
    pub fingerprint: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For inserting a detected EVM deposit
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub evm_tx_hash: String,
    pub evm_block_number: i64,
    pub evm_log_index: i32,
    pub token_symbol: String,
    pub amount: String,
    pub evm_address: String,
    pub fingerprint: String,
}

/// For inserting a detected Canton burn
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub canton_contract_id: String,
    pub token_symbol: String,
    pub amount: String,
    pub evm_address: String,
    pub fingerprint: String,
}

/// A registered bridge user
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub evm_address: String,
    pub fingerprint: String,
    pub canton_party_id: String,
    pub encrypted_canton_private_key: Option<String>,
    pub mapping_contract_id: Option<String>,
    pub last_full_reconcile_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One cached balance cell
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserBalance {
    pub fingerprint: String,
    pub token_symbol: String,
    pub balance: String,
    pub updated_at: DateTime<Utc>,
}

/// A cached Canton audit event
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditEventRow {
    pub contract_id: String,
    pub kind: String,
    pub token_symbol: String,
    pub amount: String,
    pub fingerprint: Option<String>,
    pub sender_fingerprint: Option<String>,
    pub recipient_fingerprint: Option<String>,
    pub ledger_offset: i64,
    pub created_at: DateTime<Utc>,
}

/// For inserting audit events (reconciler only)
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub contract_id: String,
    pub kind: String,
    pub token_symbol: String,
    pub amount: String,
    pub fingerprint: Option<String>,
    pub sender_fingerprint: Option<String>,
    pub recipient_fingerprint: Option<String>,
    pub ledger_offset: i64,
}

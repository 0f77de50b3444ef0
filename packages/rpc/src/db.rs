#![allow(dead_code)]

//! Facade-side journal queries
//!
//! The facade shares the relayer's schema (the relayer owns migrations) and
//! touches only the user, whitelist, balance, audit, and raw-transaction
//! tables. Transfer rows belong to the pipelines and are never written here.

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Cheap connectivity probe for health checks
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .wrap_err("Database ping failed")?;
    Ok(())
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

#[derive(Debug, Clone, FromRow)]
pub struct CachedBalance {
    pub balance: String,
    pub updated_at: DateTime<Utc>,
}

pub async fn get_user_by_evm_address(pool: &PgPool, evm_address: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE evm_address = $1"#)
        .bind(&evm_address.to_lowercase())
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up user by EVM address")?;

    Ok(row)
}

pub async fn get_user_by_fingerprint(pool: &PgPool, fingerprint: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE fingerprint = $1"#)
        .bind(fingerprint)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up user by fingerprint")?;

    Ok(row)
}

pub async fn is_whitelisted(pool: &PgPool, evm_address: &str) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r#"SELECT EXISTS(SELECT 1 FROM whitelist WHERE evm_address = $1)"#,
    )
    .bind(&evm_address.to_lowercase())
    .fetch_one(pool)
    .await
    .wrap_err("Failed to check whitelist")?;

    Ok(row.0)
}

/// Insert a newly registered user. Fails on the unique constraints when the
/// address or fingerprint is already taken.
pub async fn insert_user(
    pool: &PgPool,
    evm_address: &str,
    fingerprint: &str,
    canton_party_id: &str,
    encrypted_canton_private_key: Option<&str>,
    mapping_contract_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (evm_address, fingerprint, canton_party_id,
            encrypted_canton_private_key, mapping_contract_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&evm_address.to_lowercase())
    .bind(fingerprint)
    .bind(canton_party_id)
    .bind(encrypted_canton_private_key)
    .bind(mapping_contract_id)
    .execute(pool)
    .await
    .wrap_err("Failed to insert user")?;

    Ok(())
}

pub async fn get_cached_balance(
    pool: &PgPool,
    fingerprint: &str,
    token_symbol: &str,
) -> Result<Option<CachedBalance>> {
    let row = sqlx::query_as::<_, CachedBalance>(
        r#"SELECT balance::TEXT as balance, updated_at
           FROM user_balances WHERE fingerprint = $1 AND token_symbol = $2"#,
    )
    .bind(fingerprint)
    .bind(token_symbol)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to get cached balance")?;

    Ok(row)
}

/// Overwrite a cached balance after an on-demand refresh
pub async fn overwrite_balance(
    pool: &PgPool,
    fingerprint: &str,
    token_symbol: &str,
    balance: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_balances (fingerprint, token_symbol, balance)
        VALUES ($1, $2, $3::NUMERIC)
        ON CONFLICT (fingerprint, token_symbol) DO UPDATE
            SET balance = EXCLUDED.balance, updated_at = NOW()
        "#,
    )
    .bind(fingerprint)
    .bind(token_symbol)
    .bind(balance)
    .execute(pool)
    .await
    .wrap_err("Failed to overwrite cached balance")?;

    Ok(())
}

/// Optimistically move a transferred amount between two cached balances.
/// The reconciler's fold corrects any divergence on its next pass.
pub async fn apply_transfer_to_cache(
    pool: &PgPool,
    sender_fingerprint: &str,
    recipient_fingerprint: &str,
    token_symbol: &str,
    amount: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.wrap_err("Failed to begin transaction")?;

    sqlx::query(
        r#"UPDATE user_balances SET balance = balance - $1::NUMERIC, updated_at = NOW()
           WHERE fingerprint = $2 AND token_symbol = $3"#,
    )
    .bind(amount)
    .bind(sender_fingerprint)
    .bind(token_symbol)
    .execute(&mut *tx)
    .await
    .wrap_err("Failed to debit sender cache")?;

    sqlx::query(
        r#"
        INSERT INTO user_balances (fingerprint, token_symbol, balance)
        VALUES ($1, $2, $3::NUMERIC)
        ON CONFLICT (fingerprint, token_symbol) DO UPDATE
            SET balance = user_balances.balance + $3::NUMERIC, updated_at = NOW()
        "#,
    )
    .bind(recipient_fingerprint)
    .bind(token_symbol)
    .bind(amount)
    .execute(&mut *tx)
    .await
    .wrap_err("Failed to credit recipient cache")?;

    tx.commit().await.wrap_err("Failed to commit cache transfer")?;
    Ok(())
}

/// Total supply from the audit-event fold: mints minus burns
pub async fn fold_total_supply(pool: &PgPool, token_symbol: &str) -> Result<String> {
    let row: (String,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(
            CASE
                WHEN kind IN ('mint', 'bridge_mint') THEN amount
                WHEN kind IN ('burn', 'bridge_burn') THEN -amount
                ELSE 0
            END), 0)::TEXT
        FROM audit_events
        WHERE token_symbol = $1
        "#,
    )
    .bind(token_symbol)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to fold total supply")?;

    Ok(row.0)
}

/// Journal the raw calldata of an accepted wallet transaction before any
/// ledger work happens. Idempotent on tx hash.
pub async fn insert_evm_transaction(
    pool: &PgPool,
    tx_hash: &str,
    sender: &str,
    recipient: Option<&str>,
    amount: Option<&str>,
    raw_tx: &str,
    canton_command_id: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO evm_transactions (tx_hash, sender, recipient, amount, raw_tx,
            canton_command_id)
        VALUES ($1, $2, $3, $4::NUMERIC, $5, $6)
        ON CONFLICT (tx_hash) DO NOTHING
        "#,
    )
    .bind(tx_hash)
    .bind(&sender.to_lowercase())
    .bind(recipient.map(|r| r.to_lowercase()))
    .bind(amount)
    .bind(raw_tx)
    .bind(canton_command_id)
    .execute(pool)
    .await
    .wrap_err("Failed to insert EVM transaction")?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_evm_transaction_status(
    pool: &PgPool,
    tx_hash: &str,
    status: &str,
) -> Result<()> {
    sqlx::query(r#"UPDATE evm_transactions SET status = $1 WHERE tx_hash = $2"#)
        .bind(status)
        .bind(tx_hash)
        .execute(pool)
        .await
        .wrap_err("Failed to update EVM transaction status")?;

    Ok(())
}

/// Backfill the Canton command id once the decoded transfer executed
pub async fn mark_evm_transaction_executed(
    pool: &PgPool,
    tx_hash: &str,
    canton_command_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE evm_transactions SET status = 'executed', canton_command_id = $1
           WHERE tx_hash = $2"#,
    )
    .bind(canton_command_id)
    .bind(tx_hash)
    .execute(pool)
    .await
    .wrap_err("Failed to mark EVM transaction executed")?;

    Ok(())
}

/// Synthetic transaction count for eth_getTransactionCount: the number of
/// wallet transactions this sender has pushed through the facade.
pub async fn count_evm_transactions(pool: &PgPool, sender: &str) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM evm_transactions WHERE sender = $1"#)
            .bind(&sender.to_lowercase())
            .fetch_one(pool)
            .await
            .wrap_err("Failed to count EVM transactions")?;

    Ok(row.0)
}

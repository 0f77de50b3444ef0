#![allow(dead_code)]

//! Persistent journal: transfers, cursors, users, balances, audit events.
//!
//! The journal is the only shared mutable state in the system. Cross-worker
//! coordination uses row leases (`FOR UPDATE SKIP LOCKED` + `lease_expires_at`)
//! rather than in-process locks, and every cursor advance commits in the same
//! transaction as the rows it produced.

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::error;

pub mod models;

pub use models::*;

/// Cursor stream names
pub const CURSOR_EVM_DEPOSITS: &str = "evm_deposits";
pub const CURSOR_CANTON_BURNS: &str = "canton_burns";
pub const CURSOR_CANTON_AUDIT: &str = "canton_audit";

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// Cheap connectivity probe for health checks
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .wrap_err("Database ping failed")?;
    Ok(())
}

/// SQL SELECT columns for the transfers table (casting NUMERIC to TEXT)
const TRANSFER_SELECT: &str = r#"id, direction, evm_tx_hash, evm_block_number, evm_log_index,
    canton_contract_id, token_symbol, amount::TEXT as amount, evm_address, fingerprint,
    status, attempts, last_error, lease_expires_at, created_at, updated_at"#;

// ============ Transfers: detection ============

/// Insert a detected EVM deposit and advance the deposit cursor in one
/// transaction. Returns false when the `(tx_hash, log_index)` pair was already
/// journalled (replayed window).
pub async fn insert_deposit_detected(
    pool: &PgPool,
    deposit: &NewDeposit,
    cursor_position: i64,
) -> Result<bool> {
    let mut tx = pool.begin().await.wrap_err("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO transfers (direction, evm_tx_hash, evm_block_number, evm_log_index,
            token_symbol, amount, evm_address, fingerprint, status)
        VALUES ('deposit', $1, $2, $3, $4, $5::NUMERIC, $6, $7, 'detected')
        ON CONFLICT (evm_tx_hash, evm_log_index) WHERE direction = 'deposit' DO NOTHING
        "#,
    )
    .bind(&deposit.evm_tx_hash)
    .bind(deposit.evm_block_number)
    .bind(deposit.evm_log_index)
    .bind(&deposit.token_symbol)
    .bind(&deposit.amount)
    .bind(&deposit.evm_address)
    .bind(&deposit.fingerprint)
    .execute(&mut *tx)
    .await
    .wrap_err("Failed to insert detected deposit")?;

    advance_cursor_tx(&mut tx, CURSOR_EVM_DEPOSITS, cursor_position).await?;

    tx.commit().await.wrap_err("Failed to commit deposit detection")?;
    Ok(result.rows_affected() > 0)
}

/// Insert a detected Canton burn and advance the burn cursor in one
/// transaction. Returns false when the contract id was already journalled.
pub async fn insert_withdrawal_detected(
    pool: &PgPool,
    withdrawal: &NewWithdrawal,
    cursor_position: i64,
) -> Result<bool> {
    let mut tx = pool.begin().await.wrap_err("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO transfers (direction, canton_contract_id, token_symbol, amount,
            evm_address, fingerprint, status)
        VALUES ('withdrawal', $1, $2, $3::NUMERIC, $4, $5, 'detected')
        ON CONFLICT (canton_contract_id) WHERE direction = 'withdrawal' DO NOTHING
        "#,
    )
    .bind(&withdrawal.canton_contract_id)
    .bind(&withdrawal.token_symbol)
    .bind(&withdrawal.amount)
    .bind(&withdrawal.evm_address)
    .bind(&withdrawal.fingerprint)
    .execute(&mut *tx)
    .await
    .wrap_err("Failed to insert detected withdrawal")?;

    advance_cursor_tx(&mut tx, CURSOR_CANTON_BURNS, cursor_position).await?;

    tx.commit()
        .await
        .wrap_err("Failed to commit withdrawal detection")?;
    Ok(result.rows_affected() > 0)
}

// ============ Transfers: claiming and state transitions ============

/// Claim up to `batch_size` transfers for processing, leasing each row for
/// `lease_seconds`. Expired leases are reclaimable, which is how crash
/// recovery restarts stuck transfers. Rows claimed by a live worker are
/// skipped (`FOR UPDATE SKIP LOCKED` plus the lease check).
pub async fn claim_transfers(
    pool: &PgPool,
    direction: &str,
    statuses: &[&str],
    max_attempts: i32,
    lease_seconds: i64,
    batch_size: i64,
) -> Result<Vec<Transfer>> {
    let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
    let query = format!(
        r#"
        UPDATE transfers SET lease_expires_at = NOW() + make_interval(secs => $1),
            updated_at = NOW()
        WHERE id IN (
            SELECT id FROM transfers
            WHERE direction = $2
              AND status = ANY($3)
              AND attempts < $4
              AND (lease_expires_at IS NULL OR lease_expires_at <= NOW())
            ORDER BY created_at ASC
            LIMIT $5
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {}
        "#,
        TRANSFER_SELECT
    );

    let rows = sqlx::query_as::<_, Transfer>(&query)
        .bind(lease_seconds as f64)
        .bind(direction)
        .bind(&statuses)
        .bind(max_attempts)
        .bind(batch_size)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            error!("SQL error claiming transfers: {:?}", e);
            e
        })
        .wrap_err("Failed to claim transfers")?;

    Ok(rows)
}

/// Monotone CAS on status. Returns false when the row was not in `from`
/// anymore (another worker advanced it first).
pub async fn update_transfer_status(
    pool: &PgPool,
    id: i64,
    from: &str,
    to: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE transfers SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3"#,
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to update transfer {} status to {}", id, to))?;

    Ok(result.rows_affected() > 0)
}

/// Deposit: record the minted holding CID while moving submitted -> confirmed
pub async fn update_deposit_confirmed(pool: &PgPool, id: i64, holding_cid: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE transfers SET status = 'confirmed', canton_contract_id = $1, updated_at = NOW()
           WHERE id = $2 AND status = 'submitted'"#,
    )
    .bind(holding_cid)
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to confirm deposit {}", id))?;

    Ok(result.rows_affected() > 0)
}

/// Withdrawal: record the unlock tx hash while moving ready -> submitted
pub async fn update_withdrawal_submitted(pool: &PgPool, id: i64, tx_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"UPDATE transfers SET status = 'submitted', evm_tx_hash = $1, attempts = attempts + 1,
               updated_at = NOW()
           WHERE id = $2 AND status = 'ready'"#,
    )
    .bind(tx_hash)
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to mark withdrawal {} submitted", id))?;

    Ok(result.rows_affected() > 0)
}

/// Terminal failure; operator intervention required from here.
pub async fn update_transfer_failed(pool: &PgPool, id: i64, error_message: &str) -> Result<()> {
    sqlx::query(
        r#"UPDATE transfers SET status = 'failed', last_error = $1, attempts = attempts + 1,
               lease_expires_at = NULL, updated_at = NOW()
           WHERE id = $2"#,
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to mark transfer {} failed", id))?;

    Ok(())
}

/// Transient failure: bump attempts, record the error, optionally rewind the
/// status, and hold the lease for the backoff window so the next claim waits
/// it out.
pub async fn record_transfer_retry(
    pool: &PgPool,
    id: i64,
    status: &str,
    error_message: &str,
    backoff_seconds: f64,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE transfers SET status = $1, last_error = $2, attempts = attempts + 1,
               lease_expires_at = NOW() + make_interval(secs => $3), updated_at = NOW()
           WHERE id = $4"#,
    )
    .bind(status)
    .bind(error_message)
    .bind(backoff_seconds)
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to record retry for transfer {}", id))?;

    Ok(())
}

/// Release a lease without touching status (work finished or deferred)
pub async fn release_lease(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query(
        r#"UPDATE transfers SET lease_expires_at = NULL, updated_at = NOW() WHERE id = $1"#,
    )
    .bind(id)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to release lease on transfer {}", id))?;

    Ok(())
}

/// Transfers stuck in submitted with an unlock hash, for receipt re-observation
pub async fn get_submitted_withdrawals(pool: &PgPool) -> Result<Vec<Transfer>> {
    let query = format!(
        "SELECT {} FROM transfers WHERE direction = 'withdrawal' AND status = 'submitted'",
        TRANSFER_SELECT
    );
    let rows = sqlx::query_as::<_, Transfer>(&query)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to get submitted withdrawals")?;

    Ok(rows)
}

// ============ Cursors ============

/// Get a cursor position; None when the stream has never been processed
pub async fn get_cursor(pool: &PgPool, name: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> =
        sqlx::query_as(r#"SELECT position FROM cursors WHERE name = $1"#)
            .bind(name)
            .fetch_optional(pool)
            .await
            .wrap_err_with(|| format!("Failed to get cursor {}", name))?;

    Ok(row.map(|r| r.0))
}

/// Advance a cursor inside an open transaction. GREATEST() enforces that a
/// cursor never regresses even under concurrent writers.
pub async fn advance_cursor_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    position: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cursors (name, position)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE
            SET position = GREATEST(cursors.position, EXCLUDED.position), updated_at = NOW()
        "#,
    )
    .bind(name)
    .bind(position)
    .execute(&mut **tx)
    .await
    .wrap_err_with(|| format!("Failed to advance cursor {}", name))?;

    Ok(())
}

/// Monotone cursor advance outside a transaction (window tails with no rows)
pub async fn advance_cursor(pool: &PgPool, name: &str, position: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cursors (name, position)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE
            SET position = GREATEST(cursors.position, EXCLUDED.position), updated_at = NOW()
        "#,
    )
    .bind(name)
    .bind(position)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to advance cursor {}", name))?;

    Ok(())
}

/// Set a cursor unconditionally (initial seeding, full reconcile reset)
pub async fn set_cursor(pool: &PgPool, name: &str, position: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cursors (name, position)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET position = EXCLUDED.position, updated_at = NOW()
        "#,
    )
    .bind(name)
    .bind(position)
    .execute(pool)
    .await
    .wrap_err_with(|| format!("Failed to set cursor {}", name))?;

    Ok(())
}

// ============ Users ============

pub async fn get_user_by_fingerprint(pool: &PgPool, fingerprint: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE fingerprint = $1"#)
        .bind(fingerprint)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up user by fingerprint")?;

    Ok(row)
}

pub async fn get_user_by_evm_address(pool: &PgPool, evm_address: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE evm_address = $1"#)
        .bind(&evm_address.to_lowercase())
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up user by EVM address")?;

    Ok(row)
}

/// Insert or refresh a user row. The fingerprint <-> evm_address bijection is
/// enforced by the table's unique constraints.
pub async fn upsert_user(
    pool: &PgPool,
    evm_address: &str,
    fingerprint: &str,
    canton_party_id: &str,
    encrypted_canton_private_key: Option<&str>,
    mapping_contract_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (evm_address, fingerprint, canton_party_id,
            encrypted_canton_private_key, mapping_contract_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (evm_address) DO UPDATE SET
            canton_party_id = EXCLUDED.canton_party_id,
            encrypted_canton_private_key = COALESCE(EXCLUDED.encrypted_canton_private_key,
                                                    users.encrypted_canton_private_key),
            mapping_contract_id = COALESCE(EXCLUDED.mapping_contract_id,
                                           users.mapping_contract_id),
            updated_at = NOW()
        "#,
    )
    .bind(&evm_address.to_lowercase())
    .bind(fingerprint)
    .bind(canton_party_id)
    .bind(encrypted_canton_private_key)
    .bind(mapping_contract_id)
    .execute(pool)
    .await
    .wrap_err("Failed to upsert user")?;

    Ok(())
}

/// Record the FingerprintMapping CID once registration settles on Canton
pub async fn set_user_mapping(
    pool: &PgPool,
    fingerprint: &str,
    mapping_contract_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE users SET mapping_contract_id = $1, updated_at = NOW() WHERE fingerprint = $2"#,
    )
    .bind(mapping_contract_id)
    .bind(fingerprint)
    .execute(pool)
    .await
    .wrap_err("Failed to set user mapping contract id")?;

    Ok(())
}

pub async fn mark_full_reconcile(pool: &PgPool, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(r#"UPDATE users SET last_full_reconcile_at = $1, updated_at = NOW()"#)
        .bind(at)
        .execute(pool)
        .await
        .wrap_err("Failed to mark full reconcile")?;

    Ok(())
}

// ============ Whitelist ============

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

// ============ Balances ============

pub async fn get_balance(
    pool: &PgPool,
    fingerprint: &str,
    token_symbol: &str,
) -> Result<Option<UserBalance>> {
    let row = sqlx::query_as::<_, UserBalance>(
        r#"SELECT fingerprint, token_symbol, balance::TEXT as balance, updated_at
           FROM user_balances WHERE fingerprint = $1 AND token_symbol = $2"#,
    )
    .bind(fingerprint)
    .bind(token_symbol)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to get cached balance")?;

    Ok(row)
}

/// Overwrite a cached balance (on-demand refresh, drift repair: the fold wins)
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

// ============ Audit events ============

/// Apply a batch of audit events and advance the audit cursor in one
/// transaction. Insertion is idempotent on contract_id; balance deltas are
/// applied only for events actually inserted, so replaying a window leaves
/// every balance unchanged.
pub async fn apply_audit_events(
    pool: &PgPool,
    events: &[NewAuditEvent],
    cursor_position: i64,
) -> Result<usize> {
    let mut tx = pool.begin().await.wrap_err("Failed to begin transaction")?;
    let mut applied = 0usize;

    for event in events {
        let inserted = sqlx::query(
            r#"
            INSERT INTO audit_events (contract_id, kind, token_symbol, amount, fingerprint,
                sender_fingerprint, recipient_fingerprint, ledger_offset)
            VALUES ($1, $2, $3, $4::NUMERIC, $5, $6, $7, $8)
            ON CONFLICT (contract_id) DO NOTHING
            "#,
        )
        .bind(&event.contract_id)
        .bind(&event.kind)
        .bind(&event.token_symbol)
        .bind(&event.amount)
        .bind(&event.fingerprint)
        .bind(&event.sender_fingerprint)
        .bind(&event.recipient_fingerprint)
        .bind(event.ledger_offset)
        .execute(&mut *tx)
        .await
        .wrap_err("Failed to insert audit event")?;

        if inserted.rows_affected() == 0 {
            continue;
        }
        applied += 1;

        match event.kind.as_str() {
            "mint" | "bridge_mint" => {
                if let Some(fp) = &event.fingerprint {
                    apply_delta_tx(&mut tx, fp, &event.token_symbol, &event.amount, false).await?;
                }
            }
            "burn" | "bridge_burn" => {
                if let Some(fp) = &event.fingerprint {
                    apply_delta_tx(&mut tx, fp, &event.token_symbol, &event.amount, true).await?;
                }
            }
            "transfer" => {
                if let Some(fp) = &event.sender_fingerprint {
                    apply_delta_tx(&mut tx, fp, &event.token_symbol, &event.amount, true).await?;
                }
                if let Some(fp) = &event.recipient_fingerprint {
                    apply_delta_tx(&mut tx, fp, &event.token_symbol, &event.amount, false).await?;
                }
            }
            other => {
                error!(kind = other, contract_id = %event.contract_id, "Unknown audit event kind");
            }
        }
    }

    advance_cursor_tx(&mut tx, CURSOR_CANTON_AUDIT, cursor_position).await?;
    tx.commit().await.wrap_err("Failed to commit audit batch")?;

    Ok(applied)
}

async fn apply_delta_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    fingerprint: &str,
    token_symbol: &str,
    amount: &str,
    negate: bool,
) -> Result<()> {
    let query = if negate {
        r#"
        INSERT INTO user_balances (fingerprint, token_symbol, balance)
        VALUES ($1, $2, -($3::NUMERIC))
        ON CONFLICT (fingerprint, token_symbol) DO UPDATE
            SET balance = user_balances.balance - $3::NUMERIC, updated_at = NOW()
        "#
    } else {
        r#"
        INSERT INTO user_balances (fingerprint, token_symbol, balance)
        VALUES ($1, $2, $3::NUMERIC)
        ON CONFLICT (fingerprint, token_symbol) DO UPDATE
            SET balance = user_balances.balance + $3::NUMERIC, updated_at = NOW()
        "#
    };

    sqlx::query(query)
        .bind(fingerprint)
        .bind(token_symbol)
        .bind(amount)
        .execute(&mut **tx)
        .await
        .wrap_err("Failed to apply balance delta")?;

    Ok(())
}

/// Record a single audit event outside the stream (pipeline-local appends,
/// e.g. the BRIDGE_MINT written when a deposit closes). Idempotent.
pub async fn record_audit_event(pool: &PgPool, event: &NewAuditEvent) -> Result<bool> {
    let events = std::slice::from_ref(event);
    // Reuse the transactional path with the cursor left where it is: a
    // pipeline append must not jump the stream cursor past events the
    // reconciler has not folded yet.
    let cursor = get_cursor(pool, CURSOR_CANTON_AUDIT).await?.unwrap_or(0);
    let applied = apply_audit_events(pool, events, cursor).await?;
    Ok(applied > 0)
}

/// Fold the audit-event cache for one (fingerprint, symbol): mints minus
/// burns plus transfers in minus transfers out. The source of truth for
/// cached balances.
pub async fn fold_audit_balance(
    pool: &PgPool,
    fingerprint: &str,
    token_symbol: &str,
) -> Result<String> {
    let row: (String,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(
            CASE
                WHEN kind IN ('mint', 'bridge_mint') AND fingerprint = $1 THEN amount
                WHEN kind IN ('burn', 'bridge_burn') AND fingerprint = $1 THEN -amount
                WHEN kind = 'transfer' AND recipient_fingerprint = $1
                     AND (sender_fingerprint IS DISTINCT FROM $1) THEN amount
                WHEN kind = 'transfer' AND sender_fingerprint = $1
                     AND (recipient_fingerprint IS DISTINCT FROM $1) THEN -amount
                ELSE 0
            END), 0)::TEXT
        FROM audit_events
        WHERE token_symbol = $2
          AND (fingerprint = $1 OR sender_fingerprint = $1 OR recipient_fingerprint = $1)
        "#,
    )
    .bind(fingerprint)
    .bind(token_symbol)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to fold audit events")?;

    Ok(row.0)
}

/// Total supply on the Canton side: all mints minus all burns
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

/// Distinct fingerprints appearing in the audit cache (full reconcile)
pub async fn audit_fingerprints(pool: &PgPool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT DISTINCT fp, token_symbol FROM (
            SELECT fingerprint AS fp, token_symbol FROM audit_events WHERE fingerprint IS NOT NULL
            UNION
            SELECT sender_fingerprint, token_symbol FROM audit_events
                WHERE sender_fingerprint IS NOT NULL
            UNION
            SELECT recipient_fingerprint, token_symbol FROM audit_events
                WHERE recipient_fingerprint IS NOT NULL
        ) pairs
        "#,
    )
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list audit fingerprints")?;

    Ok(rows)
}

/// Full-mode reset: wipe the audit cache and zero every cached balance.
/// The caller replays the stream from offset 0 afterwards.
pub async fn reset_audit_state(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await.wrap_err("Failed to begin transaction")?;

    sqlx::query(r#"DELETE FROM audit_events"#)
        .execute(&mut *tx)
        .await
        .wrap_err("Failed to clear audit events")?;
    sqlx::query(r#"UPDATE user_balances SET balance = 0, updated_at = NOW()"#)
        .execute(&mut *tx)
        .await
        .wrap_err("Failed to zero cached balances")?;
    sqlx::query(r#"UPDATE cursors SET position = 0, updated_at = NOW() WHERE name = $1"#)
        .bind(CURSOR_CANTON_AUDIT)
        .execute(&mut *tx)
        .await
        .wrap_err("Failed to reset audit cursor")?;

    tx.commit().await.wrap_err("Failed to commit audit reset")?;
    Ok(())
}

// ============ API / status queries ============

/// Journal view for GET /api/v1/transfers
pub async fn list_transfers(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Transfer>> {
    let query = format!(
        "SELECT {} FROM transfers ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        TRANSFER_SELECT
    );
    let rows = sqlx::query_as::<_, Transfer>(&query)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list transfers")?;

    Ok(rows)
}

pub async fn count_transfers_by_status(
    pool: &PgPool,
    direction: &str,
    status: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM transfers WHERE direction = $1 AND status = $2"#,
    )
    .bind(direction)
    .bind(status)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to count transfers")?;

    Ok(row.0)
}

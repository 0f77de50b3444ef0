//! Balance reconciler: folds Canton audit events into cached balances
//!
//! The audit-event stream is the source of truth for every balance the facade
//! serves. Incremental mode streams from `Cursor(canton_audit)` to the ledger
//! end, upserting events (idempotent on contract id) and applying deltas in
//! the same transaction that advances the cursor. Full mode resets the cache
//! and replays from offset zero. A periodic audit pass re-folds every cached
//! cell and overwrites any drift — the fold always wins.

use bigdecimal::BigDecimal;
use chrono::Utc;
use eyre::Result;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use canton_rs::canton::{AuditEvent, CantonClient, TreeEvent};
use canton_rs::BridgeTemplates;

use crate::config::Config;
use crate::db::{self, NewAuditEvent};
use crate::metrics;

/// Audit (fold-vs-cache) pass frequency, in incremental ticks
const AUDIT_EVERY_TICKS: u64 = 60;

pub struct Reconciler {
    db: PgPool,
    canton: Arc<CantonClient>,
    templates: BridgeTemplates,
    poll_interval: Duration,
}

impl Reconciler {
    pub fn new(config: &Config, db: PgPool, canton: Arc<CantonClient>) -> Self {
        Self {
            db,
            canton,
            templates: config.templates(),
            poll_interval: Duration::from_millis(config.canton.polling_interval_ms),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Balance reconciler started");
        let mut tick: u64 = 0;

        loop {
            tick = tick.wrapping_add(1);

            if let Err(e) = self.incremental_tick().await {
                metrics::ERRORS
                    .with_label_values(&["reconciler", "transient"])
                    .inc();
                warn!(error = %e, "Reconciler tick failed");
            } else {
                metrics::LAST_SUCCESSFUL_POLL
                    .with_label_values(&["reconciler"])
                    .set(Utc::now().timestamp() as f64);
            }

            if tick % AUDIT_EVERY_TICKS == 0 {
                if let Err(e) = self.audit_pass().await {
                    warn!(error = %e, "Reconciler audit pass failed");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Stream new audit events and fold them into the cache
    pub async fn incremental_tick(&self) -> Result<()> {
        let begin = db::get_cursor(&self.db, db::CURSOR_CANTON_AUDIT)
            .await?
            .unwrap_or(0);
        let end = self.canton.ledger_end().await?;
        if end <= begin {
            return Ok(());
        }

        let events = self.collect_events(begin, end).await?;
        let count = events.len();
        let applied = db::apply_audit_events(&self.db, &events, end).await?;

        for event in &events {
            metrics::AUDIT_EVENTS_APPLIED
                .with_label_values(&[event.kind.as_str()])
                .inc();
        }
        metrics::CURSOR_POSITION
            .with_label_values(&["canton_audit"])
            .set(end as f64);

        if count > 0 {
            debug!(
                begin,
                end,
                seen = count,
                applied,
                "Audit window folded"
            );
        }
        Ok(())
    }

    /// Full mode: zero every cached balance and replay the whole stream.
    /// Used after schema changes or suspected drift.
    pub async fn full_reconcile(&self) -> Result<()> {
        // Capture the end before resetting so the cursor lands exactly on the
        // offset the replay covered.
        let end = self.canton.ledger_end().await?;
        info!(end, "Starting full reconciliation");

        db::reset_audit_state(&self.db).await?;

        let events = self.collect_events(0, end).await?;
        let applied = db::apply_audit_events(&self.db, &events, end).await?;
        db::mark_full_reconcile(&self.db, Utc::now()).await?;

        metrics::FULL_RECONCILES.with_label_values(&["manual"]).inc();
        info!(applied, end, "Full reconciliation complete");
        Ok(())
    }

    async fn collect_events(&self, begin: i64, end: i64) -> Result<Vec<NewAuditEvent>> {
        let updates = self
            .canton
            .updates(begin, end, &self.templates.audit_event_templates())
            .await?;

        let mut events = Vec::new();
        for update in &updates {
            for tree_event in &update.events {
                let created = match tree_event {
                    TreeEvent::Created(ev) => ev,
                    TreeEvent::Archived(_) => continue,
                };
                match AuditEvent::from_created(&self.templates, created)? {
                    Some(audit) => events.push(NewAuditEvent {
                        contract_id: audit.contract_id,
                        kind: audit.kind.as_str().to_string(),
                        token_symbol: audit.token_symbol,
                        amount: audit.amount.to_string(),
                        fingerprint: audit.fingerprint.map(|f| f.to_hex()),
                        sender_fingerprint: audit.sender_fingerprint.map(|f| f.to_hex()),
                        recipient_fingerprint: audit.recipient_fingerprint.map(|f| f.to_hex()),
                        ledger_offset: update.offset,
                    }),
                    None => continue,
                }
            }
        }
        Ok(events)
    }

    /// Compare every cached balance against its fold; the fold wins.
    async fn audit_pass(&self) -> Result<()> {
        let pairs = db::audit_fingerprints(&self.db).await?;
        let mut repaired = 0usize;

        for (fingerprint, symbol) in &pairs {
            let fold = db::fold_audit_balance(&self.db, fingerprint, symbol).await?;
            let cached = db::get_balance(&self.db, fingerprint, symbol)
                .await?
                .map(|b| b.balance)
                .unwrap_or_else(|| "0".to_string());

            let fold_dec = BigDecimal::from_str(&fold).unwrap_or_default();
            let cached_dec = BigDecimal::from_str(&cached).unwrap_or_default();

            if fold_dec != cached_dec {
                warn!(
                    fingerprint = %fingerprint,
                    symbol = %symbol,
                    cached = %cached_dec,
                    fold = %fold_dec,
                    "Cached balance drifted, overwriting with fold"
                );
                db::overwrite_balance(&self.db, fingerprint, symbol, &fold).await?;
                repaired += 1;
            }
        }

        if repaired > 0 {
            info!(repaired, checked = pairs.len(), "Balance audit repaired drift");
        }
        Ok(())
    }
}

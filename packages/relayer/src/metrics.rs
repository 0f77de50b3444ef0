//! Prometheus metrics for the Wayfinder bridge relayer
//!
//! Exposed on the status API's /metrics endpoint for scraping.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Gauge, GaugeVec, HistogramVec,
};

lazy_static! {
    // Stream progress
    pub static ref CURSOR_POSITION: GaugeVec = register_gauge_vec!(
        "bridge_cursor_position",
        "Current position of each stream cursor",
        &["stream"]
    ).unwrap();

    pub static ref BLOCKS_PROCESSED: CounterVec = register_counter_vec!(
        "bridge_blocks_processed_total",
        "Total number of EVM blocks scanned for deposits",
        &["chain"]
    ).unwrap();

    // Transfer pipeline
    pub static ref DEPOSITS_DETECTED: CounterVec = register_counter_vec!(
        "bridge_deposits_detected_total",
        "Total number of deposit events journalled",
        &["token"]
    ).unwrap();

    pub static ref WITHDRAWALS_DETECTED: CounterVec = register_counter_vec!(
        "bridge_withdrawals_detected_total",
        "Total number of Canton burn events journalled",
        &["token"]
    ).unwrap();

    pub static ref MINTS_SUBMITTED: CounterVec = register_counter_vec!(
        "bridge_mints_submitted_total",
        "Total number of Canton mint commands submitted",
        &["status"]
    ).unwrap();

    pub static ref UNLOCKS_SUBMITTED: CounterVec = register_counter_vec!(
        "bridge_unlocks_submitted_total",
        "Total number of EVM unlock transactions submitted",
        &["status"]
    ).unwrap();

    pub static ref TRANSFERS_CLOSED: CounterVec = register_counter_vec!(
        "bridge_transfers_closed_total",
        "Total number of transfers that reached the closed state",
        &["direction"]
    ).unwrap();

    pub static ref TRANSFERS_FAILED: CounterVec = register_counter_vec!(
        "bridge_transfers_failed_total",
        "Total number of transfers that failed permanently",
        &["direction"]
    ).unwrap();

    // Processing latency from detection to close
    pub static ref PROCESSING_LATENCY: HistogramVec = register_histogram_vec!(
        "bridge_processing_latency_seconds",
        "Time from detection to close per transfer",
        &["direction"],
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Reconciler
    pub static ref AUDIT_EVENTS_APPLIED: CounterVec = register_counter_vec!(
        "bridge_audit_events_applied_total",
        "Total number of audit events folded into cached balances",
        &["kind"]
    ).unwrap();

    pub static ref FULL_RECONCILES: CounterVec = register_counter_vec!(
        "bridge_full_reconciles_total",
        "Total number of full-mode reconciliations",
        &["trigger"]
    ).unwrap();

    // Errors
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "bridge_errors_total",
        "Total number of errors by component and class",
        &["component", "class"]
    ).unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "bridge_relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "bridge_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["component"]
    ).unwrap();
}

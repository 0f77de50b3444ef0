//! Prometheus metrics for the RPC facade

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

/// Facade metrics with their own registry
pub struct Metrics {
    pub requests_total: IntCounterVec,
    pub request_errors_total: IntCounterVec,
    pub request_latency: HistogramVec,
    pub registrations_total: IntCounterVec,
    pub transfers_total: IntCounterVec,
    pub queue_depth: IntGauge,
    pub rejected_backpressure_total: IntCounterVec,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("facade_requests_total", "Total JSON-RPC requests by method"),
            &["method"],
        )
        .expect("constant metric name is valid");

        let request_errors_total = IntCounterVec::new(
            Opts::new(
                "facade_request_errors_total",
                "Total JSON-RPC error responses by method and code",
            ),
            &["method", "code"],
        )
        .expect("constant metric name is valid");

        let request_latency = HistogramVec::new(
            HistogramOpts::new(
                "facade_request_latency_seconds",
                "JSON-RPC request latency by method",
            )
            .buckets(vec![0.005, 0.025, 0.1, 0.25, 1.0, 2.5, 10.0]),
            &["method"],
        )
        .expect("constant metric name is valid");

        let registrations_total = IntCounterVec::new(
            Opts::new("facade_registrations_total", "Total registrations by path"),
            &["path"],
        )
        .expect("constant metric name is valid");

        let transfers_total = IntCounterVec::new(
            Opts::new(
                "facade_transfers_total",
                "Total Canton transfers executed by entry point",
            ),
            &["entry"],
        )
        .expect("constant metric name is valid");

        let queue_depth = IntGauge::new(
            "facade_submission_queue_depth",
            "Canton submissions currently in flight",
        )
        .expect("constant metric name is valid");

        let rejected_backpressure_total = IntCounterVec::new(
            Opts::new(
                "facade_rejected_backpressure_total",
                "Requests rejected with 429 by cause",
            ),
            &["cause"],
        )
        .expect("constant metric name is valid");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(request_errors_total.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(request_latency.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(registrations_total.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(transfers_total.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(queue_depth.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(rejected_backpressure_total.clone()))
            .expect("metric registers once");

        Self {
            requests_total,
            request_errors_total,
            request_latency,
            registrations_total,
            transfers_total,
            queue_depth,
            rejected_backpressure_total,
            registry,
        }
    }
}

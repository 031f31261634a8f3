// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the expense operator.
//!
//! Metrics use the namespace prefix `expense_app_majorov_biz_` (prometheus-safe
//! version of "expense-app.majorov.biz") and live in a process-wide registry.
//! The operator does not serve them over HTTP; [`gather_metrics`] renders the
//! registry for whatever embeds the operator.
//!
//! # Example
//!
//! ```rust,no_run
//! use expense_operator::metrics::record_reconciliation;
//!
//! record_reconciliation("success", std::time::Duration::from_millis(120));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all operator metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "expense_app_majorov_biz";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of `Database` reconciliations by outcome
///
/// Labels:
/// - `outcome`: `success`, `retry`, `await_spec_change`, `fatal`, `timeout`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of Database reconciliations by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation passes in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of Database reconciliation passes in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of requeues after a failed pass
///
/// Labels:
/// - `reason`: error category (`reference`, `transient`, `conflict`, `not_owned`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of Database requeues by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Child Object Metrics
// ============================================================================

/// Total number of child object writes
///
/// Labels:
/// - `kind`: `Deployment`, `Service` or `PersistentVolumeClaim`
/// - `action`: `created`, `patched` or `deleted`
pub static CHILD_OBJECT_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_child_object_writes_total"),
        "Total number of writes to managed child objects by kind and action",
    );
    let counter = CounterVec::new(opts, &["kind", "action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of status writes that lost an optimistic concurrency race
pub static STATUS_CONFLICTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_status_conflicts_total"),
        "Total number of Database status writes rejected with a conflict",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Record a finished reconciliation pass
pub fn record_reconciliation(outcome: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[outcome]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record a requeue after a failed pass
pub fn record_requeue(reason: &str) {
    REQUEUE_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a write to a managed child object
///
/// # Arguments
/// * `kind` - Kind of the child object
/// * `action` - `created`, `patched` or `deleted`
pub fn record_child_write(kind: &str, action: &str) {
    CHILD_OBJECT_WRITES_TOTAL
        .with_label_values(&[kind, action])
        .inc();
}

/// Record the result of a status write that hit a conflict
///
/// # Arguments
/// * `result` - `retried`, `superseded` or `exhausted`
pub fn record_status_conflict(result: &str) {
    STATUS_CONFLICTS_TOTAL.with_label_values(&[result]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns an error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;

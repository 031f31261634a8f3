// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Operator configuration.
//!
//! Every setting can be passed as a command line flag or through the
//! environment variable named next to it. Flags win over the environment.

use crate::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_CONFLICT_RETRIES, DEFAULT_RECONCILE_TIMEOUT_SECS,
    DEFAULT_REQUEUE_BASE_SECS, DEFAULT_REQUEUE_MAX_SECS, DEFAULT_STATUS_UPDATE_ATTEMPTS,
    FIELD_MANAGER,
};
use crate::reconcilers::retry::RequeueBackoff;
use clap::{Parser, ValueEnum};
use std::time::Duration;

/// Default interval for re-checking a healthy `Database` (seconds)
const DEFAULT_RESYNC_SECS: u64 = 300;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human readable lines with ANSI colors
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "expense-operator", version, about, long_about = None)]
pub struct OperatorConfig {
    /// Only watch `Database` resources in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Field manager recorded on every write
    #[arg(long, env = "FIELD_MANAGER", default_value = FIELD_MANAGER)]
    pub field_manager: String,

    /// Maximum number of `Database` resources reconciled in parallel
    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: u16,

    /// Requeue delay after the first failed pass, in seconds
    #[arg(long, env = "REQUEUE_BASE_SECS", default_value_t = DEFAULT_REQUEUE_BASE_SECS)]
    pub requeue_base_secs: u64,

    /// Upper bound on the requeue delay after repeated failures, in seconds
    #[arg(long, env = "REQUEUE_MAX_SECS", default_value_t = DEFAULT_REQUEUE_MAX_SECS)]
    pub requeue_max_secs: u64,

    /// Attempts at writing status before a conflict is surfaced
    #[arg(long, env = "STATUS_UPDATE_ATTEMPTS", default_value_t = DEFAULT_STATUS_UPDATE_ATTEMPTS)]
    pub status_update_attempts: u32,

    /// Consecutive write conflicts requeued immediately before they are
    /// treated as transient failures with backoff
    #[arg(long, env = "CONFLICT_RETRIES", default_value_t = DEFAULT_CONFLICT_RETRIES)]
    pub conflict_retries: u32,

    /// Upper bound on a single reconciliation pass, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = DEFAULT_RECONCILE_TIMEOUT_SECS)]
    pub reconcile_timeout_secs: u64,

    /// Interval for re-checking a `Database` after a successful pass, in seconds
    #[arg(long, env = "RESYNC_SECS", default_value_t = DEFAULT_RESYNC_SECS)]
    pub resync_secs: u64,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            field_manager: FIELD_MANAGER.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            requeue_base_secs: DEFAULT_REQUEUE_BASE_SECS,
            requeue_max_secs: DEFAULT_REQUEUE_MAX_SECS,
            status_update_attempts: DEFAULT_STATUS_UPDATE_ATTEMPTS,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            resync_secs: DEFAULT_RESYNC_SECS,
            log_format: LogFormat::Text,
        }
    }
}

impl OperatorConfig {
    /// Requeue backoff built from the configured bounds.
    ///
    /// A maximum below the base is raised to the base.
    #[must_use]
    pub fn backoff(&self) -> RequeueBackoff {
        let base = Duration::from_secs(self.requeue_base_secs.max(1));
        let max = Duration::from_secs(self.requeue_max_secs).max(base);
        RequeueBackoff::new(base, max)
    }

    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs.max(1))
    }

    #[must_use]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs.max(1))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;

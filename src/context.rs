// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Shared context for the `Database` controller.
//!
//! The controller receives an `Arc<Context<C>>` that holds:
//! - the cluster client every read and write goes through
//! - the operator configuration
//! - per-object failure and conflict counts for requeue backoff
//!
//! The client is a type parameter so unit tests can run full reconciliation
//! passes against an in-memory cluster.

use crate::client::ClusterClient;
use crate::config::OperatorConfig;
use crate::reconcilers::retry::{RequeueBackoff, RequeueTracker};

/// Shared context passed to every reconciliation.
pub struct Context<C: ClusterClient> {
    /// Cluster client for API operations
    pub client: C,

    /// Operator configuration
    pub config: OperatorConfig,

    /// Requeue backoff derived from the configuration
    pub backoff: RequeueBackoff,

    /// Consecutive failures per `Database`
    pub requeues: RequeueTracker,

    /// Consecutive write conflicts per `Database`
    pub conflicts: RequeueTracker,
}

impl<C: ClusterClient> Context<C> {
    #[must_use]
    pub fn new(client: C, config: OperatorConfig) -> Self {
        let backoff = config.backoff();
        Self {
            client,
            config,
            backoff,
            requeues: RequeueTracker::new(),
            conflicts: RequeueTracker::new(),
        }
    }

    /// Requeue delay for the next retry of `key`, advancing its failure count.
    pub fn next_requeue(&self, key: &str) -> std::time::Duration {
        self.backoff.delay(self.requeues.next_attempt(key))
    }

    /// Record a write conflict for `key`.
    ///
    /// Returns `true` while the conflict may still be retried immediately,
    /// `false` once `conflict_retries` consecutive conflicts have been seen.
    pub fn retry_conflict_now(&self, key: &str) -> bool {
        self.conflicts.next_attempt(key) < self.config.conflict_retries
    }

    /// Drop all retry state for `key`, after a successful pass or once the
    /// `Database` is gone.
    pub fn forget(&self, key: &str) {
        self.requeues.reset(key);
        self.conflicts.reset(key);
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;

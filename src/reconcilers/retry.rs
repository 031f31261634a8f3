// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Requeue backoff for failed reconciliations.
//!
//! A failed pass is not retried in place. The controller requeues the
//! `Database` after a delay that grows exponentially with the number of
//! consecutive failures for that object, capped at a maximum interval.
//! The failure count resets on the first successful pass.

use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Attempt-indexed exponential backoff with jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct RequeueBackoff {
    /// Delay after the first failure
    pub initial_interval: Duration,
    /// Maximum delay between retries
    pub max_interval: Duration,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
}

impl RequeueBackoff {
    #[must_use]
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            initial_interval,
            max_interval,
            multiplier: BACKOFF_MULTIPLIER,
            randomization_factor: RANDOMIZATION_FACTOR,
        }
    }

    /// Disable jitter. Delays become exact powers of the multiplier.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.randomization_factor = 0.0;
        self
    }

    /// Delay before the retry that follows failure number `attempt` (0-based).
    ///
    /// The result never exceeds `max_interval`, jitter included.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());
        let jittered = self.apply_jitter(capped);

        Duration::from_secs_f64(jittered.min(self.max_interval.as_secs_f64()))
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, secs: f64) -> f64 {
        if self.randomization_factor == 0.0 || secs <= 0.0 {
            return secs;
        }

        let delta = secs * self.randomization_factor;
        let mut rng = rand::rng();
        rng.random_range((secs - delta)..=(secs + delta)).max(0.0)
    }
}

/// Consecutive failure counts per object key (`namespace/name`).
///
/// The count lives in memory only. A restart resets every object to its
/// first backoff step.
#[derive(Debug, Default)]
pub struct RequeueTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RequeueTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return how many failures preceded it.
    pub fn next_attempt(&self, key: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = attempts.entry(key.to_string()).or_insert(0);
        let attempt = *entry;
        *entry = entry.saturating_add(1);
        debug!(key = %key, attempt, "Recorded reconciliation failure");
        attempt
    }

    /// Forget the failure history of an object after a successful pass.
    pub fn reset(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    #[must_use]
    pub fn failures(&self, key: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;

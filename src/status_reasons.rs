// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Standard Kubernetes status condition types and reasons for `Database` resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition Types
//!
//! Every `Database` carries three conditions:
//!
//! - **`Ready`** - the PostgreSQL Deployment is rolled out and available
//! - **`Progressing`** - a rollout of the current generation is still underway
//! - **`Degraded`** - the last reconciliation failed
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   observedGeneration: 3
//!   conditions:
//!     - type: Ready
//!       status: "False"
//!       reason: ReferenceError
//!       message: "Secret default/database-auth not found"
//!     - type: Progressing
//!       status: "False"
//!       reason: ReconcileFailed
//!     - type: Degraded
//!       status: "True"
//!       reason: ReferenceError
//!       message: "Secret default/database-auth not found"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Overall readiness of the database.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// A rollout is in progress.
pub const CONDITION_TYPE_PROGRESSING: &str = "Progressing";

/// Reconciliation is failing.
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

// ============================================================================
// Condition Status Values
// ============================================================================

/// Kubernetes condition status `True`
pub const STATUS_TRUE: &str = "True";

/// Kubernetes condition status `False`
pub const STATUS_FALSE: &str = "False";

/// Kubernetes condition status `Unknown`
pub const STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Success Reasons
// ============================================================================

/// Every child object is current and the Deployment rollout is complete.
///
/// **Usage:** `Ready=True`
pub const REASON_ALL_READY: &str = "AllReady";

/// The Deployment for the current generation is still rolling out.
///
/// **Usage:** `Ready=False` and `Progressing=True`
pub const REASON_ROLLOUT_IN_PROGRESS: &str = "RolloutInProgress";

/// The Deployment rollout finished.
///
/// **Usage:** `Progressing=False`
pub const REASON_ROLLOUT_COMPLETE: &str = "RolloutComplete";

/// The last reconciliation succeeded.
///
/// **Usage:** `Degraded=False`
pub const REASON_RECONCILE_SUCCEEDED: &str = "ReconcileSucceeded";

/// The last reconciliation failed before the rollout could be observed.
///
/// **Usage:** `Progressing=False` alongside `Degraded=True`
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

// ============================================================================
// Error Reasons
// ============================================================================

/// The credentials Secret or one of its required keys is missing.
///
/// Retried with backoff; creating the Secret heals the resource.
pub const REASON_REFERENCE_ERROR: &str = "ReferenceError";

/// The spec cannot produce a valid object graph, or the API server rejected a
/// derived object as invalid.
///
/// Not retried; only a spec change retriggers reconciliation.
pub const REASON_VALIDATION_ERROR: &str = "ValidationError";

/// A transient API failure (throttling, server error, timeout, transport).
pub const REASON_TRANSIENT_ERROR: &str = "TransientError";

/// An unrecoverable failure. Logged and not retried.
pub const REASON_FATAL_ERROR: &str = "FatalError";

/// A child object with the expected name exists but is not controlled by this `Database`.
pub const REASON_RESOURCE_NOT_OWNED: &str = "ResourceNotOwned";

/// A write lost an optimistic concurrency race.
pub const REASON_CONFLICT: &str = "Conflict";

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;

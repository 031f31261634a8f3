// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Status condition helpers and the `Database` status reporter.
//!
//! Conditions follow the standard Kubernetes format:
//! - `type`: The aspect of the resource being reported (e.g., "Ready", "Progressing")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the condition changed
//!
//! Status writes are JSON merge patches guarded by `metadata.resourceVersion`.
//! A merge patch replaces the whole `conditions` list, so the precondition is
//! what keeps conditions written by other controllers from being lost.

use crate::client::{ClusterClient, Observed};
use crate::crd::{Condition, Database, DatabaseStatus};
use crate::errors::ReconcileError;
use crate::metrics::record_status_conflict;
use chrono::Utc;
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Create a new Kubernetes condition with the current timestamp.
///
/// # Example
///
/// ```rust
/// # use expense_operator::reconcilers::status::create_condition;
/// let condition = create_condition("Ready", "True", "AllReady", "Deployment is available");
/// assert_eq!(condition.r#type, "Ready");
/// assert_eq!(condition.status, "True");
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// Preserves `lastTransitionTime` when the status value is unchanged.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Compare two condition lists ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        find_condition(current, &new_cond.r#type).is_some_and(|curr| {
            curr.status == new_cond.status
                && curr.reason == new_cond.reason
                && curr.message == new_cond.message
        })
    })
}

/// One condition the reconciler wants to set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionUpdate {
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    pub message: String,
}

/// The status a reconciliation pass wants to record.
///
/// A change is replayed onto whatever status is current when it is written,
/// so it survives a conflict and re-fetch without recomputing the pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusChange {
    conditions: Vec<ConditionUpdate>,
    observed_generation: Option<i64>,
}

impl StatusChange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn condition(mut self, condition_type: &str, status: &str, reason: &str, message: &str) -> Self {
        self.conditions.push(ConditionUpdate {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Advance `status.observedGeneration`. Only set after the generation's
    /// desired state has been fully applied.
    #[must_use]
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    #[must_use]
    pub fn conditions(&self) -> &[ConditionUpdate] {
        &self.conditions
    }

    #[must_use]
    pub fn generation(&self) -> Option<i64> {
        self.observed_generation
    }
}

/// Centralized status updater for `Database` resources.
///
/// Collects the status a pass wants and applies it in a single API call, and
/// only when it differs semantically from what is stored.
pub struct DatabaseStatusUpdater {
    namespace: String,
    name: String,
    resource_version: Option<String>,
    current_status: Option<DatabaseStatus>,
    new_status: DatabaseStatus,
}

impl DatabaseStatusUpdater {
    /// Create a new status updater from the `Database` as last read.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        let current_status = database.status.clone();
        let new_status = current_status.clone().unwrap_or_default();

        Self {
            namespace: database.namespace().unwrap_or_default(),
            name: database.name_any(),
            resource_version: database.resource_version(),
            current_status,
            new_status,
        }
    }

    /// Update or add a condition (in-memory only, no API call).
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: &str,
        reason: &str,
        message: &str,
    ) {
        update_condition_in_memory(
            &mut self.new_status.conditions,
            condition_type,
            status,
            reason,
            message,
        );
    }

    /// Advance the observed generation (in-memory only, no API call).
    ///
    /// Never moves it backwards: a pass that started from an older revision
    /// cannot undo what a newer pass already recorded.
    pub fn set_observed_generation(&mut self, generation: Option<i64>) {
        if generation.is_some() {
            self.new_status.observed_generation =
                self.new_status.observed_generation.max(generation);
        }
    }

    /// Replay a [`StatusChange`] onto the status held by this updater.
    pub fn apply_change(&mut self, change: &StatusChange) {
        for update in change.conditions() {
            self.set_condition(
                &update.condition_type,
                &update.status,
                &update.reason,
                &update.message,
            );
        }
        self.set_observed_generation(change.generation());
    }

    /// Check if the status has actually changed compared to the current status.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match &self.current_status {
            None => true,
            Some(current) => {
                current.observed_generation != self.new_status.observed_generation
                    || !conditions_equal(&current.conditions, &self.new_status.conditions)
            }
        }
    }

    #[must_use]
    pub fn new_status(&self) -> &DatabaseStatus {
        &self.new_status
    }

    /// The merge patch body, including the `resourceVersion` precondition.
    #[must_use]
    pub fn patch_body(&self) -> Value {
        let mut body = json!({ "status": self.new_status });
        if let Some(rv) = &self.resource_version {
            body["metadata"] = json!({ "resourceVersion": rv });
        }
        body
    }

    /// Write the collected status if it changed.
    ///
    /// # Returns
    ///
    /// `true` if a write was made, `false` if the status was unchanged.
    ///
    /// # Errors
    ///
    /// Returns the raw client error; a 409 means the `Database` changed since
    /// it was read.
    pub async fn apply<C: ClusterClient>(&self, client: &C) -> Result<bool, kube::Error> {
        if !self.has_changes() {
            debug!(
                "Database {}/{} status unchanged, skipping update",
                self.namespace, self.name
            );
            return Ok(false);
        }

        client
            .patch_status::<Database>(&self.namespace, &self.name, &self.patch_body())
            .await?;

        debug!(
            "Updated Database {}/{} status: {} condition(s), observedGeneration {:?}",
            self.namespace,
            self.name,
            self.new_status.conditions.len(),
            self.new_status.observed_generation
        );

        Ok(true)
    }
}

/// A change that records an observed generation was computed for that
/// generation only. Once the spec has moved on it must not be replayed.
fn superseded(change: &StatusChange, latest: &Database) -> Option<i64> {
    let computed_for = change.generation()?;
    latest
        .metadata
        .generation
        .filter(|generation| *generation > computed_for)
}

/// Write a status change with optimistic-concurrency retry.
///
/// On conflict the latest `Database` is re-fetched, the change is replayed onto
/// its status and the write retried, up to `max_attempts` writes in total.
/// When the re-fetched `Database` has a newer generation than the change was
/// computed for, the change is dropped and a conflict returned so the next
/// pass starts from the new spec.
///
/// # Returns
///
/// `true` if the status was written, `false` if it was already up to date or
/// the `Database` no longer exists.
///
/// # Errors
///
/// Returns [`ReconcileError::Conflict`] when every attempt conflicted or the
/// change was superseded, or the classified client error for any other failure.
pub async fn report_status<C: ClusterClient>(
    client: &C,
    database: &Database,
    change: &StatusChange,
    max_attempts: u32,
) -> Result<bool, ReconcileError> {
    let namespace = database.namespace().unwrap_or_default();
    let name = database.name_any();
    let mut current = database.clone();
    let mut attempt = 1;

    loop {
        let mut updater = DatabaseStatusUpdater::new(&current);
        updater.apply_change(change);

        match updater.apply(client).await {
            Ok(written) => return Ok(written),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                if attempt >= max_attempts.max(1) {
                    record_status_conflict("exhausted");
                    warn!(
                        namespace = %namespace,
                        name = %name,
                        attempts = attempt,
                        "Giving up on status update after repeated conflicts"
                    );
                    return Err(ReconcileError::Conflict {
                        kind: "Database".to_string(),
                        name,
                        message: ae.message,
                    });
                }
                debug!(
                    namespace = %namespace,
                    name = %name,
                    attempt,
                    "Status update conflicted, re-reading Database"
                );
                attempt += 1;

                let latest = match client
                    .get::<Database>(&namespace, &name)
                    .await
                    .map_err(|e| ReconcileError::classify("Database", &name, e))?
                {
                    Observed::Found(latest) => latest,
                    Observed::NotFound => return Ok(false),
                };

                if let Some(generation) = superseded(change, &latest) {
                    record_status_conflict("superseded");
                    debug!(
                        namespace = %namespace,
                        name = %name,
                        generation,
                        computed_for = ?change.generation(),
                        "Database spec changed during the pass, dropping its status"
                    );
                    return Err(ReconcileError::Conflict {
                        kind: "Database".to_string(),
                        name,
                        message: format!("generation advanced to {generation} during the pass"),
                    });
                }

                record_status_conflict("retried");
                current = latest;
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(false),
            Err(e) => return Err(ReconcileError::classify("Database", &name, e)),
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;

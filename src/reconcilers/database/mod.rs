// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! `Database` reconciliation logic.
//!
//! One pass converges the PostgreSQL Deployment, Service and optional data
//! volume claim on the desired state built from the `Database` spec and its
//! credentials Secret, then records the result in status.
//!
//! ## Module Structure
//!
//! - [`children`] - Create, patch and prune child objects
//! - [`cleanup`] - Child deletion when the `Database` goes away
//! - [`status_helpers`] - Condition calculation
//! - [`types`] - Identity, pass outcome and rollout tracking

pub mod children;
pub mod cleanup;
pub mod status_helpers;
pub mod types;

pub use types::{DatabaseIdentity, ReconcileOutcome, RolloutState};

use crate::client::{ClusterClient, Observed};
use crate::context::Context;
use crate::crd::Database;
use crate::database_resources::{build, validate_spec};
use crate::errors::{ReconcileError, ReferenceError};
use crate::labels::FINALIZER_DATABASE;
use crate::metrics::record_requeue;
use crate::reconcilers::finalizers::{ensure_finalizer, handle_deletion};
use crate::reconcilers::status::report_status;
use children::apply_children;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use status_helpers::{converged_change, failure_change};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconciles a `Database` resource.
///
/// Each pass:
/// 1. Runs cleanup and releases the finalizer when the `Database` is being deleted
/// 2. Ensures the finalizer
/// 3. Validates the spec
/// 4. Resolves the credentials Secret
/// 5. Applies the PVC, Service and Deployment
/// 6. Reports Ready, Progressing and Degraded
///
/// Failures never escape as errors. They are reported on the `Database` and
/// mapped to a [`ReconcileOutcome`] that decides when the next pass runs.
///
/// # Example
///
/// ```rust,ignore
/// use expense_operator::reconcilers::{reconcile_database, ReconcileOutcome};
///
/// match reconcile_database(&ctx, &database).await {
///     ReconcileOutcome::Success => {}
///     ReconcileOutcome::RetryAfter(delay) => println!("retrying in {delay:?}"),
///     other => println!("{other}"),
/// }
/// ```
pub async fn reconcile_database<C: ClusterClient>(
    ctx: &Context<C>,
    database: &Database,
) -> ReconcileOutcome {
    let identity = match DatabaseIdentity::of(database) {
        Ok(identity) => identity,
        Err(err) => {
            error!(name = %database.name_any(), error = %err, "Cannot reconcile Database");
            return ReconcileOutcome::Fatal(err.to_string());
        }
    };
    let key = identity.key();

    info!("Reconciling Database: {}", key);
    debug!(
        namespace = %identity.namespace,
        name = %identity.name,
        generation = ?database.metadata.generation,
        resource_version = ?database.metadata.resource_version,
        "Starting Database reconciliation"
    );

    if database.metadata.deletion_timestamp.is_some() {
        return match handle_deletion(&ctx.client, database, FINALIZER_DATABASE).await {
            Ok(()) => {
                ctx.forget(&key);
                ReconcileOutcome::Success
            }
            Err(err) => fail(ctx, database, &key, err).await,
        };
    }

    let mut current = database.clone();
    match converge(ctx, &identity, &mut current).await {
        Ok(()) => {
            ctx.forget(&key);
            ReconcileOutcome::Success
        }
        Err(err) => fail(ctx, &current, &key, err).await,
    }
}

/// The happy path of a pass. `current` tracks the latest stored `Database`
/// so the failure path reports against the right revision.
async fn converge<C: ClusterClient>(
    ctx: &Context<C>,
    identity: &DatabaseIdentity,
    current: &mut Database,
) -> Result<(), ReconcileError> {
    let client = &ctx.client;

    *current = ensure_finalizer(client, current, FINALIZER_DATABASE).await?;

    validate_spec(current)?;

    let secret_name = current.spec.credentials_secret_name.clone();
    let secret = match client
        .get::<Secret>(&identity.namespace, &secret_name)
        .await
        .map_err(|e| ReconcileError::classify("Secret", &secret_name, e))?
    {
        Observed::Found(secret) => secret,
        Observed::NotFound => {
            return Err(ReferenceError::SecretNotFound {
                namespace: identity.namespace.clone(),
                name: secret_name,
            }
            .into())
        }
    };

    let desired = build(current, &secret)?;
    let deployment = apply_children(client, identity, current, &desired).await?;

    let rollout = RolloutState::from_deployment(&deployment);
    debug!(
        namespace = %identity.namespace,
        name = %identity.name,
        desired = rollout.desired,
        available = rollout.available,
        complete = rollout.is_complete(),
        "Deployment rollout state"
    );

    report_status(
        client,
        current,
        &converged_change(current, &rollout),
        ctx.config.status_update_attempts,
    )
    .await?;

    Ok(())
}

/// Report a failed pass and choose when to run again.
///
/// A write conflict is re-read immediately, but only `conflict_retries`
/// times in a row. After that it is handled like any transient failure.
async fn fail<C: ClusterClient>(
    ctx: &Context<C>,
    database: &Database,
    key: &str,
    err: ReconcileError,
) -> ReconcileOutcome {
    let err = if err.is_conflict() {
        if ctx.retry_conflict_now(key) {
            debug!(database = %key, error = %err, "Write conflicted, re-reading immediately");
            record_requeue(err.label());
            return ReconcileOutcome::RetryAfter(Duration::ZERO);
        }
        let conflicts = ctx.conflicts.failures(key);
        ReconcileError::Transient(format!("{err} ({conflicts} consecutive conflicts)"))
    } else {
        ctx.conflicts.reset(key);
        err
    };

    warn!(
        database = %key,
        reason = err.reason(),
        error = %err,
        "Database reconciliation failed"
    );

    if let Err(status_err) = report_status(
        &ctx.client,
        database,
        &failure_change(&err),
        ctx.config.status_update_attempts,
    )
    .await
    {
        warn!(
            database = %key,
            error = %status_err,
            "Failed to report Degraded status"
        );
    }

    if err.is_retryable() {
        record_requeue(err.label());
        let delay = ctx.next_requeue(key);
        debug!(
            database = %key,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            failures = ctx.requeues.failures(key),
            "Requeueing with backoff"
        );
        return ReconcileOutcome::RetryAfter(delay);
    }

    match err {
        ReconcileError::Validation(message) => {
            info!(database = %key, "Waiting for a spec change: {}", message);
            ReconcileOutcome::AwaitSpecChange(message)
        }
        ReconcileError::Fatal(message) => {
            error!(database = %key, "Not retrying: {}", message);
            ReconcileOutcome::Fatal(message)
        }
        other => {
            error!(database = %key, "Not retrying: {}", other);
            ReconcileOutcome::Fatal(other.to_string())
        }
    }
}

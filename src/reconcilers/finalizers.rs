// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Generic finalizer management for namespaced resources.
//!
//! Finalizer patches carry the `resourceVersion` the caller read, so a pass
//! working from a stale copy fails with a conflict instead of overwriting a
//! finalizer list another writer just changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use expense_operator::reconcilers::finalizers::{ensure_finalizer, handle_deletion};
//!
//! async fn reconcile<C: ClusterClient>(client: &C, db: Database) -> Result<(), ReconcileError> {
//!     if db.metadata.deletion_timestamp.is_some() {
//!         return handle_deletion(client, &db, FINALIZER_DATABASE).await;
//!     }
//!     let db = ensure_finalizer(client, &db, FINALIZER_DATABASE).await?;
//!     // Normal reconciliation logic...
//!     Ok(())
//! }
//! ```

use crate::client::{ClusterClient, ManagedResource, ObjectPatch};
use crate::errors::ReconcileError;
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

/// Trait for resources that require cleanup operations when being deleted.
///
/// Implement this trait to define custom cleanup logic that should run
/// before a finalizer is removed from a resource.
#[async_trait::async_trait]
pub trait FinalizerCleanup: ManagedResource {
    /// Perform cleanup operations before the finalizer is removed.
    ///
    /// # Errors
    ///
    /// If this method returns an error, the finalizer will NOT be removed and
    /// deletion stays blocked until cleanup succeeds on a later pass.
    async fn cleanup<C: ClusterClient>(&self, client: &C) -> Result<(), ReconcileError>;
}

#[must_use]
pub fn has_finalizer<T: ManagedResource>(resource: &T, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add a finalizer to a resource if not already present.
///
/// Idempotent: when the finalizer is already present no API call is made.
///
/// # Arguments
///
/// * `client` - Cluster client
/// * `resource` - The resource to add the finalizer to
/// * `finalizer` - The finalizer string to add
///
/// # Returns
///
/// The resource as stored after the call, so later writes in the same pass
/// use its new `resourceVersion`.
///
/// # Errors
///
/// Returns a classified error if the patch fails. A concurrent change to the
/// resource surfaces as [`ReconcileError::Conflict`].
pub async fn ensure_finalizer<C, T>(
    client: &C,
    resource: &T,
    finalizer: &str,
) -> Result<T, ReconcileError>
where
    C: ClusterClient,
    T: ManagedResource,
{
    if has_finalizer(resource, finalizer) {
        return Ok(resource.clone());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    info!(
        "Adding finalizer {} to {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    let patch = ObjectPatch::merge(json!({ "metadata": { "finalizers": finalizers } }))
        .with_resource_version(resource.resource_version().as_deref());
    let updated = client
        .patch::<T>(&namespace, &name, &patch)
        .await
        .map_err(|e| ReconcileError::classify(&T::kind(&()), &name, e))?;

    info!(
        "Successfully added finalizer {} to {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );

    Ok(updated)
}

/// Remove a finalizer from a resource.
///
/// Idempotent: absent finalizers are left alone.
///
/// # Errors
///
/// Returns a classified error if the patch fails. A resource that disappeared
/// in the meantime is treated as success.
pub async fn remove_finalizer<C, T>(
    client: &C,
    resource: &T,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    C: ClusterClient,
    T: ManagedResource,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    info!(
        "Removing finalizer {} from {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );

    let finalizers: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| *f != finalizer)
        .cloned()
        .collect();

    let patch = ObjectPatch::merge(json!({ "metadata": { "finalizers": finalizers } }))
        .with_resource_version(resource.resource_version().as_deref());

    match client.patch::<T>(&namespace, &name, &patch).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(()),
        Err(e) => return Err(ReconcileError::classify(&T::kind(&()), &name, e)),
    }

    info!(
        "Successfully removed finalizer {} from {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );

    Ok(())
}

/// Handle resource deletion with cleanup and finalizer removal.
///
/// Runs [`FinalizerCleanup::cleanup`] and removes the finalizer only when it
/// succeeded. Resources without the finalizer are left to the API server.
///
/// # Errors
///
/// Returns the cleanup or patch error. The finalizer stays in place and
/// deletion is blocked until a later pass succeeds.
pub async fn handle_deletion<C, T>(
    client: &C,
    resource: &T,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    C: ClusterClient,
    T: FinalizerCleanup,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    info!("{} {}/{} is being deleted", T::kind(&()), namespace, name);

    if has_finalizer(resource, finalizer) {
        info!(
            "Running cleanup for {} {}/{}",
            T::kind(&()),
            namespace,
            name
        );

        resource.cleanup(client).await?;
        remove_finalizer(client, resource, finalizer).await?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;

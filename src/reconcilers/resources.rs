// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Generic create-or-patch and delete helpers for owned child objects.
//!
//! Each managed object moves through these states during a pass:
//!
//! ```text
//! Absent ──create──▶ Creating ──ok──▶ Current
//! Current ──allowlisted field differs──▶ Drifted ──patch──▶ Current
//! any ──parent deleted──▶ Deleting ──delete──▶ (removed)
//! ```
//!
//! An object with the expected name that is not controlled by the owner is
//! never written to.
//!
//! # Example
//!
//! ```rust,ignore
//! use expense_operator::reconcilers::resources::ensure_object;
//!
//! let applied = ensure_object(&client, &owner_uid, &desired_service).await?;
//! ```

use crate::client::{ClusterClient, ManagedResource, ObjectPatch, Observed};
use crate::errors::ReconcileError;
use crate::metrics::record_child_write;
use crate::reconcilers::drift::DriftCheck;
use kube::{Resource, ResourceExt};
use std::fmt;
use tracing::{debug, info, warn};

/// Lifecycle state of a managed child object within one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectState {
    /// Not present in the cluster
    Absent,
    /// Create issued
    Creating,
    /// Matches the desired state on every allowlisted field
    Current,
    /// Differs from the desired state on an allowlisted field
    Drifted,
    /// Delete issued because the owner is going away or the object is no longer wanted
    Deleting,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "Absent",
            Self::Creating => "Creating",
            Self::Current => "Current",
            Self::Drifted => "Drifted",
            Self::Deleting => "Deleting",
        };
        f.write_str(name)
    }
}

/// What a pass did to a child object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildAction {
    Created,
    Patched,
    Unchanged,
    Deleted,
    /// Delete requested for an object that was already gone
    AlreadyAbsent,
    /// Left alone because another controller owns it
    SkippedNotOwned,
}

impl ChildAction {
    /// Whether the action wrote to the API server.
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Created | Self::Patched | Self::Deleted)
    }
}

/// A child object as stored after a pass, plus what was done to it.
#[derive(Clone, Debug)]
pub struct Applied<K> {
    pub object: K,
    pub action: ChildAction,
}

/// Whether `object` carries a controller owner reference to `owner_uid`.
#[must_use]
pub fn is_controlled_by<K: Resource>(object: &K, owner_uid: &str) -> bool {
    !owner_uid.is_empty()
        && object.meta().owner_references.as_ref().is_some_and(|refs| {
            refs.iter()
                .any(|r| r.controller == Some(true) && r.uid == owner_uid)
        })
}

fn not_owned<K: ManagedResource>(namespace: &str, name: &str) -> ReconcileError {
    ReconcileError::NotOwned {
        kind: K::kind(&()).to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Create the object if absent, patch allowlisted drift if present.
///
/// # Arguments
///
/// * `client` - Cluster client
/// * `owner_uid` - UID of the owning resource
/// * `desired` - The desired object, including its namespace and name
///
/// # Returns
///
/// The object as stored after the call and the action taken.
///
/// # Errors
///
/// - [`ReconcileError::NotOwned`] when an object with that name belongs to someone else
/// - [`ReconcileError::Conflict`] when a concurrent writer changed the object
///   or created it between our read and our create
/// - any other classified client error
pub async fn ensure_object<C, K>(
    client: &C,
    owner_uid: &str,
    desired: &K,
) -> Result<Applied<K>, ReconcileError>
where
    C: ClusterClient,
    K: ManagedResource + DriftCheck,
{
    let kind = K::kind(&());
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();
    let classify = |e| ReconcileError::classify(&kind, &name, e);

    let current = client
        .get::<K>(&namespace, &name)
        .await
        .map_err(classify)?;

    match current {
        Observed::NotFound => {
            debug!(
                namespace = %namespace,
                name = %name,
                kind = %kind,
                from = %ObjectState::Absent,
                to = %ObjectState::Creating,
                "Creating child object"
            );
            let created = client.create(&namespace, desired).await.map_err(classify)?;
            record_child_write(&kind, "created");
            info!("Created {} {}/{}", kind, namespace, name);
            Ok(Applied {
                object: created,
                action: ChildAction::Created,
            })
        }
        Observed::Found(current) => {
            if !is_controlled_by(&current, owner_uid) {
                warn!(
                    namespace = %namespace,
                    name = %name,
                    kind = %kind,
                    "Child object exists but is controlled by another owner, not touching it"
                );
                return Err(not_owned::<K>(&namespace, &name));
            }

            let Some(body) = desired.drift_patch(&current) else {
                debug!(
                    namespace = %namespace,
                    name = %name,
                    kind = %kind,
                    state = %ObjectState::Current,
                    "Child object up to date"
                );
                return Ok(Applied {
                    object: current,
                    action: ChildAction::Unchanged,
                });
            };

            debug!(
                namespace = %namespace,
                name = %name,
                kind = %kind,
                from = %ObjectState::Drifted,
                patch = %body,
                "Patching drifted child object"
            );
            let patch = ObjectPatch::strategic(body)
                .with_resource_version(current.resource_version().as_deref());
            let patched = client
                .patch::<K>(&namespace, &name, &patch)
                .await
                .map_err(classify)?;
            record_child_write(&kind, "patched");
            info!("Patched {} {}/{}", kind, namespace, name);
            Ok(Applied {
                object: patched,
                action: ChildAction::Patched,
            })
        }
    }
}

/// Delete a child object if it exists and is controlled by `owner_uid`.
///
/// Idempotent: an absent object is success.
///
/// # Errors
///
/// Returns the classified client error for failed reads or deletes.
pub async fn delete_owned<C, K>(
    client: &C,
    namespace: &str,
    name: &str,
    owner_uid: &str,
) -> Result<ChildAction, ReconcileError>
where
    C: ClusterClient,
    K: ManagedResource,
{
    let kind = K::kind(&());
    let classify = |e| ReconcileError::classify(&kind, name, e);

    let current = match client.get::<K>(namespace, name).await.map_err(classify)? {
        Observed::NotFound => return Ok(ChildAction::AlreadyAbsent),
        Observed::Found(current) => current,
    };

    if !is_controlled_by(&current, owner_uid) {
        warn!(
            namespace = %namespace,
            name = %name,
            kind = %kind,
            "Skipping delete of child object controlled by another owner"
        );
        return Ok(ChildAction::SkippedNotOwned);
    }

    debug!(
        namespace = %namespace,
        name = %name,
        kind = %kind,
        state = %ObjectState::Deleting,
        "Deleting child object"
    );

    match client.delete::<K>(namespace, name).await.map_err(classify)? {
        Observed::Found(()) => {
            record_child_write(&kind, "deleted");
            info!("Deleted {} {}/{}", kind, namespace, name);
            Ok(ChildAction::Deleted)
        }
        Observed::NotFound => Ok(ChildAction::AlreadyAbsent),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;

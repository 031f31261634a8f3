// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Child object lifecycle for `Database` resources.
//!
//! Children are applied one at a time in a fixed order: PVC, Service,
//! Deployment. A claim that is no longer wanted is removed only after the
//! Deployment stopped mounting it.

use crate::client::ClusterClient;
use crate::crd::Database;
use crate::database_resources::{ChildNames, DesiredState};
use crate::errors::ReconcileError;
use crate::reconcilers::resources::{delete_owned, ensure_object, ChildAction};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use super::DatabaseIdentity;
use tracing::{debug, info};

/// Create or patch every child of `database`.
///
/// # Returns
///
/// The Deployment as stored, for rollout tracking.
///
/// # Errors
///
/// Stops at the first child that fails and returns its classified error.
/// Children applied before it stay applied.
pub async fn apply_children<C: ClusterClient>(
    client: &C,
    identity: &DatabaseIdentity,
    database: &Database,
    desired: &DesiredState,
) -> Result<Deployment, ReconcileError> {
    let owner_uid = identity.uid.as_str();
    let mut writes = 0;

    if let Some(pvc) = &desired.pvc {
        let applied = ensure_object(client, owner_uid, pvc).await?;
        writes += usize::from(applied.action.is_write());
    }

    let service = ensure_object(client, owner_uid, &desired.service).await?;
    writes += usize::from(service.action.is_write());

    let deployment = ensure_object(client, owner_uid, &desired.deployment).await?;
    writes += usize::from(deployment.action.is_write());

    if desired.pvc.is_none() {
        let names = ChildNames::for_database(database);
        let action = delete_owned::<C, PersistentVolumeClaim>(
            client,
            &identity.namespace,
            &names.pvc,
            owner_uid,
        )
        .await?;
        if action == ChildAction::Deleted {
            info!(
                "Removed data volume claim {}/{} after storageSize was unset",
                identity.namespace, names.pvc
            );
            writes += 1;
        }
    }

    debug!(
        namespace = %identity.namespace,
        name = %identity.name,
        writes,
        "Applied Database child objects"
    );

    Ok(deployment.object)
}

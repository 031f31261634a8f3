// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Cleanup of child objects when a `Database` is deleted.

use crate::client::ClusterClient;
use crate::crd::Database;
use crate::database_resources::ChildNames;
use crate::errors::ReconcileError;
use crate::reconcilers::finalizers::FinalizerCleanup;
use crate::reconcilers::resources::delete_owned;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use super::DatabaseIdentity;
use tracing::info;

/// Deletes the Service, then the Deployment, then the data volume claim.
///
/// Children controlled by another owner are skipped. A `Database` without a
/// uid cannot tell its own children apart, so cleanup fails instead of
/// skipping them all. Any failed delete keeps the finalizer in place.
#[async_trait::async_trait]
impl FinalizerCleanup for Database {
    async fn cleanup<C: ClusterClient>(&self, client: &C) -> Result<(), ReconcileError> {
        let DatabaseIdentity {
            namespace,
            name,
            uid,
        } = DatabaseIdentity::of(self)?;
        let names = ChildNames::for_database(self);

        let service =
            delete_owned::<C, Service>(client, &namespace, &names.service, &uid).await?;
        let deployment =
            delete_owned::<C, Deployment>(client, &namespace, &names.deployment, &uid).await?;
        let pvc =
            delete_owned::<C, PersistentVolumeClaim>(client, &namespace, &names.pvc, &uid)
                .await?;

        info!(
            namespace = %namespace,
            name = %name,
            service = ?service,
            deployment = ?deployment,
            pvc = ?pvc,
            "Cleaned up Database child objects"
        );

        Ok(())
    }
}

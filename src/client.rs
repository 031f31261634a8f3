// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Cluster API access for the reconciler.
//!
//! The reconciler never talks to `kube::Api` directly. It goes through the
//! [`ClusterClient`] trait so a pass can run against the real API server
//! ([`KubeClusterClient`]) or an in-memory fake in unit tests.
//!
//! Reads are tri-state: an object is either [`Observed::Found`], [`Observed::NotFound`],
//! or the call fails with a `kube::Error`. A missing object is never an error.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

/// Bounds shared by every namespaced object the operator reads or writes.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ManagedResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Result of reading an object by namespaced name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observed<K> {
    /// The object exists
    Found(K),
    /// The object does not exist
    NotFound,
}

impl<K> From<Option<K>> for Observed<K> {
    fn from(value: Option<K>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// How a patch body is interpreted by the API server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchStrategy {
    /// RFC 7386 JSON merge patch
    Merge,
    /// Kubernetes strategic merge patch (lists merge by their patch key)
    Strategic,
}

/// A patch body plus the strategy it is applied with.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPatch {
    pub strategy: PatchStrategy,
    pub body: Value,
}

impl ObjectPatch {
    #[must_use]
    pub fn merge(body: Value) -> Self {
        Self {
            strategy: PatchStrategy::Merge,
            body,
        }
    }

    #[must_use]
    pub fn strategic(body: Value) -> Self {
        Self {
            strategy: PatchStrategy::Strategic,
            body,
        }
    }

    /// Add a `metadata.resourceVersion` precondition to the patch body.
    ///
    /// The API server rejects the patch with 409 Conflict when the stored object
    /// has moved past `resource_version`.
    #[must_use]
    pub fn with_resource_version(mut self, resource_version: Option<&str>) -> Self {
        if let (Some(rv), Value::Object(body)) = (resource_version, &mut self.body) {
            let metadata = body
                .entry("metadata")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(metadata) = metadata {
                metadata.insert("resourceVersion".to_string(), Value::String(rv.to_string()));
            }
        }
        self
    }
}

/// Namespaced object operations used by the reconciler.
///
/// Conflict (409) surfaces as an error and is handled by the caller as a
/// re-read. `delete` of an absent object is success.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Read an object by namespaced name.
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Observed<K>, kube::Error>;

    /// Create an object. Fails with 409 `AlreadyExists` if the name is taken.
    async fn create<K: ManagedResource>(&self, namespace: &str, object: &K)
        -> Result<K, kube::Error>;

    /// Patch an object and return the stored result.
    async fn patch<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<K, kube::Error>;

    /// JSON merge patch of the status subresource.
    async fn patch_status<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, kube::Error>;

    /// Delete an object. Returns `NotFound` when it was already gone.
    async fn delete<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Observed<()>, kube::Error>;
}

/// [`ClusterClient`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K: ManagedResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Observed<K>, kube::Error> {
        let found = self.api::<K>(namespace).get_opt(name).await?;
        Ok(found.into())
    }

    async fn create<K: ManagedResource>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, kube::Error> {
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api::<K>(namespace).create(&params, object).await
    }

    async fn patch<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<K, kube::Error> {
        let api = self.api::<K>(namespace);
        let params = self.patch_params();
        match patch.strategy {
            PatchStrategy::Merge => api.patch(name, &params, &Patch::Merge(&patch.body)).await,
            PatchStrategy::Strategic => {
                api.patch(name, &params, &Patch::Strategic(&patch.body))
                    .await
            }
        }
    }

    async fn patch_status<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, kube::Error> {
        self.api::<K>(namespace)
            .patch_status(name, &self.patch_params(), &Patch::Merge(patch))
            .await
    }

    async fn delete<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Observed<()>, kube::Error> {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(Observed::Found(())),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(
                    namespace = %namespace,
                    name = %name,
                    kind = %K::kind(&()),
                    "Object already deleted"
                );
                Ok(Observed::NotFound)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;

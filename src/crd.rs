// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Custom Resource Definitions (CRDs) for the expense app.
//!
//! This module defines the `Database` resource, which asks the operator to run a
//! PostgreSQL server for the expense app in the resource's namespace.
//!
//! # Example: Creating a Database
//!
//! ```rust,no_run
//! use expense_operator::crd::DatabaseSpec;
//!
//! let spec = DatabaseSpec {
//!     image: "postgres:10".into(),
//!     storage_size: Some("1Gi".into()),
//!     credentials_secret_name: "database-auth".into(),
//!     replicas: 1,
//!     database_name: None,
//!     service_name: None,
//!     storage_class_name: None,
//!     resources: None,
//! };
//! ```

use crate::constants::{
    DEFAULT_CREDENTIALS_SECRET, DEFAULT_POSTGRESQL_IMAGE, DEFAULT_REPLICAS, DEFAULT_SERVICE_NAME,
};
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_image() -> String {
    DEFAULT_POSTGRESQL_IMAGE.to_string()
}

fn default_credentials_secret_name() -> String {
    DEFAULT_CREDENTIALS_SECRET.to_string()
}

fn default_replicas() -> i32 {
    DEFAULT_REPLICAS
}

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: Ready, Progressing or Degraded.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// `Database` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    /// Ready, Progressing and Degraded conditions. Conditions of other types
    /// written by other controllers are preserved.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// The `metadata.generation` whose desired state has been fully applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `Database` runs a PostgreSQL server for the expense app.
///
/// The operator creates a Deployment and a Service named after `serviceName`
/// (default `postgresql`) and, when `storageSize` is set, a PersistentVolumeClaim
/// `<serviceName>-data` for the data directory. Credentials come from an existing
/// Secret that must contain `username` and `password` keys.
///
/// # Example
///
/// ```yaml
/// apiVersion: expense-app.majorov.biz/v1alpha1
/// kind: Database
/// metadata:
///   name: db1
///   namespace: expenses
/// spec:
///   image: quay.io/centos7/postgresql-10-centos7:latest
///   storageSize: 1Gi
///   credentialsSecretName: database-auth
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "expense-app.majorov.biz",
    version = "v1alpha1",
    kind = "Database",
    namespaced,
    shortname = "db",
    doc = "Database asks the operator to run a PostgreSQL server for the expense app. The operator manages a Deployment, a Service and optionally a PersistentVolumeClaim owned by this resource."
)]
#[kube(status = "DatabaseStatus")]
#[kube(
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// PostgreSQL container image.
    ///
    /// The image must read `POSTGRESQL_USER`, `POSTGRESQL_PASSWORD` and
    /// `POSTGRESQL_DATABASE` from its environment.
    #[serde(default = "default_image")]
    pub image: String,

    /// Size of the persistent data volume (e.g., "1Gi").
    ///
    /// When unset the data directory lives on an `emptyDir` volume and is lost
    /// with the pod. Removing the field deletes the managed claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,

    /// Name of the Secret holding the database credentials.
    #[serde(default = "default_credentials_secret_name")]
    pub credentials_secret_name: String,

    /// Number of PostgreSQL pods. Zero scales the server down.
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 0, max = 2_147_483_647))]
    pub replicas: i32,

    /// Database created on first start when the Secret has no `database` key.
    ///
    /// Defaults to the name of this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,

    /// Name of the managed Deployment and Service. Defaults to `postgresql`,
    /// the host name the expense app connects to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^[a-z]([-a-z0-9]{0,61}[a-z0-9])?$"))]
    pub service_name: Option<String>,

    /// Storage class for the data volume claim. Uses the cluster default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Compute resources for the PostgreSQL container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

impl DatabaseSpec {
    /// Name shared by the Deployment and Service.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.service_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SERVICE_NAME)
    }
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            storage_size: None,
            credentials_secret_name: default_credentials_secret_name(),
            replicas: default_replicas(),
            database_name: None,
            service_name: None,
            storage_class_name: None,
            resources: None,
        }
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;

// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! # expense-operator - PostgreSQL for the expense app on Kubernetes
//!
//! The operator watches `Database` resources (`expense-app.majorov.biz/v1alpha1`)
//! and runs one PostgreSQL server per `Database`: a Deployment, a `ClusterIP`
//! Service and, when storage is requested, a PersistentVolumeClaim. Credentials
//! come from an existing Secret that the operator only reads.
//!
//! ## Modules
//!
//! - [`crd`] - The `Database` custom resource
//! - [`database_resources`] - Desired child objects built from a `Database`
//! - [`client`] - Cluster access behind the [`client::ClusterClient`] trait
//! - [`reconcilers`] - Reconciliation, drift detection, status and cleanup
//! - [`errors`] - Failure taxonomy and requeue policy
//! - [`config`] - Command line and environment configuration
//! - [`metrics`] - Prometheus metrics
//! - [`quantity`] - Resource quantities compared by value
//!
//! ## Example
//!
//! ```rust,no_run
//! use expense_operator::crd::{Database, DatabaseSpec};
//!
//! let db = Database::new(
//!     "db1",
//!     DatabaseSpec {
//!         image: "postgres:10".to_string(),
//!         storage_size: Some("1Gi".to_string()),
//!         ..DatabaseSpec::default()
//!     },
//! );
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod credentials;
pub mod database_resources;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod quantity;
pub mod reconcilers;
pub mod status_reasons;

#[cfg(test)]
pub(crate) mod testing;

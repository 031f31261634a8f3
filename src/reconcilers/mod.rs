// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconciliation for `Database` resources.
//!
//! The reconciler watches `Database` objects and converges the PostgreSQL
//! Deployment, Service and data volume claim each one owns.
//!
//! # Reconciliation Architecture
//!
//! The operator follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - `Database` objects and the children they own
//! 2. **Reconcile** - Compare the desired child objects with what the API server holds
//! 3. **Update** - Create missing children and patch drifted fields
//! 4. **Status** - Report Ready, Progressing and Degraded on the `Database`
//!
//! # Building Blocks
//!
//! - [`database`] - The pass itself, plus cleanup on deletion
//! - [`drift`] - Allowlisted field comparison and patch construction
//! - [`finalizers`] - Finalizer add/remove around deletion
//! - [`resources`] - Generic create-or-patch and owned delete
//! - [`retry`] - Requeue backoff
//! - [`status`] - Condition helpers and the conflict-retrying status writer

pub mod database;
pub mod drift;
pub mod finalizers;
pub mod resources;
pub mod retry;
pub mod status;

pub use database::{reconcile_database, ReconcileOutcome};

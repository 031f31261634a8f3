// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Identity, result and rollout types for `Database` reconciliation.

use crate::crd::Database;
use crate::errors::ReconcileError;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::fmt;
use std::time::Duration;

/// Namespace, name and uid of a `Database`, checked once per pass.
///
/// The uid is what child owner references point at, so a `Database` without
/// one could never recognise its own children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseIdentity {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl DatabaseIdentity {
    /// # Errors
    ///
    /// Returns [`ReconcileError::Fatal`] when the namespace or uid is missing.
    pub fn of(database: &Database) -> Result<Self, ReconcileError> {
        let name = database.name_any();
        let namespace = database
            .namespace()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| ReconcileError::Fatal(format!("Database {name} has no namespace")))?;
        let uid = database
            .uid()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| {
                ReconcileError::Fatal(format!("Database {namespace}/{name} has no uid"))
            })?;

        Ok(Self {
            namespace,
            name,
            uid,
        })
    }

    /// Key used for per-object retry state (`namespace/name`).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// What the controller should do after a reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every child is applied and status is recorded; only the periodic resync follows
    Success,
    /// Run again after the delay. A zero delay means re-read immediately.
    RetryAfter(Duration),
    /// The spec is invalid; nothing changes until the spec does
    AwaitSpecChange(String),
    /// Unrecoverable; not retried
    Fatal(String),
}

impl ReconcileOutcome {
    /// Short label used for metrics and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryAfter(_) => "retry",
            Self::AwaitSpecChange(_) => "await_spec_change",
            Self::Fatal(_) => "fatal",
        }
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::RetryAfter(delay) => write!(f, "retry after {delay:?}"),
            Self::AwaitSpecChange(reason) => write!(f, "waiting for spec change: {reason}"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

/// Rollout progress of the PostgreSQL Deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolloutState {
    pub desired: i32,
    pub updated: i32,
    pub available: i32,
    /// The Deployment controller has seen the current generation
    pub observed_current: bool,
}

impl RolloutState {
    #[must_use]
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let status = deployment.status.as_ref();

        let observed_current = match (
            status.and_then(|s| s.observed_generation),
            deployment.metadata.generation,
        ) {
            (_, None) => true,
            (Some(observed), Some(generation)) => observed >= generation,
            (None, Some(_)) => false,
        };

        Self {
            desired,
            updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
            observed_current,
        }
    }

    /// Rollout of the current generation has finished and every replica is available.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.observed_current && self.updated >= self.desired && self.available >= self.desired
    }

    #[must_use]
    pub fn message(&self) -> String {
        if self.observed_current {
            format!("{}/{} replicas available", self.available, self.desired)
        } else {
            format!(
                "{}/{} replicas available, waiting for the rollout of the latest revision",
                self.available, self.desired
            )
        }
    }
}

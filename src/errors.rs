// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Error types for `Database` reconciliation.
//!
//! This module provides:
//! - [`ReferenceError`] for a credentials Secret that is missing or incomplete
//! - [`ValidationError`] for a spec that cannot produce a valid object graph
//! - [`ReconcileError`], the taxonomy every reconciliation failure is mapped into
//!
//! The taxonomy decides both the condition reason reported on the `Database`
//! and whether the controller requeues.

use crate::status_reasons::{
    REASON_CONFLICT, REASON_FATAL_ERROR, REASON_REFERENCE_ERROR, REASON_RESOURCE_NOT_OWNED,
    REASON_TRANSIENT_ERROR, REASON_VALIDATION_ERROR,
};
use thiserror::Error;

/// Errors resolving the credentials Secret referenced by a `Database`.
///
/// All variants are recoverable: creating or fixing the Secret heals the resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The referenced Secret does not exist
    #[error("Secret {namespace}/{name} not found")]
    SecretNotFound {
        /// Namespace of the `Database`
        namespace: String,
        /// Name of the missing Secret
        name: String,
    },

    /// A required key is absent from the Secret
    #[error("Secret {secret} is missing required key '{key}'")]
    MissingKey {
        /// Name of the Secret
        secret: String,
        /// The missing key
        key: String,
    },

    /// A required key is present but holds no data
    #[error("Secret {secret} has an empty value for key '{key}'")]
    EmptyKey {
        /// Name of the Secret
        secret: String,
        /// The empty key
        key: String,
    },
}

/// Errors in a `Database` spec detected before any object is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `spec.image` is empty
    #[error("spec.image must not be empty")]
    EmptyImage,

    /// `spec.replicas` is negative
    #[error("spec.replicas must not be negative, got {0}")]
    NegativeReplicas(i32),

    /// `spec.storageSize` is not a Kubernetes quantity
    #[error("spec.storageSize '{0}' is not a valid quantity (e.g. 1Gi, 500Mi)")]
    InvalidStorageSize(String),

    /// A derived object name is not a DNS-1035 label
    #[error("{field} '{value}' is not a valid DNS-1035 label")]
    InvalidName {
        /// Spec field the name came from
        field: &'static str,
        /// The rejected value
        value: String,
    },

    /// `spec.credentialsSecretName` is empty
    #[error("spec.credentialsSecretName must not be empty")]
    EmptySecretName,
}

/// Classified reconciliation failure.
///
/// Every error raised during a pass is mapped to exactly one variant. The
/// variant decides the requeue policy:
///
/// | Variant      | Requeue                     |
/// |--------------|-----------------------------|
/// | `Reference`  | exponential backoff         |
/// | `Validation` | none, waits for spec change |
/// | `Conflict`   | immediate                   |
/// | `Transient`  | exponential backoff         |
/// | `NotOwned`   | exponential backoff         |
/// | `Fatal`      | none                        |
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Credentials Secret missing or incomplete
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// Spec is invalid, or the API server rejected a derived object (HTTP 422/400)
    #[error("{0}")]
    Validation(String),

    /// A write lost an optimistic concurrency race (HTTP 409)
    #[error("conflict writing {kind} {name}: {message}")]
    Conflict {
        /// Kind of the object being written
        kind: String,
        /// Name of the object being written
        name: String,
        /// Message from the API server
        message: String,
    },

    /// Throttling, server errors, timeouts, transport and credential failures
    #[error("transient error: {0}")]
    Transient(String),

    /// A child with the expected name exists but is not controlled by this `Database`
    #[error("{kind} {namespace}/{name} exists and is not controlled by this Database")]
    NotOwned {
        /// Kind of the foreign object
        kind: String,
        /// Namespace of the foreign object
        namespace: String,
        /// Name of the foreign object
        name: String,
    },

    /// Unrecoverable failure
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl From<ValidationError> for ReconcileError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl ReconcileError {
    /// Map a Kubernetes client error into the reconciliation taxonomy.
    ///
    /// # Arguments
    ///
    /// * `kind` - Kind of the object the failed call was about
    /// * `name` - Name of that object
    /// * `err` - The client error
    ///
    /// # Returns
    ///
    /// - 409 becomes `Conflict`
    /// - 400 and 422 become `Validation`
    /// - 401, 403, 429, 5xx, transport errors and anything unexpected become `Transient`
    #[must_use]
    pub fn classify(kind: &str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => match ae.code {
                409 => Self::Conflict {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: ae.message,
                },
                400 | 422 => Self::Validation(format!(
                    "{kind} {name} rejected by the API server: {}",
                    ae.message
                )),
                _ => Self::Transient(format!(
                    "{kind} {name}: HTTP {} {}: {}",
                    ae.code, ae.reason, ae.message
                )),
            },
            kube::Error::SerdeError(e) => {
                Self::Fatal(format!("{kind} {name}: malformed response: {e}"))
            }
            other => Self::Transient(format!("{kind} {name}: {other}")),
        }
    }

    /// Condition reason reported on the `Database` for this error.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Reference(_) => REASON_REFERENCE_ERROR,
            Self::Validation(_) => REASON_VALIDATION_ERROR,
            Self::Conflict { .. } => REASON_CONFLICT,
            Self::Transient(_) => REASON_TRANSIENT_ERROR,
            Self::NotOwned { .. } => REASON_RESOURCE_NOT_OWNED,
            Self::Fatal(_) => REASON_FATAL_ERROR,
        }
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reference(_) => "reference",
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::Transient(_) => "transient",
            Self::NotOwned { .. } => "not_owned",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Whether the controller should schedule a retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Reference(_) | Self::Transient(_) | Self::NotOwned { .. }
        )
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;

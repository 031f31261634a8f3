// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Credentials Secret parsing.
//!
//! The Secret referenced by `spec.credentialsSecretName` is owned by the user and
//! only ever read. The PostgreSQL container receives the values through
//! `secretKeyRef`, so this module only checks that the keys exist and records
//! which optional keys are present. Secret values are never logged.

use crate::constants::{SECRET_KEY_DATABASE, SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME};
use crate::errors::ReferenceError;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

/// Keys that must be present in the credentials Secret.
pub const REQUIRED_KEYS: [&str; 2] = [SECRET_KEY_USERNAME, SECRET_KEY_PASSWORD];

/// Validated view of the credentials Secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseCredentials {
    /// Name of the Secret the values are read from
    pub secret_name: String,
    /// Whether the Secret carries the optional `database` key
    pub has_database_key: bool,
}

impl DatabaseCredentials {
    /// Validate a credentials Secret.
    ///
    /// Both `data` and `stringData` are consulted since a Secret created with
    /// `stringData` may be observed before the API server folds it into `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError::MissingKey`] when `username` or `password` is absent
    /// and [`ReferenceError::EmptyKey`] when one of them is present but empty.
    pub fn from_secret(secret: &Secret) -> Result<Self, ReferenceError> {
        let secret_name = secret.name_any();

        for key in REQUIRED_KEYS {
            match key_len(secret, key) {
                None => {
                    return Err(ReferenceError::MissingKey {
                        secret: secret_name,
                        key: key.to_string(),
                    })
                }
                Some(0) => {
                    return Err(ReferenceError::EmptyKey {
                        secret: secret_name,
                        key: key.to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        let has_database_key = key_len(secret, SECRET_KEY_DATABASE).is_some_and(|len| len > 0);

        Ok(Self {
            secret_name,
            has_database_key,
        })
    }
}

fn key_len(secret: &Secret, key: &str) -> Option<usize> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.len())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(String::len)
        })
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod credentials_tests;

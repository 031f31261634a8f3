// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Desired-state builder for `Database` resources.
//!
//! This module is pure: it maps a `Database` and its credentials Secret to the
//! Kubernetes objects the operator should converge on. Nothing here talks to
//! the API server.
//!
//! The object graph for a `Database` named `db1` with default settings is:
//!
//! - `PersistentVolumeClaim/postgresql-data` (only when `storageSize` is set)
//! - `Service/postgresql` (`ClusterIP`, port 5432)
//! - `Deployment/postgresql` (one `postgresql` container)
//!
//! Every object carries a controller owner reference to the `Database`.

use crate::constants::{
    API_GROUP_VERSION, CONTAINER_NAME_POSTGRESQL, DATA_VOLUME_NAME, ENV_POSTGRESQL_DATABASE,
    ENV_POSTGRESQL_PASSWORD, ENV_POSTGRESQL_USER, KIND_DATABASE, LIVENESS_INITIAL_DELAY_SECS,
    LIVENESS_PERIOD_SECS, POSTGRESQL_DATA_PATH, POSTGRESQL_PORT, PVC_ACCESS_MODE,
    PVC_NAME_SUFFIX, READINESS_INITIAL_DELAY_SECS, READINESS_PERIOD_SECS, SECRET_KEY_DATABASE,
    SECRET_KEY_PASSWORD, SECRET_KEY_USERNAME,
};
use crate::credentials::DatabaseCredentials;
use crate::crd::Database;
use crate::errors::{ReferenceError, ValidationError};
use crate::labels::{
    APP_NAME_POSTGRESQL, COMPONENT_DATABASE, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY,
    K8S_NAME, K8S_PART_OF, LABEL_APP, LABEL_TIER, MANAGED_BY_OPERATOR, PART_OF_EXPENSE_APP,
    TIER_POSTGRESQL,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, Probe, Secret, SecretKeySelector, Service, ServicePort,
    ServiceSpec, TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

/// Objects a `Database` should own, in creation order.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredState {
    /// Data volume claim, present only when `spec.storageSize` is set
    pub pvc: Option<PersistentVolumeClaim>,
    pub service: Service,
    pub deployment: Deployment,
}

/// Names of the child objects of a `Database`.
///
/// These are fixed by the spec alone so cleanup can find children without a
/// credentials Secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildNames {
    pub deployment: String,
    pub service: String,
    pub pvc: String,
}

impl ChildNames {
    #[must_use]
    pub fn for_database(database: &Database) -> Self {
        let service_name = database.spec.service_name();
        Self {
            deployment: service_name.to_string(),
            service: service_name.to_string(),
            pvc: format!("{service_name}{PVC_NAME_SUFFIX}"),
        }
    }
}

/// Build the full desired object graph for a `Database`.
///
/// # Arguments
///
/// * `database` - The `Database` being reconciled
/// * `secret` - The resolved credentials Secret
///
/// # Returns
///
/// The desired PVC (optional), Service and Deployment
///
/// # Errors
///
/// Returns [`ReferenceError`] naming the missing key when the Secret lacks
/// `username` or `password`.
pub fn build(database: &Database, secret: &Secret) -> Result<DesiredState, ReferenceError> {
    let credentials = DatabaseCredentials::from_secret(secret)?;

    debug!(
        name = %database.name_any(),
        namespace = ?database.namespace(),
        has_pvc = database.spec.storage_size.is_some(),
        "Building desired state for Database"
    );

    Ok(DesiredState {
        pvc: build_pvc(database),
        service: build_service(database),
        deployment: build_deployment(database, &credentials),
    })
}

/// Check the parts of a `Database` spec that cannot be expressed in the CRD schema.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_spec(database: &Database) -> Result<(), ValidationError> {
    let spec = &database.spec;

    if spec.image.trim().is_empty() {
        return Err(ValidationError::EmptyImage);
    }
    if spec.replicas < 0 {
        return Err(ValidationError::NegativeReplicas(spec.replicas));
    }
    if spec.credentials_secret_name.trim().is_empty() {
        return Err(ValidationError::EmptySecretName);
    }
    if let Some(size) = &spec.storage_size {
        if !is_valid_quantity(size) {
            return Err(ValidationError::InvalidStorageSize(size.clone()));
        }
    }

    let service_name = spec.service_name();
    if !is_dns1035_label(service_name) {
        return Err(ValidationError::InvalidName {
            field: "spec.serviceName",
            value: service_name.to_string(),
        });
    }

    // The name is used as a label value
    let name = database.name_any();
    if name.len() > 63 {
        return Err(ValidationError::InvalidName {
            field: "metadata.name",
            value: name,
        });
    }

    Ok(())
}

/// Labels used for the Deployment selector and the Service selector.
#[must_use]
pub fn build_selector_labels(database: &Database) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.into(), database.name_any());
    labels.insert(LABEL_TIER.into(), TIER_POSTGRESQL.into());
    labels
}

/// Labels placed on every child object and the pod template.
///
/// Always a superset of [`build_selector_labels`].
#[must_use]
pub fn build_labels(database: &Database) -> BTreeMap<String, String> {
    let mut labels = build_selector_labels(database);
    labels.insert(K8S_NAME.into(), APP_NAME_POSTGRESQL.into());
    labels.insert(K8S_INSTANCE.into(), database.name_any());
    labels.insert(K8S_COMPONENT.into(), COMPONENT_DATABASE.into());
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_OPERATOR.into());
    labels.insert(K8S_PART_OF.into(), PART_OF_EXPENSE_APP.into());
    labels
}

/// Builds owner references for a resource owned by a `Database`
///
/// # Arguments
///
/// * `database` - The `Database` that owns this resource
///
/// # Returns
///
/// A vector containing a single controller `OwnerReference` pointing to the database
#[must_use]
pub fn build_owner_references(database: &Database) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_DATABASE.to_string(),
        name: database.name_any(),
        uid: database.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

fn child_metadata(database: &Database, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: database.namespace(),
        labels: Some(build_labels(database)),
        owner_references: Some(build_owner_references(database)),
        ..Default::default()
    }
}

/// Builds the PostgreSQL Deployment.
#[must_use]
pub fn build_deployment(database: &Database, credentials: &DatabaseCredentials) -> Deployment {
    let names = ChildNames::for_database(database);

    Deployment {
        metadata: child_metadata(database, &names.deployment),
        spec: Some(DeploymentSpec {
            replicas: Some(database.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(build_selector_labels(database)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(build_labels(database)),
                    ..Default::default()
                }),
                spec: Some(build_pod_spec(database, credentials, &names)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pod_spec(
    database: &Database,
    credentials: &DatabaseCredentials,
    names: &ChildNames,
) -> PodSpec {
    let port = IntOrString::Int(i32::from(POSTGRESQL_PORT));

    let container = Container {
        name: CONTAINER_NAME_POSTGRESQL.into(),
        image: Some(database.spec.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(CONTAINER_NAME_POSTGRESQL.into()),
            container_port: i32::from(POSTGRESQL_PORT),
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        env: Some(build_env(database, credentials)),
        resources: database.spec.resources.clone(),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME_NAME.into(),
            mount_path: POSTGRESQL_DATA_PATH.into(),
            ..Default::default()
        }]),
        liveness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: port.clone(),
                ..Default::default()
            }),
            initial_delay_seconds: Some(LIVENESS_INITIAL_DELAY_SECS),
            period_seconds: Some(LIVENESS_PERIOD_SECS),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port,
                ..Default::default()
            }),
            initial_delay_seconds: Some(READINESS_INITIAL_DELAY_SECS),
            period_seconds: Some(READINESS_PERIOD_SECS),
            ..Default::default()
        }),
        ..Default::default()
    };

    PodSpec {
        containers: vec![container],
        volumes: Some(vec![build_data_volume(database, names)]),
        ..Default::default()
    }
}

/// Builds the container environment.
///
/// `POSTGRESQL_USER` and `POSTGRESQL_PASSWORD` always come from the Secret.
/// `POSTGRESQL_DATABASE` comes from the Secret's `database` key when present,
/// otherwise from `spec.databaseName` or the `Database` name.
#[must_use]
pub fn build_env(database: &Database, credentials: &DatabaseCredentials) -> Vec<EnvVar> {
    let database_env = if credentials.has_database_key {
        secret_env(
            ENV_POSTGRESQL_DATABASE,
            &credentials.secret_name,
            SECRET_KEY_DATABASE,
        )
    } else {
        EnvVar {
            name: ENV_POSTGRESQL_DATABASE.into(),
            value: Some(
                database
                    .spec
                    .database_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| database.name_any()),
            ),
            ..Default::default()
        }
    };

    vec![
        secret_env(
            ENV_POSTGRESQL_USER,
            &credentials.secret_name,
            SECRET_KEY_USERNAME,
        ),
        secret_env(
            ENV_POSTGRESQL_PASSWORD,
            &credentials.secret_name,
            SECRET_KEY_PASSWORD,
        ),
        database_env,
    ]
}

fn secret_env(name: &str, secret_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.into(),
                key: key.into(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The `data` volume: the managed claim when storage is requested, else `emptyDir`.
#[must_use]
pub fn build_data_volume(database: &Database, names: &ChildNames) -> Volume {
    if database.spec.storage_size.is_some() {
        Volume {
            name: DATA_VOLUME_NAME.into(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: names.pvc.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    } else {
        Volume {
            name: DATA_VOLUME_NAME.into(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }
    }
}

/// Builds the `ClusterIP` Service in front of the PostgreSQL pods.
#[must_use]
pub fn build_service(database: &Database) -> Service {
    let names = ChildNames::for_database(database);

    Service {
        metadata: child_metadata(database, &names.service),
        spec: Some(ServiceSpec {
            selector: Some(build_selector_labels(database)),
            ports: Some(vec![ServicePort {
                name: Some(CONTAINER_NAME_POSTGRESQL.into()),
                port: i32::from(POSTGRESQL_PORT),
                target_port: Some(IntOrString::String(CONTAINER_NAME_POSTGRESQL.into())),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the data volume claim, or `None` when `spec.storageSize` is unset.
#[must_use]
pub fn build_pvc(database: &Database) -> Option<PersistentVolumeClaim> {
    let size = database.spec.storage_size.as_ref()?;
    let names = ChildNames::for_database(database);

    Some(PersistentVolumeClaim {
        metadata: child_metadata(database, &names.pvc),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![PVC_ACCESS_MODE.into()]),
            storage_class_name: database.spec.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Accepts the Kubernetes quantity forms used for storage: an integer or
/// decimal number with an optional binary (`Ki`..`Ei`) or decimal (`k`..`E`) suffix.
fn is_valid_quantity(value: &str) -> bool {
    const SUFFIXES: [&str; 12] = [
        "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E",
    ];

    let number = SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
        .unwrap_or(value);

    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();

    !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.is_none_or(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
}

fn is_dns1035_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes[0].is_ascii_lowercase()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.last().is_some_and(|b| *b != b'-')
}

#[cfg(test)]
#[path = "database_resources_tests.rs"]
mod database_resources_tests;

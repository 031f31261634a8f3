// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Allowlist drift detection for managed child objects.
//!
//! Objects are not compared deep-equal: the API server fills in defaults and
//! other controllers add fields we never set. Only the fields listed per kind
//! are compared, and a drifted object is corrected with a strategic merge patch
//! containing just those fields.
//!
//! | Kind                    | Compared fields                                       |
//! |-------------------------|-------------------------------------------------------|
//! | `Deployment`            | replicas, image, env, ports, resources, `data` volume |
//! | `Service`               | ports, selector                                       |
//! | `PersistentVolumeClaim` | storage request                                       |
//!
//! Quantities (resources, storage request) are compared by value, since the
//! API server stores them in canonical form.
//!
//! Lists and maps that must end up exactly as desired are sent with the
//! `$patch: replace` directive so stale entries are dropped.

use crate::constants::{CONTAINER_NAME_POSTGRESQL, DATA_VOLUME_NAME};
use crate::quantity::{quantities_equal, resource_lists_equal};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaim, PodSpec, ResourceRequirements, Service,
    ServicePort, Volume,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Compute the patch that brings the allowlisted fields of an object back to
/// their desired values.
pub trait DriftCheck {
    /// Returns a strategic merge patch body, or `None` when nothing drifted.
    fn drift_patch(&self, current: &Self) -> Option<Value>;
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// A list replaced wholesale under strategic merge.
fn replace_list<T: Serialize>(items: &[T]) -> Value {
    let mut list: Vec<Value> = items.iter().map(to_value).collect();
    list.push(json!({ "$patch": "replace" }));
    Value::Array(list)
}

/// A map replaced wholesale under strategic merge.
fn replace_map(value: Value) -> Value {
    let mut map = match value {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert("$patch".to_string(), Value::String("replace".to_string()));
    Value::Object(map)
}

fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment.spec.as_ref()?.template.spec.as_ref()
}

fn postgresql_container(pod: Option<&PodSpec>) -> Option<&Container> {
    pod?.containers
        .iter()
        .find(|c| c.name == CONTAINER_NAME_POSTGRESQL)
}

fn data_volume(pod: Option<&PodSpec>) -> Option<&Volume> {
    pod?.volumes
        .as_ref()?
        .iter()
        .find(|v| v.name == DATA_VOLUME_NAME)
}

fn normalize_container_ports(ports: Option<&Vec<ContainerPort>>) -> Vec<(Option<String>, i32, String)> {
    ports
        .map(|ports| {
            ports
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        p.container_port,
                        p.protocol.clone().unwrap_or_else(|| "TCP".into()),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn resources_equal(
    desired: Option<&ResourceRequirements>,
    current: Option<&ResourceRequirements>,
) -> bool {
    let desired = desired.cloned().unwrap_or_default();
    let current = current.cloned().unwrap_or_default();
    resource_lists_equal(desired.limits.as_ref(), current.limits.as_ref())
        && resource_lists_equal(desired.requests.as_ref(), current.requests.as_ref())
}

/// Which source backs the `data` volume: `Some(claim)` or `None` for `emptyDir`.
fn volume_source(volume: Option<&Volume>) -> Option<Option<String>> {
    let volume = volume?;
    if let Some(claim) = &volume.persistent_volume_claim {
        Some(Some(claim.claim_name.clone()))
    } else if volume.empty_dir.is_some() {
        Some(None)
    } else {
        None
    }
}

impl DriftCheck for Deployment {
    fn drift_patch(&self, current: &Self) -> Option<Value> {
        let desired_pod = pod_spec(self);
        let current_pod = pod_spec(current);
        let mut spec = Map::new();
        let mut pod = Map::new();

        let desired_replicas = self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let current_replicas = current.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        if desired_replicas != current_replicas {
            spec.insert("replicas".into(), json!(desired_replicas));
        }

        if let Some(desired) = postgresql_container(desired_pod) {
            match postgresql_container(current_pod) {
                None => {
                    pod.insert("containers".into(), replace_list(&desired_pod?.containers));
                }
                Some(actual) => {
                    let mut container = Map::new();

                    if desired.image != actual.image {
                        container.insert("image".into(), json!(desired.image));
                    }
                    if desired.env.clone().unwrap_or_default()
                        != actual.env.clone().unwrap_or_default()
                    {
                        container.insert(
                            "env".into(),
                            replace_list(desired.env.as_deref().unwrap_or_default()),
                        );
                    }
                    if normalize_container_ports(desired.ports.as_ref())
                        != normalize_container_ports(actual.ports.as_ref())
                    {
                        container.insert(
                            "ports".into(),
                            replace_list(desired.ports.as_deref().unwrap_or_default()),
                        );
                    }
                    if !resources_equal(desired.resources.as_ref(), actual.resources.as_ref()) {
                        let value = desired
                            .resources
                            .as_ref()
                            .map_or(Value::Null, |r| replace_map(to_value(r)));
                        container.insert("resources".into(), value);
                    }

                    if !container.is_empty() {
                        container.insert("name".into(), json!(CONTAINER_NAME_POSTGRESQL));
                        pod.insert("containers".into(), json!([Value::Object(container)]));
                    }
                }
            }
        }

        let desired_volume = data_volume(desired_pod);
        if volume_source(desired_volume) != volume_source(data_volume(current_pod)) {
            if let Some(volume) = desired_volume {
                let mut entry = match to_value(volume) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                // Clear whichever source the desired volume does not use
                if volume.persistent_volume_claim.is_some() {
                    entry.insert("emptyDir".into(), Value::Null);
                } else {
                    entry.insert("persistentVolumeClaim".into(), Value::Null);
                }
                pod.insert("volumes".into(), json!([Value::Object(entry)]));
            }
        }

        if !pod.is_empty() {
            spec.insert("template".into(), json!({ "spec": Value::Object(pod) }));
        }
        if spec.is_empty() {
            None
        } else {
            Some(json!({ "spec": Value::Object(spec) }))
        }
    }
}

fn normalize_service_ports(ports: Option<&Vec<ServicePort>>) -> Vec<(Option<String>, i32, Option<IntOrString>, String)> {
    ports
        .map(|ports| {
            ports
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        p.port,
                        // The API server defaults targetPort to port
                        p.target_port.clone().or(Some(IntOrString::Int(p.port))),
                        p.protocol.clone().unwrap_or_else(|| "TCP".into()),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

impl DriftCheck for Service {
    fn drift_patch(&self, current: &Self) -> Option<Value> {
        let desired = self.spec.as_ref()?;
        let actual = current.spec.clone().unwrap_or_default();
        let mut spec = Map::new();

        if normalize_service_ports(desired.ports.as_ref())
            != normalize_service_ports(actual.ports.as_ref())
        {
            spec.insert(
                "ports".into(),
                replace_list(desired.ports.as_deref().unwrap_or_default()),
            );
        }
        if desired.selector.clone().unwrap_or_default() != actual.selector.unwrap_or_default() {
            spec.insert(
                "selector".into(),
                replace_map(to_value(&desired.selector.clone().unwrap_or_default())),
            );
        }

        if spec.is_empty() {
            None
        } else {
            Some(json!({ "spec": Value::Object(spec) }))
        }
    }
}

fn storage_request(pvc: &PersistentVolumeClaim) -> Option<String> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|q| q.0.clone())
}

impl DriftCheck for PersistentVolumeClaim {
    fn drift_patch(&self, current: &Self) -> Option<Value> {
        let desired = storage_request(self)?;
        if storage_request(current).is_some_and(|actual| quantities_equal(&desired, &actual)) {
            return None;
        }
        Some(json!({ "spec": { "resources": { "requests": { "storage": desired } } } }))
    }
}

#[cfg(test)]
#[path = "drift_tests.rs"]
mod drift_tests;

// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures and an in-memory cluster.
//!
//! [`FakeClusterClient`] keeps objects as JSON keyed by kind, namespace and
//! name. It behaves like the API server where the reconciler depends on it:
//! `resourceVersion` preconditions, merge and strategic merge patches,
//! finalizer-blocked deletion, and `generation` bumps on spec changes.

use crate::client::{ClusterClient, ManagedResource, ObjectPatch, Observed, PatchStrategy};
use crate::crd::{Database, DatabaseSpec};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::Resource;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub const TEST_NAMESPACE: &str = "default";

/// A `Database` as the API server would hand it to the controller.
pub fn database(name: &str, image: &str) -> Database {
    let mut db = Database::new(
        name,
        DatabaseSpec {
            image: image.to_string(),
            ..DatabaseSpec::default()
        },
    );
    db.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    db.metadata.uid = Some(format!("uid-{name}"));
    db.metadata.generation = Some(1);
    db
}

/// A credentials Secret with `username` and `password`, plus `database` when asked.
pub fn credentials_secret(name: &str, with_database_key: bool) -> Secret {
    let mut data = BTreeMap::from([
        ("username".to_string(), ByteString(b"expense".to_vec())),
        ("password".to_string(), ByteString(b"s3cr3t".to_vec())),
    ]);
    if with_database_key {
        data.insert("database".to_string(), ByteString(b"expenses".to_vec()));
    }

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Build an API error the way the API server reports it.
pub fn api_error(code: u16) -> kube::Error {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        422 => "Invalid",
        429 => "TooManyRequests",
        503 => "ServiceUnavailable",
        _ => "InternalError",
    };
    kube::Error::Api(Box::new(kube::core::Status {
        status: Some(kube::core::response::StatusSummary::Failure),
        message: format!("{reason} from fake cluster"),
        reason: reason.to_string(),
        code,
        metadata: None,
        details: None,
    }))
}

/// One mutating call seen by the fake cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub verb: &'static str,
    pub kind: String,
    pub name: String,
    pub body: Value,
}

type ObjectKey = (String, String, String);
type StatusRace = Box<dyn FnOnce(&mut Database) + Send>;

#[derive(Default)]
struct ClusterState {
    objects: BTreeMap<ObjectKey, Value>,
    next_rv: u64,
    writes: Vec<WriteRecord>,
    failures: Vec<(&'static str, String, u16)>,
    status_race: Option<StatusRace>,
}

impl ClusterState {
    fn next_resource_version(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn take_failure(&mut self, verb: &str, kind: &str) -> Option<kube::Error> {
        let index = self
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && k == kind)?;
        let (_, _, code) = self.failures.remove(index);
        Some(api_error(code))
    }

    fn record(&mut self, verb: &'static str, kind: &str, name: &str, body: Value) {
        self.writes.push(WriteRecord {
            verb,
            kind: kind.to_string(),
            name: name.to_string(),
            body,
        });
    }

    /// Store a new revision of an object, bumping `resourceVersion` and,
    /// when the spec changed, `generation`.
    fn store(&mut self, key: ObjectKey, mut updated: Value, previous: &Value) -> Value {
        if updated.get("spec") != previous.get("spec") {
            let generation = previous
                .pointer("/metadata/generation")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            set_metadata(&mut updated, "generation", Value::from(generation + 1));
        }
        let rv = self.next_resource_version();
        set_metadata(&mut updated, "resourceVersion", Value::String(rv));

        let deleting = updated.pointer("/metadata/deletionTimestamp").is_some();
        let finalizers_empty = updated
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_none_or(Vec::is_empty);
        if deleting && finalizers_empty {
            self.objects.remove(&key);
        } else {
            self.objects.insert(key, updated.clone());
        }
        updated
    }
}

fn object_key<K: ManagedResource>(namespace: &str, name: &str) -> ObjectKey {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn decode<K: ManagedResource>(value: &Value) -> Result<K, kube::Error> {
    serde_json::from_value(value.clone()).map_err(kube::Error::SerdeError)
}

fn encode<K: ManagedResource>(object: &K) -> Result<Value, kube::Error> {
    serde_json::to_value(object).map_err(kube::Error::SerdeError)
}

fn set_metadata(object: &mut Value, field: &str, value: Value) {
    if let Value::Object(root) = object {
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(metadata) = metadata {
            metadata.insert(field.to_string(), value);
        }
    }
}

/// Split the `metadata.resourceVersion` precondition off a patch body.
fn take_precondition(body: &Value) -> (Value, Option<String>) {
    let mut body = body.clone();
    let rv = body
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .and_then(|m| m.remove("resourceVersion"))
        .and_then(|v| v.as_str().map(str::to_string));
    if body
        .get("metadata")
        .and_then(Value::as_object)
        .is_some_and(Map::is_empty)
    {
        if let Some(root) = body.as_object_mut() {
            root.remove("metadata");
        }
    }
    (body, rv)
}

fn check_precondition(stored: &Value, expected: Option<&str>) -> Result<(), kube::Error> {
    let current = stored
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str);
    match expected {
        Some(rv) if Some(rv) != current => Err(api_error(409)),
        _ => Ok(()),
    }
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

const MERGE_KEYS: [&str; 4] = ["name", "containerPort", "port", "mountPath"];

fn is_replace_directive(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| m.len() == 1 && m.get("$patch").and_then(Value::as_str) == Some("replace"))
}

/// Strategic merge patch, limited to the directives the reconciler emits:
/// `$patch: replace` on maps and lists, `null` deletion, and lists merged by
/// their element key.
pub fn strategic_merge(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if patch_map.get("$patch").and_then(Value::as_str) == Some("replace") {
                let mut replaced = patch_map.clone();
                replaced.remove("$patch");
                *target = Value::Object(replaced);
                return;
            }
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target_map) = target {
                for (key, value) in patch_map {
                    if value.is_null() {
                        target_map.remove(key);
                    } else {
                        strategic_merge(target_map.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        Value::Array(items) => {
            if items.iter().any(is_replace_directive) {
                *target = Value::Array(
                    items
                        .iter()
                        .filter(|item| !is_replace_directive(item))
                        .cloned()
                        .collect(),
                );
                return;
            }
            let Some(merge_key) = MERGE_KEYS
                .iter()
                .copied()
                .find(|key| items.iter().all(|item| item.get(*key).is_some()))
            else {
                *target = patch.clone();
                return;
            };
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(target_items) = target {
                for item in items {
                    let id = item.get(merge_key);
                    match target_items.iter_mut().find(|t| t.get(merge_key) == id) {
                        Some(existing) => strategic_merge(existing, item),
                        None => target_items.push(item.clone()),
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// In-memory [`ClusterClient`].
#[derive(Default)]
pub struct FakeClusterClient {
    state: Mutex<ClusterState>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seed an object without recording a write. Returns it as stored.
    pub fn insert<K: ManagedResource>(&self, object: &K) -> K {
        let mut state = self.lock();
        let mut value = encode(object).unwrap();
        let rv = state.next_resource_version();
        set_metadata(&mut value, "resourceVersion", Value::String(rv));
        if value.pointer("/metadata/generation").is_none() {
            set_metadata(&mut value, "generation", Value::from(1));
        }
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        state
            .objects
            .insert(object_key::<K>(&namespace, &name), value.clone());
        decode(&value).unwrap()
    }

    pub fn get_stored<K: ManagedResource>(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&object_key::<K>(namespace, name))
            .map(|value| decode(value).unwrap())
    }

    pub fn contains<K: ManagedResource>(&self, namespace: &str, name: &str) -> bool {
        self.get_stored::<K>(namespace, name).is_some()
    }

    /// Change an object out of band, as another client would.
    pub fn modify<K: ManagedResource>(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) {
        let mut state = self.lock();
        let key = object_key::<K>(namespace, name);
        let previous = state.objects.get(&key).cloned().unwrap();
        let mut object: K = decode(&previous).unwrap();
        f(&mut object);
        let updated = encode(&object).unwrap();
        state.store(key, updated, &previous);
    }

    /// Mark a Deployment as fully rolled out for its current generation.
    pub fn set_deployment_available(&self, namespace: &str, name: &str) {
        self.modify::<Deployment>(namespace, name, |deployment| {
            let replicas = deployment
                .spec
                .as_ref()
                .and_then(|s| s.replicas)
                .unwrap_or(1);
            deployment.status = Some(DeploymentStatus {
                observed_generation: deployment.metadata.generation,
                replicas: Some(replicas),
                updated_replicas: Some(replicas),
                ready_replicas: Some(replicas),
                available_replicas: Some(replicas),
                ..Default::default()
            });
        });
    }

    /// Make the next call of `verb` on `kind` fail with `code`.
    pub fn fail_next(&self, verb: &'static str, kind: &str, code: u16) {
        self.lock().failures.push((verb, kind.to_string(), code));
    }

    /// Let another writer change the `Database` right before the next status patch lands.
    pub fn race_next_status_patch(&self, f: impl FnOnce(&mut Database) + Send + 'static) {
        self.lock().status_race = Some(Box::new(f));
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn reset_writes(&self) {
        self.lock().writes.clear();
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Observed<K>, kube::Error> {
        let mut state = self.lock();
        if let Some(err) = state.take_failure("get", &K::kind(&())) {
            return Err(err);
        }
        match state.objects.get(&object_key::<K>(namespace, name)) {
            Some(value) => Ok(Observed::Found(decode(value)?)),
            None => Ok(Observed::NotFound),
        }
    }

    async fn create<K: ManagedResource>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, kube::Error> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        if let Some(err) = state.take_failure("create", &kind) {
            return Err(err);
        }
        let name = object.meta().name.clone().unwrap_or_default();
        let key = object_key::<K>(namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(api_error(409));
        }

        let body = encode(object)?;
        let mut value = body.clone();
        let rv = state.next_resource_version();
        set_metadata(&mut value, "namespace", Value::String(namespace.to_string()));
        set_metadata(&mut value, "resourceVersion", Value::String(rv));
        set_metadata(
            &mut value,
            "uid",
            Value::String(format!("uid-{}-{name}", kind.to_lowercase())),
        );
        set_metadata(&mut value, "generation", Value::from(1));
        state.objects.insert(key, value.clone());
        state.record("create", &kind, &name, body);
        decode(&value)
    }

    async fn patch<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &ObjectPatch,
    ) -> Result<K, kube::Error> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        if let Some(err) = state.take_failure("patch", &kind) {
            return Err(err);
        }
        let key = object_key::<K>(namespace, name);
        let previous = state.objects.get(&key).cloned().ok_or_else(|| api_error(404))?;

        let (body, rv) = take_precondition(&patch.body);
        check_precondition(&previous, rv.as_deref())?;

        let mut updated = previous.clone();
        match patch.strategy {
            PatchStrategy::Merge => merge_patch(&mut updated, &body),
            PatchStrategy::Strategic => strategic_merge(&mut updated, &body),
        }
        let stored = state.store(key, updated, &previous);
        state.record("patch", &kind, name, body);
        decode(&stored)
    }

    async fn patch_status<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, kube::Error> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        if let Some(err) = state.take_failure("patch_status", &kind) {
            return Err(err);
        }
        let key = object_key::<K>(namespace, name);

        if let Some(race) = state.status_race.take() {
            if let Some(stored) = state.objects.get(&key).cloned() {
                let mut database: Database = decode(&stored)?;
                race(&mut database);
                let raced = serde_json::to_value(&database).map_err(kube::Error::SerdeError)?;
                state.store(key.clone(), raced, &stored);
            }
        }

        let previous = state.objects.get(&key).cloned().ok_or_else(|| api_error(404))?;
        let (body, rv) = take_precondition(patch);
        check_precondition(&previous, rv.as_deref())?;

        let mut updated = previous.clone();
        if let Some(status) = body.get("status") {
            let mut status_patch = Map::new();
            status_patch.insert("status".to_string(), status.clone());
            merge_patch(&mut updated, &Value::Object(status_patch));
        }
        let rv = state.next_resource_version();
        set_metadata(&mut updated, "resourceVersion", Value::String(rv));
        state.objects.insert(key, updated.clone());
        state.record("patch_status", &kind, name, body);
        decode(&updated)
    }

    async fn delete<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Observed<()>, kube::Error> {
        let mut state = self.lock();
        let kind = K::kind(&()).to_string();
        if let Some(err) = state.take_failure("delete", &kind) {
            return Err(err);
        }
        let key = object_key::<K>(namespace, name);
        let Some(previous) = state.objects.get(&key).cloned() else {
            return Ok(Observed::NotFound);
        };

        let mut updated = previous.clone();
        if updated.pointer("/metadata/deletionTimestamp").is_none() {
            set_metadata(
                &mut updated,
                "deletionTimestamp",
                Value::String("2024-01-01T00:00:00Z".to_string()),
            );
        }
        state.store(key, updated, &previous);
        state.record("delete", &kind, name, Value::Null);
        Ok(Observed::Found(()))
    }
}

#[cfg(test)]
mod tests {
    use super::strategic_merge;
    use serde_json::json;

    #[test]
    fn test_strategic_merge_replaces_marked_list() {
        let mut target = json!({"ports": [{"name": "a", "port": 1}, {"name": "b", "port": 2}]});
        strategic_merge(
            &mut target,
            &json!({"ports": [{"name": "a", "port": 5}, {"$patch": "replace"}]}),
        );
        assert_eq!(target, json!({"ports": [{"name": "a", "port": 5}]}));
    }

    #[test]
    fn test_strategic_merge_merges_by_name() {
        let mut target = json!({"containers": [{"name": "postgresql", "image": "a", "tty": true}]});
        strategic_merge(
            &mut target,
            &json!({"containers": [{"name": "postgresql", "image": "b"}]}),
        );
        assert_eq!(
            target,
            json!({"containers": [{"name": "postgresql", "image": "b", "tty": true}]})
        );
    }
}

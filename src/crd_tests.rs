// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::constants::{API_GROUP, API_GROUP_VERSION, API_VERSION, KIND_DATABASE};
    use crate::crd::*;
    use kube::{CustomResourceExt, Resource};
    use serde_json::json;

    #[test]
    fn test_spec_defaults_from_empty_object() {
        let spec: DatabaseSpec = serde_json::from_value(json!({})).unwrap();

        assert_eq!(spec.image, "quay.io/centos7/postgresql-10-centos7:latest");
        assert_eq!(spec.credentials_secret_name, "database-auth");
        assert_eq!(spec.replicas, 1);
        assert!(spec.storage_size.is_none());
        assert_eq!(spec.service_name(), "postgresql");
    }

    #[test]
    fn test_spec_camel_case_fields() {
        let spec: DatabaseSpec = serde_json::from_value(json!({
            "image": "postgres:10",
            "storageSize": "2Gi",
            "credentialsSecretName": "pg-auth",
            "replicas": 0,
            "databaseName": "expenses",
            "serviceName": "expenses-db",
            "storageClassName": "fast"
        }))
        .unwrap();

        assert_eq!(spec.image, "postgres:10");
        assert_eq!(spec.storage_size.as_deref(), Some("2Gi"));
        assert_eq!(spec.credentials_secret_name, "pg-auth");
        assert_eq!(spec.replicas, 0);
        assert_eq!(spec.database_name.as_deref(), Some("expenses"));
        assert_eq!(spec.service_name(), "expenses-db");
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast"));
    }

    #[test]
    fn test_empty_service_name_falls_back_to_default() {
        let spec = DatabaseSpec {
            service_name: Some(String::new()),
            ..DatabaseSpec::default()
        };
        assert_eq!(spec.service_name(), "postgresql");
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = DatabaseStatus {
            conditions: vec![Condition {
                r#type: "Ready".into(),
                status: "True".into(),
                reason: Some("AllReady".into()),
                message: None,
                last_transition_time: Some("2024-01-01T00:00:00Z".into()),
            }],
            observed_generation: Some(3),
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["observedGeneration"], 3);
        assert_eq!(value["conditions"][0]["type"], "Ready");
        assert_eq!(
            value["conditions"][0]["lastTransitionTime"],
            "2024-01-01T00:00:00Z"
        );
        assert!(value["conditions"][0].get("message").is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = Database::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("databases.expense-app.majorov.biz")
        );
        assert_eq!(crd.spec.group, API_GROUP);
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.names.kind, KIND_DATABASE);
        assert_eq!(crd.spec.versions[0].name, API_VERSION);
        assert_eq!(
            Database::api_version(&()),
            API_GROUP_VERSION,
            "owner references must carry the served apiVersion"
        );
        assert!(crd.spec.versions[0]
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }
}

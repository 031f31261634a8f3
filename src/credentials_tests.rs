// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Unit tests for `credentials.rs`

#[cfg(test)]
mod tests {
    use crate::credentials::DatabaseCredentials;
    use crate::errors::ReferenceError;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn secret(entries: &[(&str, &str)]) -> Secret {
        let data: BTreeMap<String, ByteString> = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        Secret {
            metadata: ObjectMeta {
                name: Some("database-auth".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_secret() {
        let creds = DatabaseCredentials::from_secret(&secret(&[
            ("username", "expense"),
            ("password", "s3cret"),
            ("database", "expenses"),
        ]))
        .unwrap();

        assert_eq!(creds.secret_name, "database-auth");
        assert!(creds.has_database_key);
    }

    #[test]
    fn test_database_key_is_optional() {
        let creds =
            DatabaseCredentials::from_secret(&secret(&[("username", "u"), ("password", "p")]))
                .unwrap();
        assert!(!creds.has_database_key);
    }

    #[test]
    fn test_missing_password() {
        let err = DatabaseCredentials::from_secret(&secret(&[("username", "u")])).unwrap_err();
        assert_eq!(
            err,
            ReferenceError::MissingKey {
                secret: "database-auth".into(),
                key: "password".into(),
            }
        );
    }

    #[test]
    fn test_empty_username() {
        let err =
            DatabaseCredentials::from_secret(&secret(&[("username", ""), ("password", "p")]))
                .unwrap_err();
        assert!(matches!(err, ReferenceError::EmptyKey { ref key, .. } if key == "username"));
    }

    #[test]
    fn test_string_data_is_accepted() {
        let mut s = secret(&[]);
        s.data = None;
        s.string_data = Some(BTreeMap::from([
            ("username".to_string(), "u".to_string()),
            ("password".to_string(), "p".to_string()),
        ]));
        assert!(DatabaseCredentials::from_secret(&s).is_ok());
    }
}

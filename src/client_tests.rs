// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Unit tests for `client.rs`

#[cfg(test)]
mod tests {
    use crate::client::*;
    use serde_json::json;

    #[test]
    fn test_observed_from_option() {
        assert_eq!(Observed::from(Some(3)), Observed::Found(3));
        assert_eq!(Observed::<i32>::from(None), Observed::NotFound);
    }

    #[test]
    fn test_resource_version_precondition_added() {
        let patch = ObjectPatch::strategic(json!({"spec": {"replicas": 2}}))
            .with_resource_version(Some("42"));

        assert_eq!(patch.strategy, PatchStrategy::Strategic);
        assert_eq!(patch.body["metadata"]["resourceVersion"], "42");
        assert_eq!(patch.body["spec"]["replicas"], 2);
    }

    #[test]
    fn test_resource_version_precondition_keeps_existing_metadata() {
        let patch = ObjectPatch::merge(json!({"metadata": {"finalizers": ["a"]}}))
            .with_resource_version(Some("7"));

        assert_eq!(patch.body["metadata"]["finalizers"][0], "a");
        assert_eq!(patch.body["metadata"]["resourceVersion"], "7");
    }

    #[test]
    fn test_no_resource_version_leaves_body_untouched() {
        let body = json!({"spec": {}});
        let patch = ObjectPatch::merge(body.clone()).with_resource_version(None);
        assert_eq!(patch.body, body);
    }
}

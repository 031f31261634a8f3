// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{Condition, Database, DatabaseStatus};
    use crate::metrics::STATUS_CONFLICTS_TOTAL;
    use crate::reconcilers::status::{
        conditions_equal, create_condition, find_condition, report_status,
        update_condition_in_memory, DatabaseStatusUpdater, StatusChange,
    };
    use crate::status_reasons::{
        CONDITION_TYPE_DEGRADED, CONDITION_TYPE_READY, REASON_ALL_READY,
        REASON_REFERENCE_ERROR, STATUS_FALSE, STATUS_TRUE,
    };
    use crate::testing::{database, FakeClusterClient, TEST_NAMESPACE};

    fn ready_change() -> StatusChange {
        StatusChange::new()
            .condition(CONDITION_TYPE_READY, STATUS_TRUE, REASON_ALL_READY, "1/1 replicas available")
            .observed_generation(Some(1))
    }

    #[test]
    fn test_create_condition_sets_timestamp() {
        let condition = create_condition(CONDITION_TYPE_READY, STATUS_TRUE, REASON_ALL_READY, "ok");

        assert_eq!(condition.r#type, CONDITION_TYPE_READY);
        assert_eq!(condition.reason.as_deref(), Some(REASON_ALL_READY));
        assert!(condition.last_transition_time.is_some());
    }

    #[test]
    fn test_update_keeps_transition_time_when_status_unchanged() {
        let mut conditions = vec![Condition {
            r#type: CONDITION_TYPE_READY.into(),
            status: STATUS_TRUE.into(),
            reason: Some(REASON_ALL_READY.into()),
            message: Some("old".into()),
            last_transition_time: Some("2024-01-01T00:00:00Z".into()),
        }];

        update_condition_in_memory(&mut conditions, CONDITION_TYPE_READY, STATUS_TRUE, REASON_ALL_READY, "new");
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(conditions[0].message.as_deref(), Some("new"));

        update_condition_in_memory(&mut conditions, CONDITION_TYPE_READY, STATUS_FALSE, REASON_REFERENCE_ERROR, "gone");
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_conditions_equal_ignores_timestamps() {
        let a = vec![create_condition(CONDITION_TYPE_READY, STATUS_TRUE, REASON_ALL_READY, "ok")];
        let mut b = a.clone();
        b[0].last_transition_time = Some("2000-01-01T00:00:00Z".into());
        assert!(conditions_equal(&a, &b));

        b[0].status = STATUS_FALSE.into();
        assert!(!conditions_equal(&a, &b));
    }

    #[test]
    fn test_updater_detects_no_change() {
        let mut db = database("db1", "postgres:10");
        db.status = Some(DatabaseStatus {
            conditions: vec![create_condition(
                CONDITION_TYPE_READY,
                STATUS_TRUE,
                REASON_ALL_READY,
                "1/1 replicas available",
            )],
            observed_generation: Some(1),
        });

        let mut updater = DatabaseStatusUpdater::new(&db);
        updater.apply_change(&ready_change());
        assert!(!updater.has_changes());
    }

    #[test]
    fn test_updater_keeps_foreign_conditions() {
        let mut db = database("db1", "postgres:10");
        db.status = Some(DatabaseStatus {
            conditions: vec![create_condition("BackupReady", STATUS_TRUE, "Done", "backed up")],
            observed_generation: None,
        });

        let mut updater = DatabaseStatusUpdater::new(&db);
        updater.apply_change(&ready_change());

        let conditions = &updater.new_status().conditions;
        assert!(find_condition(conditions, "BackupReady").is_some());
        assert!(find_condition(conditions, CONDITION_TYPE_READY).is_some());
        assert!(find_condition(conditions, CONDITION_TYPE_DEGRADED).is_none());
    }

    #[test]
    fn test_observed_generation_not_cleared_by_failure_change() {
        let mut db = database("db1", "postgres:10");
        db.status = Some(DatabaseStatus {
            conditions: vec![],
            observed_generation: Some(1),
        });

        let change = StatusChange::new().condition(
            CONDITION_TYPE_DEGRADED,
            STATUS_TRUE,
            REASON_REFERENCE_ERROR,
            "Secret default/database-auth not found",
        );
        let mut updater = DatabaseStatusUpdater::new(&db);
        updater.apply_change(&change);

        assert_eq!(updater.new_status().observed_generation, Some(1));
        let degraded =
            find_condition(&updater.new_status().conditions, CONDITION_TYPE_DEGRADED).unwrap();
        assert_eq!(degraded.status, STATUS_TRUE);
    }

    #[test]
    fn test_observed_generation_never_moves_backwards() {
        let mut db = database("db1", "postgres:10");
        db.metadata.generation = Some(3);
        db.status = Some(DatabaseStatus {
            conditions: vec![],
            observed_generation: Some(3),
        });

        let mut updater = DatabaseStatusUpdater::new(&db);
        updater.apply_change(&ready_change());

        assert_eq!(updater.new_status().observed_generation, Some(3));
    }

    #[test]
    fn test_patch_body_carries_resource_version() {
        let mut db = database("db1", "postgres:10");
        db.metadata.resource_version = Some("42".into());

        let updater = DatabaseStatusUpdater::new(&db);
        let body = updater.patch_body();
        assert_eq!(body["metadata"]["resourceVersion"], "42");
        assert!(body.get("status").is_some());
    }

    #[tokio::test]
    async fn test_report_status_writes_once() {
        let client = FakeClusterClient::new();
        let db = client.insert(&database("db1", "postgres:10"));

        assert!(report_status(&client, &db, &ready_change(), 5).await.unwrap());

        let stored = client.get_stored::<Database>(TEST_NAMESPACE, "db1").unwrap();
        assert!(!report_status(&client, &stored, &ready_change(), 5).await.unwrap());
        assert_eq!(client.write_count(), 1);
    }

    #[tokio::test]
    async fn test_report_status_retries_conflict_and_keeps_racing_condition() {
        let client = FakeClusterClient::new();
        let db = client.insert(&database("db1", "postgres:10"));
        client.race_next_status_patch(|db| {
            db.status
                .get_or_insert_with(DatabaseStatus::default)
                .conditions
                .push(create_condition("BackupReady", STATUS_TRUE, "Done", "backed up"));
        });

        assert!(report_status(&client, &db, &ready_change(), 5).await.unwrap());

        let status = client
            .get_stored::<Database>(TEST_NAMESPACE, "db1")
            .unwrap()
            .status
            .unwrap();
        assert!(find_condition(&status.conditions, "BackupReady").is_some());
        assert_eq!(
            find_condition(&status.conditions, CONDITION_TYPE_READY).map(|c| c.status.as_str()),
            Some(STATUS_TRUE)
        );
        assert_eq!(status.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_report_status_counts_retried_conflicts() {
        let client = FakeClusterClient::new();
        let db = client.insert(&database("db1", "postgres:10"));
        client.fail_next("patch_status", "Database", 409);
        let before = STATUS_CONFLICTS_TOTAL.with_label_values(&["retried"]).get();

        assert!(report_status(&client, &db, &ready_change(), 5).await.unwrap());

        let after = STATUS_CONFLICTS_TOTAL.with_label_values(&["retried"]).get();
        assert!(after >= before + 1.0);
    }

    #[tokio::test]
    async fn test_report_status_drops_change_computed_for_older_generation() {
        let client = FakeClusterClient::new();
        let db = client.insert(&database("db1", "postgres:10"));
        // Another pass already handled a newer spec before this write lands
        client.race_next_status_patch(|db| {
            db.spec.image = "postgres:11".into();
            db.status = Some(DatabaseStatus {
                conditions: vec![],
                observed_generation: Some(2),
            });
        });

        let err = report_status(&client, &db, &ready_change(), 5)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = client.get_stored::<Database>(TEST_NAMESPACE, "db1").unwrap();
        assert_eq!(stored.metadata.generation, Some(2));
        let status = stored.status.unwrap();
        assert_eq!(status.observed_generation, Some(2));
        assert!(find_condition(&status.conditions, CONDITION_TYPE_READY).is_none());
    }

    #[tokio::test]
    async fn test_report_status_gives_up_after_max_attempts() {
        let client = FakeClusterClient::new();
        let db = client.insert(&database("db1", "postgres:10"));
        for _ in 0..3 {
            client.fail_next("patch_status", "Database", 409);
        }

        let err = report_status(&client, &db, &ready_change(), 3)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_report_status_for_deleted_database() {
        let client = FakeClusterClient::new();
        let db = database("db1", "postgres:10");

        assert!(!report_status(&client, &db, &ready_change(), 5).await.unwrap());
    }
}

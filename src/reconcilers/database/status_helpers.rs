// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Status calculation for `Database` resources.

use super::types::RolloutState;
use crate::crd::Database;
use crate::errors::ReconcileError;
use crate::reconcilers::status::StatusChange;
use crate::status_reasons::{
    CONDITION_TYPE_DEGRADED, CONDITION_TYPE_PROGRESSING, CONDITION_TYPE_READY, REASON_ALL_READY,
    REASON_RECONCILE_FAILED, REASON_RECONCILE_SUCCEEDED, REASON_ROLLOUT_COMPLETE,
    REASON_ROLLOUT_IN_PROGRESS, STATUS_FALSE, STATUS_TRUE,
};

/// Status after every child object was applied.
///
/// Ready follows the Deployment rollout. `observedGeneration` advances to the
/// generation whose children were just applied.
#[must_use]
pub fn converged_change(database: &Database, rollout: &RolloutState) -> StatusChange {
    let message = rollout.message();

    let change = if rollout.is_complete() {
        StatusChange::new()
            .condition(CONDITION_TYPE_READY, STATUS_TRUE, REASON_ALL_READY, &message)
            .condition(
                CONDITION_TYPE_PROGRESSING,
                STATUS_FALSE,
                REASON_ROLLOUT_COMPLETE,
                &message,
            )
    } else {
        StatusChange::new()
            .condition(
                CONDITION_TYPE_READY,
                STATUS_FALSE,
                REASON_ROLLOUT_IN_PROGRESS,
                &message,
            )
            .condition(
                CONDITION_TYPE_PROGRESSING,
                STATUS_TRUE,
                REASON_ROLLOUT_IN_PROGRESS,
                &message,
            )
    };

    change
        .condition(
            CONDITION_TYPE_DEGRADED,
            STATUS_FALSE,
            REASON_RECONCILE_SUCCEEDED,
            "All child objects applied",
        )
        .observed_generation(database.metadata.generation)
}

/// Status after a failed pass. `observedGeneration` is left where it was.
#[must_use]
pub fn failure_change(err: &ReconcileError) -> StatusChange {
    let message = err.to_string();

    StatusChange::new()
        .condition(CONDITION_TYPE_READY, STATUS_FALSE, err.reason(), &message)
        .condition(CONDITION_TYPE_DEGRADED, STATUS_TRUE, err.reason(), &message)
        .condition(
            CONDITION_TYPE_PROGRESSING,
            STATUS_FALSE,
            REASON_RECONCILE_FAILED,
            &message,
        )
}

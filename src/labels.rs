// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Common label, annotation and finalizer constants.
//!
//! This module defines standard Kubernetes labels and operator-specific labels
//! to ensure consistency across all resources created by the controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application (e.g., "postgresql")
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Selector Labels
// ============================================================================

/// Label naming the application a pod belongs to. Its value is the `Database` name.
pub const LABEL_APP: &str = "app";

/// Label naming the tier of the application
pub const LABEL_TIER: &str = "tier";

// ============================================================================
// Label Values
// ============================================================================

/// Tier value for database pods
pub const TIER_POSTGRESQL: &str = "postgresql";

/// Application name for PostgreSQL workloads
pub const APP_NAME_POSTGRESQL: &str = "postgresql";

/// Component value for database servers
pub const COMPONENT_DATABASE: &str = "database";

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_EXPENSE_APP: &str = "expense-app";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_OPERATOR: &str = "expense-operator";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer for `Database` resources
pub const FINALIZER_DATABASE: &str = "expense-app.majorov.biz/database-finalizer";

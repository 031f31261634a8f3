// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

//! Global constants for the expense operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the expense app CRDs
pub const API_GROUP: &str = "expense-app.majorov.biz";

/// API version for the expense app CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "expense-app.majorov.biz/v1alpha1";

/// Kind name for `Database` resource
pub const KIND_DATABASE: &str = "Database";

/// Field manager recorded on every write made by the operator
pub const FIELD_MANAGER: &str = "expense-operator";

// ============================================================================
// PostgreSQL Defaults
// ============================================================================

/// Default PostgreSQL image (the image the expense app was built against)
pub const DEFAULT_POSTGRESQL_IMAGE: &str = "quay.io/centos7/postgresql-10-centos7:latest";

/// Default name of the Secret holding database credentials
pub const DEFAULT_CREDENTIALS_SECRET: &str = "database-auth";

/// Default name shared by the Deployment and Service of a `Database`
pub const DEFAULT_SERVICE_NAME: &str = "postgresql";

/// Default replica count for the PostgreSQL Deployment
pub const DEFAULT_REPLICAS: i32 = 1;

/// PostgreSQL wire protocol port
pub const POSTGRESQL_PORT: u16 = 5432;

/// Name of the PostgreSQL container and its port
pub const CONTAINER_NAME_POSTGRESQL: &str = "postgresql";

/// Name of the data volume in the pod template
pub const DATA_VOLUME_NAME: &str = "data";

/// Data directory of the centos/postgresql image
pub const POSTGRESQL_DATA_PATH: &str = "/var/lib/pgsql/data";

/// Suffix appended to the service name to form the PVC name
pub const PVC_NAME_SUFFIX: &str = "-data";

/// Access mode for the data volume claim
pub const PVC_ACCESS_MODE: &str = "ReadWriteOnce";

// ============================================================================
// Credentials Secret Keys
// ============================================================================

/// Secret key holding the database user name (required)
pub const SECRET_KEY_USERNAME: &str = "username";

/// Secret key holding the database password (required)
pub const SECRET_KEY_PASSWORD: &str = "password";

/// Secret key holding the database name (optional)
pub const SECRET_KEY_DATABASE: &str = "database";

/// Environment variable read by the image for the database user
pub const ENV_POSTGRESQL_USER: &str = "POSTGRESQL_USER";

/// Environment variable read by the image for the database password
pub const ENV_POSTGRESQL_PASSWORD: &str = "POSTGRESQL_PASSWORD";

/// Environment variable read by the image for the database name
pub const ENV_POSTGRESQL_DATABASE: &str = "POSTGRESQL_DATABASE";

// ============================================================================
// Probe Constants
// ============================================================================

/// Liveness probe initial delay (seconds)
pub const LIVENESS_INITIAL_DELAY_SECS: i32 = 30;

/// Liveness probe period (seconds)
pub const LIVENESS_PERIOD_SECS: i32 = 10;

/// Readiness probe initial delay (seconds)
pub const READINESS_INITIAL_DELAY_SECS: i32 = 5;

/// Readiness probe period (seconds)
pub const READINESS_PERIOD_SECS: i32 = 5;

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Initial requeue delay after a retryable failure (seconds)
pub const DEFAULT_REQUEUE_BASE_SECS: u64 = 5;

/// Cap on the requeue delay after repeated failures (seconds)
pub const DEFAULT_REQUEUE_MAX_SECS: u64 = 300;

/// Bounded attempts for the status write conflict loop
pub const DEFAULT_STATUS_UPDATE_ATTEMPTS: u32 = 5;

/// Immediate requeues after consecutive write conflicts before backing off
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Upper bound on a single reconciliation pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Default number of Databases reconciled in parallel
pub const DEFAULT_CONCURRENCY: u16 = 4;


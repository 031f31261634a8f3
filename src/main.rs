// Copyright (c) 2021 Nikolaj Majorov
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Parser;
use expense_operator::{
    client::{KubeClusterClient, ManagedResource},
    config::{LogFormat, OperatorConfig},
    context::Context,
    crd::Database,
    metrics,
    reconcilers::{reconcile_database, ReconcileOutcome},
};
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{PersistentVolumeClaim, Service},
};
use kube::{
    runtime::{
        controller::{self, Action},
        reflector::ObjectRef,
        watcher::Config,
        Controller,
    },
    Api, Client, Resource, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type OperatorContext = Context<KubeClusterClient>;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("expense-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

/// Format: timestamp file:line LEVEL message
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level.
fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: OperatorConfig) -> Result<()> {
    init_logging(config.log_format);

    info!("Starting expense-app Database operator");
    debug!(?config, "Loaded operator configuration");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let cluster = KubeClusterClient::new(client.clone(), config.field_manager.clone());
    let ctx = Arc::new(Context::new(cluster, config));

    run_database_controller(client, ctx).await
}

/// Api handle for the watch scope: one namespace or the whole cluster.
fn watched_api<K: ManagedResource>(client: &Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Run the `Database` controller until a shutdown signal arrives.
async fn run_database_controller(client: Client, ctx: Arc<OperatorContext>) -> Result<()> {
    let namespace = ctx.config.namespace.clone();
    info!(
        namespace = namespace.as_deref().unwrap_or("<all>"),
        concurrency = ctx.config.concurrency,
        "Starting Database controller"
    );

    let databases = watched_api::<Database>(&client, namespace.as_deref());
    let deployments = watched_api::<Deployment>(&client, namespace.as_deref());
    let services = watched_api::<Service>(&client, namespace.as_deref());
    let claims = watched_api::<PersistentVolumeClaim>(&client, namespace.as_deref());

    let concurrency = ctx.config.concurrency;
    let retry_state = Arc::clone(&ctx);

    Controller::new(databases, Config::default())
        .owns(deployments, Config::default())
        .owns(services, Config::default())
        .owns(claims, Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile_database_wrapper, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok(_) => {}
                // A requeued Database was deleted without passing through cleanup
                Err(controller::Error::ObjectNotFound(object)) => {
                    let key = retry_key(&object);
                    debug!(database = %key, "Database is gone, dropping its retry state");
                    retry_state.forget(&key);
                }
                Err(e) => debug!("Controller stream error: {}", e),
            }
            futures::future::ready(())
        })
        .await;

    info!("Database controller shut down");
    Ok(())
}

/// The retry state key of a queued object, matching `DatabaseIdentity::key`.
fn retry_key<K: Resource>(object: &ObjectRef<K>) -> String {
    format!(
        "{}/{}",
        object.namespace.as_deref().unwrap_or_default(),
        object.name
    )
}

fn object_key(database: &Database) -> String {
    format!(
        "{}/{}",
        database.namespace().unwrap_or_default(),
        database.name_any()
    )
}

/// Reconcile wrapper for `Database`
///
/// Bounds the pass by the configured timeout and maps its outcome onto an [`Action`].
async fn reconcile_database_wrapper(
    database: Arc<Database>,
    ctx: Arc<OperatorContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let timeout = ctx.config.reconcile_timeout();

    let Ok(outcome) = tokio::time::timeout(timeout, reconcile_database(&ctx, &database)).await
    else {
        metrics::record_reconciliation("timeout", start.elapsed());
        return Err(anyhow::anyhow!(
            "reconciliation of Database {} timed out after {:?}",
            object_key(&database),
            timeout
        )
        .into());
    };

    metrics::record_reconciliation(outcome.label(), start.elapsed());
    Ok(outcome_action(
        &object_key(&database),
        &outcome,
        ctx.config.resync_interval(),
    ))
}

fn outcome_action(key: &str, outcome: &ReconcileOutcome, resync: Duration) -> Action {
    match outcome {
        ReconcileOutcome::Success => {
            info!("Successfully reconciled Database: {}", key);
            Action::requeue(resync)
        }
        ReconcileOutcome::RetryAfter(delay) => Action::requeue(*delay),
        ReconcileOutcome::AwaitSpecChange(reason) => {
            info!("Database {} is waiting for a spec change: {}", key, reason);
            Action::await_change()
        }
        ReconcileOutcome::Fatal(reason) => {
            error!("Failed to reconcile Database {}: {}", key, reason);
            Action::await_change()
        }
    }
}

/// Error policy for the `Database` controller
///
/// Only a timed-out pass reaches here; it is retried with the same backoff as
/// a transient failure.
fn error_policy(database: Arc<Database>, err: &ReconcileError, ctx: Arc<OperatorContext>) -> Action {
    let key = object_key(&database);
    warn!("{}", err);
    metrics::record_requeue("timeout");
    Action::requeue(ctx.next_requeue(&key))
}

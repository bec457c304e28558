// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use futures::future::join_all;
use std::env;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use push_to_k8s::config::Config;
use push_to_k8s::constants::{METRICS_UPDATE_INTERVAL, SHUTDOWN_GRACE_PERIOD};
use push_to_k8s::kubernetes::{create_cluster_connection, ClusterApi, KubeCluster};
use push_to_k8s::metrics::{start_server, MetricsSink, MetricsUpdater, PrometheusMetrics};
use push_to_k8s::reconcilers::{
    start_namespace_watcher, start_periodic_reconciler, start_source_secret_watcher,
};
use push_to_k8s::sync::{NamespacePolicy, RateLimiter, SyncEngine};
use push_to_k8s::version;

fn init_tracing(debug: bool) {
    let default = if debug {
        "push_to_k8s=debug"
    } else {
        "push_to_k8s=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(env::var("DEBUG").is_ok_and(|v| v == "true"));

    let build = version::info();
    info!(
        "Starting push-to-k8s {} (commit {}, built {})",
        build.version, build.git_commit, build.build_date
    );

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, exclude_label={:?}, sync_interval={:?}, debounce={:?}, rate_limit={}/s, secret_watcher={}",
        config.namespace,
        config.exclude_namespace_label,
        config.sync_interval,
        config.secret_sync_debounce,
        config.secret_sync_rate_limit,
        config.enable_secret_watcher
    );

    let metrics = Arc::new(PrometheusMetrics::new()?);
    let sink: Arc<dyn MetricsSink> = metrics.clone();

    let client = create_cluster_connection(sink.as_ref()).await?;
    let cluster: Arc<dyn ClusterApi> = Arc::new(KubeCluster::new(client));

    let cancel = CancellationToken::new();
    let mut tasks: Vec<(&str, JoinHandle<push_to_k8s::error::Result<()>>)> = Vec::new();

    tasks.push((
        "metrics server",
        tokio::spawn({
            let port = config.metrics_port;
            let cancel = cancel.clone();
            async move {
                let res = start_server(port, metrics, cancel).await;
                if let Err(e) = &res {
                    error!("Metrics server failed: {}", e);
                }
                res
            }
        }),
    ));

    let policy = NamespacePolicy::new(
        config.namespace.clone(),
        config.exclude_namespace_label.clone(),
    );
    let limiter = Arc::new(RateLimiter::new(config.secret_sync_rate_limit));
    let engine = SyncEngine::new(
        cluster.clone(),
        policy.clone(),
        limiter,
        sink.clone(),
        cancel.clone(),
    );

    tasks.push((
        "periodic reconciler",
        start_periodic_reconciler(engine.clone(), config.sync_interval, cancel.clone()),
    ));
    tasks.push((
        "namespace watcher",
        start_namespace_watcher(engine.clone(), cancel.clone()),
    ));
    if config.enable_secret_watcher {
        tasks.push((
            "source secret watcher",
            start_source_secret_watcher(engine, config.secret_sync_debounce, cancel.clone()),
        ));
    } else {
        info!("Source secret watcher disabled, relying on periodic reconciliation only");
    }
    tasks.push((
        "metrics updater",
        MetricsUpdater::new(cluster, policy, sink).start(METRICS_UPDATE_INTERVAL, cancel.clone()),
    ));

    shutdown_signal().await?;
    info!("Shutdown signal received, stopping tasks");
    cancel.cancel();

    let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, join_all(handles)).await {
        Ok(results) => {
            for (name, res) in names.into_iter().zip(results) {
                match res {
                    Ok(Ok(())) => info!("{} stopped", name),
                    Ok(Err(e)) => warn!("{} exited with error: {}", name, e),
                    Err(e) => error!("{} panicked: {}", name, e),
                }
            }
        }
        Err(_) => warn!(
            "Tasks did not stop within {:?}, exiting anyway",
            SHUTDOWN_GRACE_PERIOD
        ),
    }

    info!("push-to-k8s stopped");
    Ok(())
}

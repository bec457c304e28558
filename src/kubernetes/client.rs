// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster client bootstrap

use crate::error::{PushError, Result};
use crate::metrics::MetricsSink;
use kube::{Client, Config as KConfig};
use std::env;
use tracing::{error, info, instrument};

/// Where the client configuration comes from, used as a metrics label
pub fn connection_source() -> &'static str {
    if env::var_os("KUBECONFIG").is_some_and(|v| !v.is_empty()) {
        "kubeconfig"
    } else {
        "in-cluster"
    }
}

/// Create a client from `KUBECONFIG` or the in-cluster environment and verify it can reach the API server
#[instrument(skip(metrics))]
pub async fn create_cluster_connection(metrics: &dyn MetricsSink) -> Result<Client> {
    let source = connection_source();
    info!("Connecting to Kubernetes using {} configuration", source);

    let config = KConfig::infer().await.map_err(|e| {
        connection_error(metrics, source, format!("Failed to infer client config: {}", e))
    })?;

    let client = Client::try_from(config).map_err(|e| {
        connection_error(metrics, source, format!("Failed to create client: {}", e))
    })?;

    verify_connection(client, source, metrics).await
}

fn connection_error(metrics: &dyn MetricsSink, source: &str, message: String) -> PushError {
    error!("{}", message);
    metrics.connection_failed(source, &message);
    PushError::Config(message)
}

/// Ask the API server for its version and record the connection outcome
pub async fn verify_connection(
    client: Client,
    source: &str,
    metrics: &dyn MetricsSink,
) -> Result<Client> {
    let version = client.apiserver_version().await.map_err(|e| {
        connection_error(metrics, source, format!("Failed to reach API server: {}", e))
    })?;

    metrics.connection_succeeded(source);
    info!(
        "Successfully connected to Kubernetes {}.{} using {} configuration",
        version.major, version.minor, source
    );

    Ok(client)
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! # Metrics
//!
//! Counters and gauges describing connection status and replication coverage.
//! Components receive a [`MetricsSink`] instead of touching a process-wide registry.
//!
//! ## Metrics Exposed
//!
//! - `k8s_connection_success_total{source}` - Successful cluster connections
//! - `k8s_connection_failures_total{source,error}` - Failed cluster connections
//! - `k8s_namespace_total` - Namespaces in the cluster
//! - `k8s_namespace_synced_total` - Eligible namespaces holding every source secret
//! - `k8s_namespace_not_synced_total` - Eligible namespaces missing at least one source secret
//! - `k8s_source_secrets_total` - Labeled secrets in the source namespace
//! - `k8s_managed_secrets_total` - Namespaces under management (synced + not synced)
//! - `push_to_k8s_sync_operations_total{outcome}` - Per-pair sync outcomes
//! - `push_to_k8s_sync_errors_total` - Per-pair sync failures

pub mod server;
pub mod updater;

use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub use server::start_server;
pub use updater::MetricsUpdater;

/// Sink for the counters and gauges the controller records
pub trait MetricsSink: Send + Sync {
    fn connection_succeeded(&self, source: &str);
    fn connection_failed(&self, source: &str, error: &str);
    fn set_namespace_total(&self, count: usize);
    fn set_namespaces_synced(&self, count: usize);
    fn set_namespaces_not_synced(&self, count: usize);
    fn set_source_secrets_total(&self, count: usize);
    fn set_managed_secrets_total(&self, count: usize);
    fn record_sync_outcome(&self, outcome: &str);
    fn record_sync_error(&self);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn connection_succeeded(&self, _source: &str) {}
    fn connection_failed(&self, _source: &str, _error: &str) {}
    fn set_namespace_total(&self, _count: usize) {}
    fn set_namespaces_synced(&self, _count: usize) {}
    fn set_namespaces_not_synced(&self, _count: usize) {}
    fn set_source_secrets_total(&self, _count: usize) {}
    fn set_managed_secrets_total(&self, _count: usize) {}
    fn record_sync_outcome(&self, _outcome: &str) {}
    fn record_sync_error(&self) {}
}

/// Prometheus-backed sink owning its own registry
pub struct PrometheusMetrics {
    registry: Registry,
    connection_success: IntCounterVec,
    connection_failures: IntCounterVec,
    namespace_total: IntGauge,
    namespace_synced: IntGauge,
    namespace_not_synced: IntGauge,
    source_secrets: IntGauge,
    managed_secrets: IntGauge,
    sync_operations: IntCounterVec,
    sync_errors: IntCounter,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let connection_success = IntCounterVec::new(
            Opts::new(
                "k8s_connection_success_total",
                "Total number of successful Kubernetes client connections",
            ),
            &["source"],
        )?;
        let connection_failures = IntCounterVec::new(
            Opts::new(
                "k8s_connection_failures_total",
                "Total number of failed Kubernetes client connections",
            ),
            &["source", "error"],
        )?;
        let namespace_total = IntGauge::new(
            "k8s_namespace_total",
            "Total number of namespaces in the cluster",
        )?;
        let namespace_synced = IntGauge::new(
            "k8s_namespace_synced_total",
            "Number of namespaces successfully synced",
        )?;
        let namespace_not_synced = IntGauge::new(
            "k8s_namespace_not_synced_total",
            "Number of namespaces that failed to sync",
        )?;
        let source_secrets = IntGauge::new(
            "k8s_source_secrets_total",
            "Total number of secrets in the source namespace with the label push-to-k8s=source",
        )?;
        let managed_secrets = IntGauge::new(
            "k8s_managed_secrets_total",
            "Total number of secrets managed by the application",
        )?;
        let sync_operations = IntCounterVec::new(
            Opts::new(
                "push_to_k8s_sync_operations_total",
                "Per secret and namespace sync operations by outcome",
            ),
            &["outcome"],
        )?;
        let sync_errors = IntCounter::new(
            "push_to_k8s_sync_errors_total",
            "Per secret and namespace sync operations that failed",
        )?;

        registry.register(Box::new(connection_success.clone()))?;
        registry.register(Box::new(connection_failures.clone()))?;
        registry.register(Box::new(namespace_total.clone()))?;
        registry.register(Box::new(namespace_synced.clone()))?;
        registry.register(Box::new(namespace_not_synced.clone()))?;
        registry.register(Box::new(source_secrets.clone()))?;
        registry.register(Box::new(managed_secrets.clone()))?;
        registry.register(Box::new(sync_operations.clone()))?;
        registry.register(Box::new(sync_errors.clone()))?;

        Ok(Self {
            registry,
            connection_success,
            connection_failures,
            namespace_total,
            namespace_synced,
            namespace_not_synced,
            source_secrets,
            managed_secrets,
            sync_operations,
            sync_errors,
        })
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

fn gauge_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

impl MetricsSink for PrometheusMetrics {
    fn connection_succeeded(&self, source: &str) {
        self.connection_success.with_label_values(&[source]).inc();
    }

    fn connection_failed(&self, source: &str, error: &str) {
        self.connection_failures
            .with_label_values(&[source, error])
            .inc();
    }

    fn set_namespace_total(&self, count: usize) {
        self.namespace_total.set(gauge_value(count));
    }

    fn set_namespaces_synced(&self, count: usize) {
        self.namespace_synced.set(gauge_value(count));
    }

    fn set_namespaces_not_synced(&self, count: usize) {
        self.namespace_not_synced.set(gauge_value(count));
    }

    fn set_source_secrets_total(&self, count: usize) {
        self.source_secrets.set(gauge_value(count));
    }

    fn set_managed_secrets_total(&self, count: usize) {
        self.managed_secrets.set(gauge_value(count));
    }

    fn record_sync_outcome(&self, outcome: &str) {
        self.sync_operations.with_label_values(&[outcome]).inc();
    }

    fn record_sync_error(&self) {
        self.sync_errors.inc();
    }
}

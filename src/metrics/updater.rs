// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic refresh of the coverage gauges.

use crate::constants::labels;
use crate::error::{PushError, Result};
use crate::kubernetes::{bounded_call, ClusterApi};
use crate::metrics::MetricsSink;
use crate::sync::NamespacePolicy;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts observed during one refresh
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub namespaces: usize,
    pub synced: usize,
    pub not_synced: usize,
    pub source_secrets: usize,
}

pub struct MetricsUpdater {
    cluster: Arc<dyn ClusterApi>,
    policy: NamespacePolicy,
    metrics: Arc<dyn MetricsSink>,
}

impl MetricsUpdater {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        policy: NamespacePolicy,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            cluster,
            policy,
            metrics,
        }
    }

    async fn holds_all(
        &self,
        namespace: &Namespace,
        sources: &[Secret],
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let target = namespace.name_any();
        for source in sources {
            let name = source.name_any();
            let found = bounded_call(cancel, "get secret", self.cluster.get_secret(&target, &name)).await?;
            if found.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// List namespaces and source secrets once and publish the gauges.
    ///
    /// Only eligible namespaces count towards synced and not synced.
    pub async fn update_once(&self, cancel: &CancellationToken) -> Result<Coverage> {
        let namespaces = bounded_call(cancel, "list namespaces", self.cluster.list_namespaces()).await?;
        self.metrics.set_namespace_total(namespaces.len());

        let sources = bounded_call(
            cancel,
            "list source secrets",
            self.cluster
                .list_secrets(&self.policy.source_namespace, Some(labels::SOURCE_SELECTOR)),
        )
        .await?;
        self.metrics.set_source_secrets_total(sources.len());

        let mut coverage = Coverage {
            namespaces: namespaces.len(),
            source_secrets: sources.len(),
            ..Default::default()
        };
        for namespace in namespaces.iter().filter(|ns| self.policy.is_eligible(ns)) {
            match self.holds_all(namespace, &sources, cancel).await {
                Ok(true) => coverage.synced += 1,
                Ok(false) => coverage.not_synced += 1,
                Err(PushError::Cancelled) => return Err(PushError::Cancelled),
                Err(e) => {
                    debug!("Could not inspect namespace {}: {}", namespace.name_any(), e);
                    coverage.not_synced += 1;
                }
            }
        }

        self.metrics.set_namespaces_synced(coverage.synced);
        self.metrics.set_namespaces_not_synced(coverage.not_synced);
        self.metrics
            .set_managed_secrets_total(coverage.synced + coverage.not_synced);

        info!(
            "Metrics updated: Total namespaces={}, Synced={}, Not Synced={}, Source Secrets={}, Managed Secrets={}",
            coverage.namespaces,
            coverage.synced,
            coverage.not_synced,
            coverage.source_secrets,
            coverage.synced + coverage.not_synced
        );
        Ok(coverage)
    }

    pub async fn run(self, cancel: CancellationToken, every: Duration) -> Result<()> {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => match self.update_once(&cancel).await {
                    Ok(_) | Err(PushError::Cancelled) => {}
                    Err(e) => warn!("Failed to update metrics: {}", e),
                },
            }
        }
    }

    pub fn start(self, every: Duration, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel, every))
    }
}

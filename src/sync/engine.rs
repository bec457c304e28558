// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per (secret, namespace) convergence and the sweeps built on it.

use crate::constants::labels;
use crate::error::{PushError, Result};
use crate::kubernetes::{bounded_call, ClusterApi};
use crate::metrics::MetricsSink;
use crate::sync::filter::NamespacePolicy;
use crate::sync::rate_limiter::RateLimiter;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What `reconcile_one` did for a single pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Skipped,
    Excluded,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Excluded => "excluded",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated outcomes of a sweep or batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub excluded: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Excluded => self.excluded += 1,
        }
    }

    pub fn merge(&mut self, other: SyncSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.excluded += other.excluded;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }

    /// Number of write calls that succeeded
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} skipped={} excluded={} deleted={} failed={}",
            self.created, self.updated, self.skipped, self.excluded, self.deleted, self.failed
        )
    }
}

fn non_empty<V>(map: &Option<BTreeMap<String, V>>) -> Option<&BTreeMap<String, V>> {
    map.as_ref().filter(|m| !m.is_empty())
}

/// Whether two secrets carry the same payload. Absent and empty maps are equal.
pub fn data_matches(a: &Secret, b: &Secret) -> bool {
    non_empty(&a.data) == non_empty(&b.data) && non_empty(&a.string_data) == non_empty(&b.string_data)
}

/// Source labels without the marker label
fn replica_labels(source: &Secret) -> Option<BTreeMap<String, String>> {
    let labels: BTreeMap<String, String> = source
        .labels()
        .iter()
        .filter(|(k, _)| k.as_str() != labels::SOURCE_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (!labels.is_empty()).then_some(labels)
}

/// Build a fresh replica of `source` for `namespace`.
///
/// Only name, namespace, labels and annotations are carried over in the
/// metadata; UID, resource version, timestamps, generation and managed fields
/// are left for the API server to assign.
pub fn build_replica(source: &Secret, namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: source.metadata.name.clone(),
            namespace: Some(namespace.to_string()),
            labels: replica_labels(source),
            annotations: source.metadata.annotations.clone(),
            ..Default::default()
        },
        data: source.data.clone(),
        string_data: source.string_data.clone(),
        type_: source.type_.clone(),
        immutable: None,
    }
}

/// Overwrite the payload of a fetched replica in place, keeping its own identity
pub fn apply_source(existing: &mut Secret, source: &Secret) {
    existing.data = source.data.clone();
    existing.string_data = source.string_data.clone();
    existing.type_ = source.type_.clone();
    existing.metadata.labels = replica_labels(source);
    existing.metadata.annotations = source.metadata.annotations.clone();
}

/// Performs create/update/skip/delete decisions against the cluster.
///
/// Every write waits on the shared [`RateLimiter`]; every call is bounded by
/// the per-call timeout and aborts when the engine's token is cancelled.
#[derive(Clone)]
pub struct SyncEngine {
    cluster: Arc<dyn ClusterApi>,
    policy: NamespacePolicy,
    limiter: Arc<RateLimiter>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        policy: NamespacePolicy,
        limiter: Arc<RateLimiter>,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cluster,
            policy,
            limiter,
            metrics,
            cancel,
        }
    }

    /// Same engine observing a different lifetime token
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn cluster(&self) -> Arc<dyn ClusterApi> {
        self.cluster.clone()
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub async fn list_source_secrets(&self) -> Result<Vec<Secret>> {
        let namespace = &self.policy.source_namespace;
        bounded_call(
            &self.cancel,
            "list source secrets",
            self.cluster
                .list_secrets(namespace, Some(labels::SOURCE_SELECTOR)),
        )
        .await
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        bounded_call(&self.cancel, "list namespaces", self.cluster.list_namespaces()).await
    }

    /// Converge one replica with its source.
    ///
    /// Errors other than a benign create race are returned to the caller.
    #[instrument(skip(self, source, namespace), fields(secret = %source.name_any(), namespace = %namespace.name_any()))]
    pub async fn reconcile_one(&self, source: &Secret, namespace: &Namespace) -> Result<SyncOutcome> {
        if !self.policy.is_eligible(namespace) {
            debug!(outcome = "excluded", "Namespace not eligible for replicas");
            return Ok(SyncOutcome::Excluded);
        }

        let target = namespace.name_any();
        let name = source.name_any();

        let existing = bounded_call(
            &self.cancel,
            "get secret",
            self.cluster.get_secret(&target, &name),
        )
        .await?;

        match existing {
            None => {
                let replica = build_replica(source, &target);
                self.limiter.acquire(&self.cancel).await?;
                match bounded_call(
                    &self.cancel,
                    "create secret",
                    self.cluster.create_secret(&target, &replica),
                )
                .await
                {
                    Ok(_) => {
                        info!(outcome = "created", "Created secret {} in namespace {}", name, target);
                        Ok(SyncOutcome::Created)
                    }
                    Err(PushError::AlreadyExists(_)) => {
                        info!(
                            outcome = "skipped",
                            "Secret {} was created concurrently in namespace {}, leaving it for the next pass",
                            name, target
                        );
                        Ok(SyncOutcome::Skipped)
                    }
                    Err(e) => Err(e),
                }
            }
            Some(existing) if data_matches(&existing, source) => {
                debug!(outcome = "skipped", "Secret {} in namespace {} is up-to-date", name, target);
                Ok(SyncOutcome::Skipped)
            }
            Some(mut existing) => {
                apply_source(&mut existing, source);
                self.limiter.acquire(&self.cancel).await?;
                bounded_call(
                    &self.cancel,
                    "update secret",
                    self.cluster.replace_secret(&target, &existing),
                )
                .await?;
                info!(outcome = "updated", "Updated secret {} in namespace {}", name, target);
                Ok(SyncOutcome::Updated)
            }
        }
    }

    /// Fold one pair's result into `summary`. Only cancellation escapes.
    fn tally(
        &self,
        summary: &mut SyncSummary,
        secret: &str,
        namespace: &str,
        result: Result<SyncOutcome>,
    ) -> Result<()> {
        match result {
            Ok(outcome) => {
                summary.record(outcome);
                self.metrics.record_sync_outcome(outcome.as_str());
                Ok(())
            }
            Err(PushError::Cancelled) => Err(PushError::Cancelled),
            Err(e) => {
                warn!(
                    outcome = "error",
                    "Failed to sync secret {} to namespace {}: {}", secret, namespace, e
                );
                summary.failed += 1;
                self.metrics.record_sync_error();
                Ok(())
            }
        }
    }

    /// Converge one source secret into every eligible namespace in `namespaces`
    pub async fn reconcile_all_namespaces(
        &self,
        source: &Secret,
        namespaces: &[Namespace],
    ) -> Result<SyncSummary> {
        let name = source.name_any();
        let mut summary = SyncSummary::default();
        for namespace in namespaces {
            let result = self.reconcile_one(source, namespace).await;
            self.tally(&mut summary, &name, &namespace.name_any(), result)?;
        }
        Ok(summary)
    }

    /// Delete the replica named `secret_name` from every eligible namespace. Absence counts as success.
    #[instrument(skip(self, namespaces))]
    pub async fn remove_from_all_namespaces(
        &self,
        secret_name: &str,
        namespaces: &[Namespace],
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        for namespace in namespaces {
            if !self.policy.is_eligible(namespace) {
                summary.excluded += 1;
                continue;
            }
            let target = namespace.name_any();
            let result = match self.limiter.acquire(&self.cancel).await {
                Ok(()) => {
                    bounded_call(
                        &self.cancel,
                        "delete secret",
                        self.cluster.delete_secret(&target, secret_name),
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => {
                    info!(outcome = "deleted", "Deleted secret {} from namespace {}", secret_name, target);
                    summary.deleted += 1;
                    self.metrics.record_sync_outcome("deleted");
                }
                Ok(false) => {
                    debug!(outcome = "skipped", "Secret {} not present in namespace {}", secret_name, target);
                    summary.skipped += 1;
                }
                Err(PushError::Cancelled) => return Err(PushError::Cancelled),
                Err(e) => {
                    warn!(
                        outcome = "error",
                        "Failed to delete secret {} from namespace {}: {}", secret_name, target, e
                    );
                    summary.failed += 1;
                    self.metrics.record_sync_error();
                }
            }
        }
        Ok(summary)
    }

    /// Converge every current source secret into a single namespace
    #[instrument(skip(self, namespace), fields(namespace = %namespace.name_any()))]
    pub async fn reconcile_namespace(&self, namespace: &Namespace) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        if !self.policy.is_eligible(namespace) {
            summary.excluded += 1;
            return Ok(summary);
        }

        let target = namespace.name_any();
        for secret in self.list_source_secrets().await? {
            let result = self.reconcile_one(&secret, namespace).await;
            self.tally(&mut summary, &secret.name_any(), &target, result)?;
        }
        Ok(summary)
    }

    /// Full sweep: every labeled source secret against every namespace.
    ///
    /// Replicas whose source no longer exists are left alone; deletions only
    /// propagate through observed delete events.
    #[instrument(skip(self), fields(source = %self.policy.source_namespace))]
    pub async fn reconcile_full(&self) -> Result<SyncSummary> {
        let secrets = self.list_source_secrets().await?;
        if secrets.is_empty() {
            info!(
                "No secrets found in namespace {} with label {}",
                self.policy.source_namespace,
                labels::SOURCE_SELECTOR
            );
            return Ok(SyncSummary::default());
        }
        let namespaces = self.list_namespaces().await?;

        let mut summary = SyncSummary::default();
        for secret in &secrets {
            summary.merge(self.reconcile_all_namespaces(secret, &namespaces).await?);
        }
        Ok(summary)
    }
}

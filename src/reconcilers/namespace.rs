// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace watcher - populates newly created namespaces with every source secret.

use crate::constants::CACHE_SYNC_TIMEOUT;
use crate::error::{PushError, Result};
use crate::reconcilers::informer::{Informer, Notification};
use crate::sync::SyncEngine;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct NamespaceWatcher {
    engine: SyncEngine,
}

impl NamespaceWatcher {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    /// Reconcile a single new namespace. Returns `false` once cancelled.
    async fn namespace_added(&self, namespace: &Namespace) -> bool {
        let name = namespace.name_any();
        if !self.engine.policy().is_eligible(namespace) {
            debug!("Namespace {} added but excluded from sync", name);
            return true;
        }

        info!("Namespace {} added, syncing source secrets", name);
        match self.engine.reconcile_namespace(namespace).await {
            Ok(summary) => {
                info!("Synced namespace {}: {}", name, summary);
                true
            }
            Err(PushError::Cancelled) => false,
            Err(e) => {
                warn!("Failed to sync secrets to new namespace {}: {}", name, e);
                true
            }
        }
    }

    /// Returns `false` once cancelled
    async fn dispatch(&self, notifications: Vec<Notification<Namespace>>) -> bool {
        for notification in notifications {
            if let Notification::Added(namespace) = notification {
                if !self.namespace_added(&namespace).await {
                    return false;
                }
            }
        }
        true
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut stream = self.engine.cluster().watch_namespaces();
        // Replaying the listing covers namespaces created between the first
        // full sweep and the end of this listing. Up-to-date ones only cost reads.
        let mut informer = Informer::new("namespace", true);

        let initial = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = informer.sync(&mut stream, CACHE_SYNC_TIMEOUT) => res?,
        };
        info!("Watching namespaces ({} present)", informer.len());
        if !self.dispatch(initial).await {
            return Ok(());
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = stream.next() => event,
            };
            match event {
                Some(Ok(event)) => {
                    if !self.dispatch(informer.handle(event)).await {
                        return Ok(());
                    }
                }
                Some(Err(e)) => warn!("Namespace watch error: {}", e),
                None => return Err(PushError::Watch("namespace watch stream ended".to_string())),
            }
        }
    }
}

pub fn start_namespace_watcher(engine: SyncEngine, cancel: CancellationToken) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let res = NamespaceWatcher::new(engine).run(cancel).await;
        if let Err(e) = &res {
            error!("Namespace watcher stopped: {}", e);
        }
        res
    })
}

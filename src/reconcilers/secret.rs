// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Source secret watcher - watches labeled secrets in the source namespace and feeds the event queue.

use crate::constants::{labels, CACHE_SYNC_TIMEOUT};
use crate::error::{PushError, Result};
use crate::reconcilers::informer::{Informer, Notification};
use crate::sync::engine::data_matches;
use crate::sync::{EventQueue, EventQueueHandle, SyncEngine, SyncEvent};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct SourceSecretWatcher {
    engine: SyncEngine,
    queue: EventQueueHandle,
}

/// Translate a cache notification into a sync event.
///
/// Updates that leave the payload untouched (labels, annotations, resync
/// noise) produce nothing.
pub fn to_sync_event(notification: Notification<Secret>) -> Option<SyncEvent> {
    match notification {
        Notification::Added(secret) => Some(SyncEvent::added(secret)),
        Notification::Updated { old, new } => {
            if data_matches(&old, &new) {
                debug!("Ignoring metadata-only change to secret {}", new.name_any());
                None
            } else {
                Some(SyncEvent::updated(new))
            }
        }
        Notification::Deleted(secret) => Some(SyncEvent::deleted(secret.name_any())),
    }
}

impl SourceSecretWatcher {
    pub fn new(engine: SyncEngine, queue: EventQueueHandle) -> Self {
        Self { engine, queue }
    }

    /// Returns `Ok(false)` once the queue stops accepting events
    async fn forward(&self, notification: Notification<Secret>, cancel: &CancellationToken) -> bool {
        let Some(event) = to_sync_event(notification) else {
            return true;
        };
        debug!("Secret {} changed: {:?}", event.secret_name, event.kind);
        self.queue.send(event, cancel).await.is_ok()
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let namespace = self.engine.policy().source_namespace.clone();
        let mut stream = self
            .engine
            .cluster()
            .watch_secrets(&namespace, labels::SOURCE_SELECTOR);
        let mut informer = Informer::new("secret", true);

        let initial = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = informer.sync(&mut stream, CACHE_SYNC_TIMEOUT) => res?,
        };
        info!(
            "Watching secrets in namespace {} with label {} ({} found)",
            namespace,
            labels::SOURCE_SELECTOR,
            informer.len()
        );

        for notification in initial {
            if !self.forward(notification, &cancel).await {
                return Ok(());
            }
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = stream.next() => event,
            };
            match event {
                Some(Ok(event)) => {
                    for notification in informer.handle(event) {
                        if !self.forward(notification, &cancel).await {
                            return Ok(());
                        }
                    }
                }
                Some(Err(e)) => warn!("Secret watch error: {}", e),
                None => return Err(PushError::Watch("secret watch stream ended".to_string())),
            }
        }
    }
}

/// Start the event-driven path: the source secret watcher plus its debounced queue.
///
/// The queue flushes and stops once the watcher exits, whether through
/// cancellation or a failure to sync its cache.
pub fn start_source_secret_watcher(
    engine: SyncEngine,
    debounce: Duration,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    let (queue, handle) = EventQueue::new(engine.clone(), debounce);
    let watcher = SourceSecretWatcher::new(engine, handle);

    tokio::spawn(async move {
        let (watched, queued) = tokio::join!(watcher.run(cancel.clone()), queue.run(cancel));
        if let Err(e) = &watched {
            error!("Source secret watcher stopped: {}", e);
        }
        watched.and(queued)
    })
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Debounced event queue between the source-secret watcher and the sync engine.
//!
//! Events are coalesced per secret name (last write wins). Every event resets
//! the quiet period; when it elapses the whole pending batch is applied once.

use crate::constants::{DRAIN_TIMEOUT, EVENT_QUEUE_CAPACITY};
use crate::error::{PushError, Result};
use crate::sync::engine::{SyncEngine, SyncSummary};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEventKind {
    Add,
    Update,
    Delete,
}

/// A change to one source secret. Add and Update carry the snapshot to replicate.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub secret_name: String,
    pub snapshot: Option<Secret>,
}

impl SyncEvent {
    pub fn added(secret: Secret) -> Self {
        Self {
            kind: SyncEventKind::Add,
            secret_name: secret.name_any(),
            snapshot: Some(secret),
        }
    }

    pub fn updated(secret: Secret) -> Self {
        Self {
            kind: SyncEventKind::Update,
            secret_name: secret.name_any(),
            snapshot: Some(secret),
        }
    }

    pub fn deleted(name: impl Into<String>) -> Self {
        Self {
            kind: SyncEventKind::Delete,
            secret_name: name.into(),
            snapshot: None,
        }
    }
}

/// Debounce timer. While idle, `fired` never completes.
enum DebounceTimer {
    Idle,
    Armed(Pin<Box<Sleep>>),
}

impl DebounceTimer {
    /// Arm for a full window, replacing any earlier deadline
    fn arm(&mut self, window: Duration) {
        *self = DebounceTimer::Armed(Box::pin(sleep(window)));
    }

    fn disarm(&mut self) {
        *self = DebounceTimer::Idle;
    }

    async fn fired(&mut self) {
        match self {
            DebounceTimer::Idle => std::future::pending().await,
            DebounceTimer::Armed(deadline) => deadline.as_mut().await,
        }
    }
}

/// Producer side of an [`EventQueue`]
#[derive(Clone)]
pub struct EventQueueHandle {
    tx: mpsc::Sender<SyncEvent>,
}

impl EventQueueHandle {
    /// Enqueue an event, waiting for room when the queue is full
    pub async fn send(&self, event: SyncEvent, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PushError::Cancelled),
            res = self.tx.send(event) => res.map_err(|_| PushError::Cancelled),
        }
    }
}

pub struct EventQueue {
    engine: SyncEngine,
    window: Duration,
    rx: mpsc::Receiver<SyncEvent>,
    pending: BTreeMap<String, SyncEvent>,
}

impl EventQueue {
    pub fn new(engine: SyncEngine, window: Duration) -> (Self, EventQueueHandle) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let queue = Self {
            engine,
            window,
            rx,
            pending: BTreeMap::new(),
        };
        (queue, EventQueueHandle { tx })
    }

    fn enqueue(&mut self, event: SyncEvent) {
        debug!(
            "Queued {:?} for secret {}",
            event.kind, event.secret_name
        );
        self.pending.insert(event.secret_name.clone(), event);
    }

    /// Process events until `cancel` fires or every handle is dropped, then
    /// apply whatever is still pending exactly once.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut timer = DebounceTimer::Idle;
        info!("Event queue started with debounce window {:?}", self.window);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.rx.close();
                    while let Ok(event) = self.rx.try_recv() {
                        self.enqueue(event);
                    }
                    self.drain().await;
                    return Ok(());
                }
                event = self.rx.recv() => match event {
                    Some(event) => {
                        self.enqueue(event);
                        timer.arm(self.window);
                    }
                    None => {
                        debug!("All event producers gone");
                        self.drain().await;
                        return Ok(());
                    }
                },
                _ = timer.fired() => {
                    timer.disarm();
                    match apply_batch(&self.engine, &mut self.pending).await {
                        Ok(summary) => info!("Applied secret sync batch: {}", summary),
                        Err(PushError::Cancelled) => {
                            debug!("Batch interrupted, {} secret(s) left for drain", self.pending.len());
                        }
                        Err(e) => {
                            warn!("Failed to apply secret sync batch, retrying in {:?}: {}", self.window, e);
                            timer.arm(self.window);
                        }
                    }
                }
            }
        }
    }

    /// Final application of the pending batch, independent of the cancelled root token
    async fn drain(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        info!("Processing {} pending secret(s) before shutdown", self.pending.len());
        let engine = self.engine.with_cancellation(CancellationToken::new());
        match tokio::time::timeout(DRAIN_TIMEOUT, apply_batch(&engine, &mut self.pending)).await {
            Ok(Ok(summary)) => info!("Applied final secret sync batch: {}", summary),
            Ok(Err(e)) => warn!("Final secret sync batch failed: {}", e),
            Err(_) => warn!(
                "Final secret sync batch did not finish within {:?}, {} secret(s) dropped",
                DRAIN_TIMEOUT,
                self.pending.len()
            ),
        }
        self.pending.clear();
    }
}

/// Apply every event in `batch`, removing each once handled.
///
/// On error the unprocessed events stay in `batch`.
async fn apply_batch(engine: &SyncEngine, batch: &mut BTreeMap<String, SyncEvent>) -> Result<SyncSummary> {
    let namespaces = engine.list_namespaces().await?;
    let names: Vec<String> = batch.keys().cloned().collect();
    let mut summary = SyncSummary::default();

    for name in names {
        let Some(event) = batch.get(&name) else {
            continue;
        };
        let result = match (event.kind, &event.snapshot) {
            (SyncEventKind::Delete, _) => engine.remove_from_all_namespaces(&name, &namespaces).await,
            (_, Some(secret)) => engine.reconcile_all_namespaces(secret, &namespaces).await,
            (kind, None) => {
                warn!("Dropping {:?} event for secret {} without a snapshot", kind, name);
                Ok(SyncSummary::default())
            }
        };
        summary.merge(result?);
        batch.remove(&name);
    }
    Ok(summary)
}

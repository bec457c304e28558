// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic full reconciliation, the backstop for everything the watchers miss.

use crate::error::{PushError, Result};
use crate::sync::SyncEngine;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct PeriodicReconciler {
    engine: SyncEngine,
    interval: Duration,
}

impl PeriodicReconciler {
    pub fn new(engine: SyncEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// One full sweep. Returns `false` once cancelled.
    async fn sweep(&self) -> bool {
        info!("Starting full secret reconciliation");
        match self.engine.reconcile_full().await {
            Ok(summary) => {
                info!("Full reconciliation finished: {}", summary);
                true
            }
            Err(PushError::Cancelled) => false,
            Err(e) => {
                warn!("Full reconciliation failed: {}", e);
                true
            }
        }
    }

    /// Sweep once immediately, then on every tick until cancelled
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        if !self.sweep().await {
            return Ok(());
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Next reconciliation in {:?}", self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if !self.sweep().await {
                        return Ok(());
                    }
                }
            }
        }
    }
}

pub fn start_periodic_reconciler(
    engine: SyncEngine,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(PeriodicReconciler::new(engine, interval).run(cancel))
}

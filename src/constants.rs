// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Marker label identifying a secret as a replication source
pub mod labels {
    /// Label key carried by source secrets; stripped from every replica
    pub const SOURCE_KEY: &str = "push-to-k8s";
    /// Label value carried by source secrets
    pub const SOURCE_VALUE: &str = "source";
    /// Label selector matching source secrets
    pub const SOURCE_SELECTOR: &str = "push-to-k8s=source";
}

/// Bounds for every single cluster API call issued by the sync engine
pub const API_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the channel between the source secret watcher and the debouncer
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// How long a watcher waits for its initial listing before giving up
pub const CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on the post-cancellation flush of a pending debounce batch
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Time the process waits for its tasks after the shutdown signal
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Upper bound on a single metrics server request
pub const METRICS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between refreshes of the aggregate gauges
pub const METRICS_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration defaults and accepted ranges
pub mod defaults {
    pub const METRICS_PORT: u16 = 9090;
    pub const SYNC_INTERVAL_MINUTES: u64 = 15;
    pub const SYNC_INTERVAL_RANGE: (i64, i64) = (1, 1440);
    pub const DEBOUNCE_SECONDS: u64 = 5;
    pub const DEBOUNCE_RANGE: (i64, i64) = (1, 60);
    pub const RATE_LIMIT: u32 = 10;
    pub const RATE_LIMIT_RANGE: (i64, i64) = (1, 100);
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Secret replication: eligibility, per-namespace convergence, throttling and debouncing.

pub mod engine;
pub mod filter;
pub mod queue;
pub mod rate_limiter;

pub use engine::{SyncEngine, SyncOutcome, SyncSummary};
pub use filter::{is_eligible, NamespacePolicy};
pub use queue::{EventQueue, EventQueueHandle, SyncEvent, SyncEventKind};
pub use rate_limiter::RateLimiter;

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Long-running tasks that drive the sync engine: watchers and the periodic sweep.

pub mod informer;
pub mod namespace;
pub mod periodic;
pub mod secret;

pub use informer::{Informer, Notification};
pub use namespace::{start_namespace_watcher, NamespaceWatcher};
pub use periodic::{start_periodic_reconciler, PeriodicReconciler};
pub use secret::{start_source_secret_watcher, SourceSecretWatcher};

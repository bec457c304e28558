// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes access: client bootstrap, the cluster capability used by the sync engine, and watches.

pub mod api;
pub mod client;
pub mod watch;

pub use api::{bounded_call, ClusterApi, KubeCluster};
pub use client::create_cluster_connection;
pub use watch::WatchEvent;

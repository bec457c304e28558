// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Library-independent watch events on top of `kube_runtime::watcher`.

use crate::error::{PushError, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use kube_runtime::watcher::{self, Event};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// A single observation from a long-lived watch.
///
/// A (re)list is framed by `Restarted` and `Synced`; every object seen in
/// between is delivered as `Applied`.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Restarted,
    Applied(K),
    Deleted(K),
    Synced,
}

impl<K> From<Event<K>> for WatchEvent<K> {
    fn from(event: Event<K>) -> Self {
        match event {
            Event::Init => WatchEvent::Restarted,
            Event::InitApply(obj) | Event::Apply(obj) => WatchEvent::Applied(obj),
            Event::InitDone => WatchEvent::Synced,
            Event::Delete(obj) => WatchEvent::Deleted(obj),
        }
    }
}

/// Watch `api` with the given config, retrying with the default backoff.
pub fn watch_stream<K>(
    api: Api<K>,
    config: watcher::Config,
) -> BoxStream<'static, Result<WatchEvent<K>>>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    watcher::watcher(api, config)
        .default_backoff()
        .map(|event| match event {
            Ok(event) => Ok(WatchEvent::from(event)),
            Err(e) => Err(PushError::Watch(e.to_string())),
        })
        .boxed()
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Name-keyed local cache turning raw watch events into add/update/delete notifications.

use crate::error::{PushError, Result};
use crate::kubernetes::WatchEvent;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::Resource;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

/// Local cache of one watched collection.
///
/// A relist (`Restarted` ... `Synced`) is buffered and diffed against the
/// cache when it completes, so objects that vanished while the watch was
/// disconnected surface as `Deleted`. The first listing only fills the cache
/// unless `replay_initial` is set.
pub struct Informer<K> {
    kind: &'static str,
    cache: BTreeMap<String, K>,
    relist: Option<BTreeMap<String, K>>,
    synced: bool,
    replay_initial: bool,
}

impl<K> Informer<K>
where
    K: Resource + Clone,
{
    pub fn new(kind: &'static str, replay_initial: bool) -> Self {
        Self {
            kind,
            cache: BTreeMap::new(),
            relist: None,
            synced: false,
            replay_initial,
        }
    }

    pub fn has_synced(&self) -> bool {
        self.synced
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn name_of(&self, obj: &K) -> Option<String> {
        let name = obj.meta().name.clone();
        if name.is_none() {
            warn!("Dropping {} event for object without a name", self.kind);
        }
        name
    }

    /// Apply one watch event to the cache
    pub fn handle(&mut self, event: WatchEvent<K>) -> Vec<Notification<K>> {
        match event {
            WatchEvent::Restarted => {
                self.relist = Some(BTreeMap::new());
                Vec::new()
            }
            WatchEvent::Applied(obj) => {
                let Some(name) = self.name_of(&obj) else {
                    return Vec::new();
                };
                if let Some(buffer) = self.relist.as_mut() {
                    buffer.insert(name, obj);
                    return Vec::new();
                }
                match self.cache.insert(name, obj.clone()) {
                    Some(old) => vec![Notification::Updated { old, new: obj }],
                    None => vec![Notification::Added(obj)],
                }
            }
            WatchEvent::Deleted(obj) => {
                let Some(name) = self.name_of(&obj) else {
                    return Vec::new();
                };
                if let Some(buffer) = self.relist.as_mut() {
                    buffer.remove(&name);
                }
                self.cache.remove(&name);
                vec![Notification::Deleted(obj)]
            }
            WatchEvent::Synced => self.finish_relist(),
        }
    }

    fn finish_relist(&mut self) -> Vec<Notification<K>> {
        let listed = self.relist.take().unwrap_or_default();

        if !self.synced {
            self.synced = true;
            debug!("Initial {} listing holds {} object(s)", self.kind, listed.len());
            let replay = if self.replay_initial {
                listed.values().cloned().map(Notification::Added).collect()
            } else {
                Vec::new()
            };
            self.cache = listed;
            return replay;
        }

        let previous = std::mem::take(&mut self.cache);
        let mut notifications: Vec<Notification<K>> = previous
            .iter()
            .filter(|(name, _)| !listed.contains_key(*name))
            .map(|(_, old)| Notification::Deleted(old.clone()))
            .collect();
        for (name, obj) in &listed {
            notifications.push(match previous.get(name) {
                Some(old) => Notification::Updated {
                    old: old.clone(),
                    new: obj.clone(),
                },
                None => Notification::Added(obj.clone()),
            });
        }
        self.cache = listed;
        notifications
    }

    /// Consume `stream` until the initial listing completes.
    ///
    /// Returns the notifications produced by that listing. Watch errors are
    /// logged while the stream retries; fails if the listing does not finish
    /// within `limit` or the stream ends.
    pub async fn sync(
        &mut self,
        stream: &mut BoxStream<'static, Result<WatchEvent<K>>>,
        limit: Duration,
    ) -> Result<Vec<Notification<K>>> {
        let kind = self.kind;
        let wait = async {
            let mut notifications = Vec::new();
            while !self.synced {
                match stream.next().await {
                    Some(Ok(event)) => notifications.extend(self.handle(event)),
                    Some(Err(e)) => warn!("Error while listing {}: {}", kind, e),
                    None => {
                        return Err(PushError::CacheSync(format!(
                            "{} watch ended before the initial listing completed",
                            kind
                        )))
                    }
                }
            }
            Ok(notifications)
        };

        match tokio::time::timeout(limit, wait).await {
            Ok(res) => res,
            Err(_) => Err(PushError::CacheSync(format!(
                "{} cache did not sync within {:?}",
                kind, limit
            ))),
        }
    }
}

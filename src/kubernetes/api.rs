// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The cluster capability consumed by the sync engine and watchers.

use crate::constants::API_CALL_TIMEOUT;
use crate::error::{PushError, Result};
use crate::kubernetes::watch::{watch_stream, WatchEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Namespace-scoped secret operations and cluster-scoped namespace listing.
///
/// Absence is not an error: `get_secret` yields `None` and `delete_secret`
/// yields `false` when the object does not exist. A create that collides with
/// an existing object fails with [`PushError::AlreadyExists`].
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Secret>>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Replace an existing secret. The payload's UID and resource version act as preconditions.
    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    fn watch_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> BoxStream<'static, Result<WatchEvent<Secret>>>;

    fn watch_namespaces(&self) -> BoxStream<'static, Result<WatchEvent<Namespace>>>;
}

/// Run one cluster call under the fixed per-call timeout, giving up early on cancellation.
pub async fn bounded_call<T, F>(cancel: &CancellationToken, what: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PushError::Cancelled),
        res = tokio::time::timeout(API_CALL_TIMEOUT, call) => match res {
            Ok(inner) => inner,
            Err(_) => Err(PushError::Timeout(format!(
                "{} did not complete within {:?}",
                what, API_CALL_TIMEOUT
            ))),
        },
    }
}

/// [`ClusterApi`] backed by a live kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    #[instrument(skip(self))]
    async fn list_secrets(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Secret>> {
        let lp = match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        Ok(self.secrets(namespace).list(&lp).await?.items)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        match self
            .secrets(namespace)
            .create(&PostParams::default(), secret)
            .await
        {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(PushError::AlreadyExists(
                format!("{}/{}", namespace, secret.name_any()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        Ok(self
            .secrets(namespace)
            .replace(&secret.name_any(), &PostParams::default(), secret)
            .await?)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool> {
        match self
            .secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!("Secret {}/{} already absent", namespace, name);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.list(&ListParams::default()).await?.items)
    }

    fn watch_secrets(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> BoxStream<'static, Result<WatchEvent<Secret>>> {
        watch_stream(
            self.secrets(namespace),
            WatcherConfig::default().labels(label_selector),
        )
    }

    fn watch_namespaces(&self) -> BoxStream<'static, Result<WatchEvent<Namespace>>> {
        watch_stream(Api::all(self.client.clone()), WatcherConfig::default())
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock HTTP backend for the kube client, an in-memory
//! cluster, fixtures and a recording metrics sink.

use crate::constants::labels;
use crate::error::{PushError, Result};
use crate::kubernetes::{ClusterApi, WatchEvent};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::sync::{NamespacePolicy, RateLimiter, SyncEngine};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, StreamExt};
use http::{Request, Response};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::Service;

type Responses = HashMap<(String, String), (u16, String)>;

/// A mock HTTP service that returns predefined responses based on request paths
/// and records every request it receives.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for POST requests matching the exact path
    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// `(method, path, query)` for every request seen so far
    pub fn requests(&self) -> Vec<(String, String, String)> {
        self.requests.lock().unwrap().clone()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        self.responses
            .lock()
            .unwrap()
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or_default().to_string();
        self.requests
            .lock()
            .unwrap()
            .push((method.clone(), path.clone(), query));

        let (status, body) = self
            .find_response(&method, &path)
            .unwrap_or_else(|| (404, not_found_json("secrets", &path)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a mock secret JSON response
pub fn secret_json(namespace: &str, name: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("{}-{}-uid", namespace, name),
            "resourceVersion": "1",
            "labels": { (labels::SOURCE_KEY): labels::SOURCE_VALUE }
        },
        "type": "Opaque",
        "data": { "user": "YWRtaW4=" }
    })
    .to_string()
}

pub fn secret_list_json(namespace: &str, names: &[&str]) -> String {
    let items: Vec<serde_json::Value> = names
        .iter()
        .map(|name| serde_json::from_str(&secret_json(namespace, name)).unwrap())
        .collect();
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "SecretList",
        "metadata": { "resourceVersion": "1" },
        "items": items
    })
    .to_string()
}

/// Create a 409 conflict response for a create that raced
pub fn already_exists_json(name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("secrets \"{}\" already exists", name),
        "reason": "AlreadyExists",
        "code": 409
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn labeled_namespace(name: &str, key: &str, value: &str) -> Namespace {
    let mut ns = namespace(name);
    ns.metadata.labels = Some(BTreeMap::from([(key.to_string(), value.to_string())]));
    ns
}

/// An Opaque secret carrying the source marker label
pub fn source_secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("src".to_string()),
            labels: Some(BTreeMap::from([(
                labels::SOURCE_KEY.to_string(),
                labels::SOURCE_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Engine over `cluster` with a limiter generous enough not to pace tests
pub fn engine_for(cluster: Arc<FakeCluster>, source: &str, exclude_label: &str) -> SyncEngine {
    SyncEngine::new(
        cluster,
        NamespacePolicy::new(source, exclude_label),
        Arc::new(RateLimiter::new(1000)),
        Arc::new(NoopMetrics),
        CancellationToken::new(),
    )
}

/// A successful write observed by [`FakeCluster`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Create { namespace: String, name: String },
    Replace { namespace: String, name: String },
    Delete { namespace: String, name: String },
}

impl Write {
    pub fn namespace(&self) -> &str {
        match self {
            Write::Create { namespace, .. }
            | Write::Replace { namespace, .. }
            | Write::Delete { namespace, .. } => namespace,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Write::Create { name, .. } | Write::Replace { name, .. } | Write::Delete { name, .. } => {
                name
            }
        }
    }
}

#[derive(Default)]
struct FakeState {
    namespaces: BTreeMap<String, Namespace>,
    secrets: BTreeMap<(String, String), Secret>,
    next_version: u64,
    calls: usize,
    writes: Vec<Write>,
    failing_namespaces: HashSet<String>,
    hidden: HashSet<(String, String)>,
    fail_namespace_list: bool,
    secret_feed: Option<mpsc::UnboundedReceiver<Result<WatchEvent<Secret>>>>,
    namespace_feed: Option<mpsc::UnboundedReceiver<Result<WatchEvent<Namespace>>>>,
}

impl FakeState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

fn api_error(code: u16, reason: &str, message: String) -> PushError {
    PushError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn matches_selector(secret: &Secret, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => secret.labels().get(k).map(String::as_str) == Some(v),
        None => secret.labels().contains_key(term),
    })
}

/// In-memory [`ClusterApi`] that behaves like the API server for the calls the
/// controller makes: it assigns UIDs and resource versions, rejects stale
/// replaces and creates of existing objects, and records every successful write.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_namespace(&self, namespace: Namespace) {
        let mut state = self.state.lock().unwrap();
        state.namespaces.insert(namespace.name_any(), namespace);
    }

    /// Store a secret directly, bypassing call accounting
    pub fn put_secret(&self, namespace: &str, mut secret: Secret) {
        let mut state = self.state.lock().unwrap();
        let name = secret.name_any();
        secret.metadata.namespace = Some(namespace.to_string());
        secret.metadata.uid = Some(format!("{}-{}-seeded", namespace, name));
        secret.metadata.resource_version = Some(state.bump());
        state.secrets.insert((namespace.to_string(), name), secret);
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .secrets
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Every create, replace and delete in `namespace` fails with a server error
    pub fn fail_writes_in(&self, namespace: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_namespaces
            .insert(namespace.to_string());
    }

    /// `get_secret` reports the object missing, simulating a create race
    pub fn hide_from_get(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .hidden
            .insert((namespace.to_string(), name.to_string()));
    }

    pub fn fail_namespace_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_namespace_list = fail;
    }

    /// Sender feeding the next `watch_secrets` stream
    pub fn secret_feed(&self) -> mpsc::UnboundedSender<Result<WatchEvent<Secret>>> {
        let (tx, rx) = mpsc::unbounded();
        self.state.lock().unwrap().secret_feed = Some(rx);
        tx
    }

    /// Sender feeding the next `watch_namespaces` stream
    pub fn namespace_feed(&self) -> mpsc::UnboundedSender<Result<WatchEvent<Namespace>>> {
        let (tx, rx) = mpsc::unbounded();
        self.state.lock().unwrap().namespace_feed = Some(rx);
        tx
    }

    fn check_writable(state: &FakeState, namespace: &str) -> Result<()> {
        if state.failing_namespaces.contains(namespace) {
            return Err(api_error(
                500,
                "InternalError",
                format!("injected failure in {}", namespace),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_secrets(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Secret>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Ok(state
            .secrets
            .iter()
            .filter(|((ns, _), s)| ns == namespace && matches_selector(s, label_selector))
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let key = (namespace.to_string(), name.to_string());
        if state.hidden.contains(&key) {
            return Ok(None);
        }
        Ok(state.secrets.get(&key).cloned())
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Self::check_writable(&state, namespace)?;
        let name = secret.name_any();
        let key = (namespace.to_string(), name.clone());
        if state.secrets.contains_key(&key) {
            return Err(PushError::AlreadyExists(format!("{}/{}", namespace, name)));
        }
        if secret.metadata.resource_version.is_some() {
            return Err(api_error(
                400,
                "BadRequest",
                "resourceVersion should not be set on objects to be created".to_string(),
            ));
        }
        let mut stored = secret.clone();
        let version = state.bump();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.uid = Some(format!("uid-{}", version));
        stored.metadata.resource_version = Some(version);
        state.secrets.insert(key, stored.clone());
        state.writes.push(Write::Create {
            namespace: namespace.to_string(),
            name,
        });
        Ok(stored)
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Self::check_writable(&state, namespace)?;
        let name = secret.name_any();
        let key = (namespace.to_string(), name.clone());
        let Some(current) = state.secrets.get(&key) else {
            return Err(api_error(404, "NotFound", format!("secrets \"{}\" not found", name)));
        };
        if secret.metadata.uid.is_some() && secret.metadata.uid != current.metadata.uid {
            return Err(api_error(409, "Conflict", "Precondition failed: UID".to_string()));
        }
        if secret.metadata.resource_version.is_some()
            && secret.metadata.resource_version != current.metadata.resource_version
        {
            return Err(api_error(
                409,
                "Conflict",
                "the object has been modified".to_string(),
            ));
        }
        let uid = current.metadata.uid.clone();
        let mut stored = secret.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.uid = uid;
        stored.metadata.resource_version = Some(state.bump());
        state.secrets.insert(key, stored.clone());
        state.writes.push(Write::Replace {
            namespace: namespace.to_string(),
            name,
        });
        Ok(stored)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        Self::check_writable(&state, namespace)?;
        let removed = state
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some();
        if removed {
            state.writes.push(Write::Delete {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(removed)
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.fail_namespace_list {
            return Err(api_error(503, "ServiceUnavailable", "apiserver down".to_string()));
        }
        Ok(state.namespaces.values().cloned().collect())
    }

    fn watch_secrets(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> BoxStream<'static, Result<WatchEvent<Secret>>> {
        match self.state.lock().unwrap().secret_feed.take() {
            Some(rx) => rx.boxed(),
            None => stream::pending().boxed(),
        }
    }

    fn watch_namespaces(&self) -> BoxStream<'static, Result<WatchEvent<Namespace>>> {
        match self.state.lock().unwrap().namespace_feed.take() {
            Some(rx) => rx.boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Sink that remembers what was recorded
#[derive(Default)]
pub struct RecordingMetrics {
    outcomes: Mutex<HashMap<String, usize>>,
    gauges: Mutex<HashMap<&'static str, usize>>,
    errors: Mutex<usize>,
    connections: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingMetrics {
    pub fn outcome_count(&self, outcome: &str) -> usize {
        self.outcomes
            .lock()
            .unwrap()
            .get(outcome)
            .copied()
            .unwrap_or_default()
    }

    pub fn errors(&self) -> usize {
        *self.errors.lock().unwrap()
    }

    pub fn gauge(&self, name: &str) -> Option<usize> {
        self.gauges.lock().unwrap().get(name).copied()
    }

    pub fn connections(&self) -> Vec<(String, Option<String>)> {
        self.connections.lock().unwrap().clone()
    }

    fn set(&self, name: &'static str, count: usize) {
        self.gauges.lock().unwrap().insert(name, count);
    }
}

impl MetricsSink for RecordingMetrics {
    fn connection_succeeded(&self, source: &str) {
        self.connections
            .lock()
            .unwrap()
            .push((source.to_string(), None));
    }

    fn connection_failed(&self, source: &str, error: &str) {
        self.connections
            .lock()
            .unwrap()
            .push((source.to_string(), Some(error.to_string())));
    }

    fn set_namespace_total(&self, count: usize) {
        self.set("namespace_total", count);
    }

    fn set_namespaces_synced(&self, count: usize) {
        self.set("namespaces_synced", count);
    }

    fn set_namespaces_not_synced(&self, count: usize) {
        self.set("namespaces_not_synced", count);
    }

    fn set_source_secrets_total(&self, count: usize) {
        self.set("source_secrets_total", count);
    }

    fn set_managed_secrets_total(&self, count: usize) {
        self.set("managed_secrets_total", count);
    }

    fn record_sync_outcome(&self, outcome: &str) {
        *self
            .outcomes
            .lock()
            .unwrap()
            .entry(outcome.to_string())
            .or_default() += 1;
    }

    fn record_sync_error(&self) {
        *self.errors.lock().unwrap() += 1;
    }
}

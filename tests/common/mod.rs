//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use composition_watcher::error::{PublishError, ResourceFetchError, WatchError};
use composition_watcher::kube::ClusterReader;
use composition_watcher::models::{ClusterObject, GroupVersionResource, ResourceReference};
use composition_watcher::publisher::TreePublisher;
use composition_watcher::watcher::{EventSource, ResourceEvent};

pub const COMPOSITION_API_VERSION: &str = "composition.krateo.io/v1-1-0";
pub const COMPOSITION_UID: &str = "7a8d5c2e-0000-4000-8000-000000000001";

/// In-memory cluster keyed by (apiVersion/resource, namespace, name).
/// Cluster-scoped objects are stored with an empty namespace.
#[derive(Default)]
pub struct InMemoryCluster {
    objects: Mutex<HashMap<(String, String, String), Value>>,
    failing: Mutex<HashSet<String>>,
    reads: Mutex<Vec<String>>,
}

fn gvr_key(gvr: &GroupVersionResource) -> String {
    format!("{}/{}", gvr.api_version(), gvr.resource)
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, api_version: &str, resource: &str, object: Value) {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let namespace = object["metadata"]["namespace"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.objects.lock().unwrap().insert(
            (format!("{}/{}", api_version, resource), namespace, name),
            object,
        );
    }

    /// Make every read of `name` fail with an API error
    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    fn get(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError> {
        self.reads
            .lock()
            .unwrap()
            .push(format!("{}:{}/{}", gvr_key(gvr), namespace, name));

        if self.failing.lock().unwrap().contains(name) {
            return Err(ResourceFetchError::Api("connection refused".to_string()));
        }

        let value = self
            .objects
            .lock()
            .unwrap()
            .get(&(gvr_key(gvr), namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or(ResourceFetchError::NotFound)?;

        ClusterObject::from_value(value).map_err(|e| ResourceFetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ClusterReader for InMemoryCluster {
    async fn get_namespaced(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError> {
        self.get(gvr, namespace, name)
    }

    async fn get_cluster_scoped(
        &self,
        gvr: &GroupVersionResource,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError> {
        self.get(gvr, "", name)
    }
}

/// Event source whose subscriptions are fed by the test
#[derive(Default)]
pub struct ChannelEventSource {
    subscribers: Mutex<Vec<(String, UnboundedSender<Result<ResourceEvent, WatchError>>)>>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriptions opened so far, as `apiVersion/resource:namespace`
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|(scope, _)| scope.clone())
            .collect()
    }

    /// End every open subscription
    pub fn close_all(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    /// Send an event to every open subscription
    pub fn emit(&self, event: Result<ResourceEvent, WatchError>) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, tx)| tx.unbounded_send(event.clone()).is_ok());
    }
}

impl EventSource for ChannelEventSource {
    fn subscribe(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
    ) -> BoxStream<'static, Result<ResourceEvent, WatchError>> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap()
            .push((format!("{}:{}", gvr_key(gvr), namespace), tx));
        rx.boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishCall {
    Upsert { uid: String, body: Value },
    Delete { uid: String },
}

/// Publisher that records every call
#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<PublishCall>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PublishCall::Upsert { body, .. } => Some(body),
                PublishCall::Delete { .. } => None,
            })
            .collect()
    }

    /// Wait until at least `count` calls were recorded
    pub async fn wait_for_calls(&self, count: usize) -> Vec<PublishCall> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let calls = self.calls();
            if calls.len() >= count {
                return calls;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} publish calls, got {:?}",
                count,
                calls
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn result(&self) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PublishError::Status {
                method: "POST",
                url: "http://tree-handler/compositions".to_string(),
                status: 503,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TreePublisher for RecordingPublisher {
    async fn upsert(&self, composition_uid: &str, tree: &[u8]) -> Result<(), PublishError> {
        self.result()?;
        let body = serde_json::from_slice(tree).unwrap_or(Value::Null);
        self.calls.lock().unwrap().push(PublishCall::Upsert {
            uid: composition_uid.to_string(),
            body,
        });
        Ok(())
    }

    async fn delete(&self, composition_uid: &str) -> Result<(), PublishError> {
        self.result()?;
        self.calls.lock().unwrap().push(PublishCall::Delete {
            uid: composition_uid.to_string(),
        });
        Ok(())
    }
}

pub fn managed(api_version: &str, resource: &str, name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": api_version,
        "resource": resource,
        "name": name,
        "namespace": namespace,
    })
}

pub fn composition_ref() -> ResourceReference {
    ResourceReference::new(COMPOSITION_API_VERSION, "fireworksapps", "demo", "demo-ns")
}

pub fn composition(managed: Vec<Value>) -> Value {
    json!({
        "apiVersion": COMPOSITION_API_VERSION,
        "kind": "FireworksApp",
        "metadata": {
            "name": "demo",
            "namespace": "demo-ns",
            "uid": COMPOSITION_UID,
            "resourceVersion": "1200",
            "creationTimestamp": "2024-05-01T10:00:00Z"
        },
        "status": {
            "conditions": [
                {"type": "Ready", "status": "True", "reason": "Available", "message": ""}
            ],
            "managed": managed
        }
    })
}

pub fn configmap(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("cm-{}", name),
            "resourceVersion": "42",
            "creationTimestamp": "2024-05-01T10:00:05Z"
        }
    })
}

pub fn deployment(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("deploy-{}", name),
            "resourceVersion": "77",
            "creationTimestamp": "2024-05-01T10:00:06Z"
        },
        "status": {
            "conditions": [
                {"type": "Progressing", "status": "True", "reason": "NewReplicaSetAvailable", "message": "progressed"},
                {"type": "Available", "status": "False", "reason": "MinimumReplicasUnavailable", "message": "0/1 ready"}
            ]
        }
    })
}

pub fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name, "uid": format!("ns-{}", name), "resourceVersion": "3"}
    })
}

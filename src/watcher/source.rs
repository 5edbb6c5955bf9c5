//! Watch subscriptions

use crate::error::WatchError;
use crate::kube::api_resource;
use crate::models::{ClusterObject, GroupVersionResource};
use futures::StreamExt;
use futures::stream::BoxStream;
use kube::core::DynamicObject;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};

use super::ResourceEvent;

/// Source of change notifications for one resource type in one namespace
pub trait EventSource: Send + Sync {
    /// Open a subscription. An empty namespace watches the type cluster-wide.
    ///
    /// The stream is lazy and never ends on its own; dropping it closes the watch.
    fn subscribe(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
    ) -> BoxStream<'static, Result<ResourceEvent, WatchError>>;
}

/// `EventSource` backed by the kube runtime watcher
#[derive(Clone)]
pub struct KubeEventSource {
    client: Client,
}

impl KubeEventSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn decode(obj: DynamicObject) -> Result<ClusterObject, WatchError> {
    serde_json::to_value(&obj)
        .and_then(ClusterObject::from_value)
        .map_err(|e| WatchError::Stream(format!("undecodable object: {}", e)))
}

impl EventSource for KubeEventSource {
    fn subscribe(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
    ) -> BoxStream<'static, Result<ResourceEvent, WatchError>> {
        let resource = api_resource(gvr);
        let api: Api<DynamicObject> = if namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        };

        // In kube 2.0 the initial listing arrives as InitApply events
        watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(watcher::Event::InitApply(obj)) | Ok(watcher::Event::Apply(obj)) => {
                        Some(decode(obj).map(ResourceEvent::Updated))
                    }
                    Ok(watcher::Event::Delete(obj)) => {
                        Some(decode(obj).map(ResourceEvent::Deleted))
                    }
                    // Lifecycle markers, nothing to dispatch
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(WatchError::Stream(e.to_string()))),
                }
            })
            .boxed()
    }
}

//! Resource resolution
//!
//! `ClusterReader` is the raw read seam against the API server; `ResourceResolver`
//! adds the lookup policy: try the reference's namespace first, and fall back to a
//! cluster-scoped read when the namespaced read reports not-found.

use super::{api_resource, is_not_found};
use crate::error::ResourceFetchError;
use crate::models::{ClusterObject, GroupVersionResource};
use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::{Api, Client};
use std::sync::Arc;

/// Single-object reads from the cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get_namespaced(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError>;

    async fn get_cluster_scoped(
        &self,
        gvr: &GroupVersionResource,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError>;
}

/// `ClusterReader` backed by the dynamic kube API
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn fetch_error(err: kube::Error) -> ResourceFetchError {
    if is_not_found(&err) {
        ResourceFetchError::NotFound
    } else {
        ResourceFetchError::Api(err.to_string())
    }
}

fn decode(obj: DynamicObject) -> Result<ClusterObject, ResourceFetchError> {
    let value =
        serde_json::to_value(&obj).map_err(|e| ResourceFetchError::Decode(e.to_string()))?;
    ClusterObject::from_value(value).map_err(|e| ResourceFetchError::Decode(e.to_string()))
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn get_namespaced(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &api_resource(gvr));
        let obj = api.get(name).await.map_err(fetch_error)?;
        decode(obj)
    }

    async fn get_cluster_scoped(
        &self,
        gvr: &GroupVersionResource,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &api_resource(gvr));
        let obj = api.get(name).await.map_err(fetch_error)?;
        decode(obj)
    }
}

/// Resolves references to live objects with namespace-to-cluster fallback
#[derive(Clone)]
pub struct ResourceResolver {
    reader: Arc<dyn ClusterReader>,
}

impl ResourceResolver {
    pub fn new(reader: Arc<dyn ClusterReader>) -> Self {
        Self { reader }
    }

    pub async fn resolve(
        &self,
        gvr: &GroupVersionResource,
        namespace: &str,
        name: &str,
    ) -> Result<ClusterObject, ResourceFetchError> {
        if namespace.is_empty() {
            return self.reader.get_cluster_scoped(gvr, name).await;
        }

        match self.reader.get_namespaced(gvr, namespace, name).await {
            Ok(obj) => Ok(obj),
            Err(ResourceFetchError::NotFound) => {
                tracing::debug!(
                    "{} {}/{} not found, trying cluster-scoped",
                    gvr,
                    namespace,
                    name
                );
                self.reader.get_cluster_scoped(gvr, name).await
            }
            Err(e) => Err(e),
        }
    }
}

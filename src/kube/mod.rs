//! Kubernetes client module
//!
//! Handles connection to the Kubernetes API server and single-object reads
//! for arbitrary resource types.

pub mod resolver;

pub use resolver::{ClusterReader, KubeClusterReader, ResourceResolver};

use anyhow::{Context, Result};
use kube::core::ApiResource;
use kube::{Client, Config};

use crate::models::GroupVersionResource;

/// Initialize and return a Kubernetes client
///
/// Uses the default config loading strategy:
/// 1. In-cluster config (if running in a pod)
/// 2. KUBECONFIG environment variable
/// 3. ~/.kube/config
pub async fn create_client() -> Result<Client> {
    let config = Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;

    tracing::debug!("Connecting to Kubernetes API at {}", config.cluster_url);

    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
    Ok(client)
}

/// Build the dynamic ApiResource for a group/version/plural
///
/// Only group, version and plural take part in request URLs, so the kind is
/// left empty for references that never carried one.
pub fn api_resource(gvr: &GroupVersionResource) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        kind: String::new(),
        plural: gvr.resource.clone(),
    }
}

/// Whether a kube error is an API 404 for the object (or its scope)
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

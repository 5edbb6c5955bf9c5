//! Status tree builder
//!
//! A build pass:
//! 1. skips managed references matched by an exclusion rule (before any fetch),
//! 2. resolves the rest, namespace first and cluster-scoped on not-found,
//! 3. records a spec/status pair per resolved resource, parented to the composition,
//! 4. links every non-root status entry back to the composition's own entry.
//!
//! A resource that cannot be fetched is left out and reported; it never fails
//! the pass. Each pass owns its tree, so concurrent builds never interleave.

use crate::error::{SkippedResource, TreeError};
use crate::kube::ResourceResolver;
use crate::models::{
    ClusterObject, ExclusionFilter, ExclusionRule, ResourceNode, ResourceNodeStatus,
    ResourceReference, ResourceTree,
};
use chrono::Utc;

/// Outcome of a successful build pass
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub tree: ResourceTree,
    /// Managed resources that could not be resolved, in declaration order
    pub skipped: Vec<SkippedResource>,
    /// Number of managed references dropped by exclusion rules
    pub excluded: usize,
}

impl BuildReport {
    pub fn to_json(&self) -> Result<Vec<u8>, TreeError> {
        self.tree
            .to_json()
            .map_err(|e| TreeError::Serialize(e.to_string()))
    }
}

#[derive(Clone)]
pub struct StatusTreeBuilder {
    resolver: ResourceResolver,
}

impl StatusTreeBuilder {
    pub fn new(resolver: ResourceResolver) -> Self {
        Self { resolver }
    }

    /// Build the tree for a composition from its declared `status.managed` list
    pub async fn build(
        &self,
        composition_ref: &ResourceReference,
        composition: &ClusterObject,
        exclusions: &[ExclusionRule],
    ) -> Result<BuildReport, TreeError> {
        let managed = composition.managed_resources()?;
        self.build_from(composition_ref, composition, &managed, exclusions)
            .await
    }

    /// Build the tree for an explicit list of managed references
    pub async fn build_from(
        &self,
        composition_ref: &ResourceReference,
        composition: &ClusterObject,
        managed: &[ResourceReference],
        exclusions: &[ExclusionRule],
    ) -> Result<BuildReport, TreeError> {
        let filter = ExclusionFilter::from(exclusions);
        let created = composition
            .metadata
            .creation_timestamp
            .unwrap_or_else(Utc::now);

        let mut tree = ResourceTree::new(composition.uid(), created);
        tree.push(
            ResourceNode::from_reference(composition_ref, Vec::new()),
            status_entry(composition, composition_ref),
        );

        let mut skipped = Vec::new();
        let mut excluded = 0;

        for reference in managed {
            if filter.excludes(reference) {
                tracing::debug!("Excluding managed resource {}", reference);
                excluded += 1;
                continue;
            }

            let gvr = reference.group_version_resource()?;

            match self
                .resolver
                .resolve(&gvr, &reference.namespace, &reference.name)
                .await
            {
                Ok(obj) => {
                    tree.push(
                        ResourceNode::from_reference(reference, vec![composition_ref.clone()]),
                        status_entry(&obj, reference),
                    );
                }
                Err(error) => {
                    tracing::warn!("error fetching resource status for {}: {}", reference, error);
                    skipped.push(SkippedResource {
                        reference: reference.clone(),
                        error,
                    });
                }
            }
        }

        link_to_root(&mut tree, composition);

        tracing::debug!(
            "Built tree for composition {}: {} entries, {} excluded, {} skipped",
            composition.uid(),
            tree.len(),
            excluded,
            skipped.len()
        );

        Ok(BuildReport {
            tree,
            skipped,
            excluded,
        })
    }

    /// Build and serialize in one step
    pub async fn build_json(
        &self,
        composition_ref: &ResourceReference,
        composition: &ClusterObject,
        exclusions: &[ExclusionRule],
    ) -> Result<(Vec<u8>, BuildReport), TreeError> {
        let report = self.build(composition_ref, composition, exclusions).await?;
        let json = report.to_json()?;
        tracing::debug!("webservice payload: {}", String::from_utf8_lossy(&json));
        Ok((json, report))
    }
}

fn status_entry(obj: &ClusterObject, reference: &ResourceReference) -> ResourceNodeStatus {
    let kind = if obj.kind.is_empty() {
        reference.resource.clone()
    } else {
        obj.kind.clone()
    };
    let version = if obj.api_version.is_empty() {
        reference.api_version.clone()
    } else {
        obj.api_version.clone()
    };

    ResourceNodeStatus {
        kind,
        version,
        name: obj.metadata.name.clone(),
        namespace: obj.metadata.namespace.clone(),
        uid: obj.metadata.uid.clone(),
        resource_version: obj.metadata.resource_version.clone(),
        created_at: obj.metadata.creation_timestamp,
        health: obj.health.clone(),
        parent_refs: Vec::new(),
    }
}

/// Attach the composition's own status entry as a parent of every other entry.
///
/// The root is found by kind and apiVersion, narrowed by name and namespace.
/// If it cannot be found no entry is linked.
fn link_to_root(tree: &mut ResourceTree, composition: &ClusterObject) {
    let root = tree.status.iter().position(|entry| {
        (composition.kind.is_empty() || entry.is_kind(&composition.kind, &composition.api_version))
            && entry.name == composition.metadata.name
            && entry.namespace == composition.metadata.namespace
    });

    let Some(root) = root else {
        tracing::warn!(
            "composition {} not found in its own status list, skipping back-references",
            composition.uid()
        );
        return;
    };

    for (idx, entry) in tree.status.iter_mut().enumerate() {
        if idx != root && !entry.parent_refs.contains(&root) {
            entry.parent_refs.push(root);
        }
    }
}

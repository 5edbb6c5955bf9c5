//! The CompositionReference custom resource
//!
//! Each CompositionReference points at one composition and carries the
//! exclusion filters applied when its tree is built.

use super::exclusion::ExclusionRule;
use super::reference::ResourceReference;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "resourcetrees.krateo.io";
pub const VERSION: &str = "v1";
pub const KIND: &str = "CompositionReference";
pub const PLURAL: &str = "compositionreferences";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub exclude: Vec<ExclusionRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionReferenceSpec {
    #[serde(default)]
    pub filters: Filters,
    pub reference: ResourceReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionReferenceMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// A CompositionReference object as read from the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionReference {
    pub metadata: CompositionReferenceMeta,
    pub spec: CompositionReferenceSpec,
}

impl CompositionReference {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        reference: ResourceReference,
        exclude: Vec<ExclusionRule>,
    ) -> Self {
        Self {
            metadata: CompositionReferenceMeta {
                name: name.into(),
                namespace: namespace.into(),
            },
            spec: CompositionReferenceSpec {
                filters: Filters { exclude },
                reference,
            },
        }
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Key used to track this object across reconcile passes
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }

    pub fn reference(&self) -> &ResourceReference {
        &self.spec.reference
    }

    pub fn exclusions(&self) -> &[ExclusionRule] {
        &self.spec.filters.exclude
    }
}

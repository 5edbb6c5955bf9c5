//! Resource tree published to the status service
//!
//! The tree holds two parallel lists: `tree` (spec side, what the composition
//! declares) and `status` (live state of each resource). Status entries refer
//! to their parents by index into the status list; the serializer expands those
//! links into embedded entries on the wire.

use super::object::Health;
use super::reference::ResourceReference;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};

/// Spec-side tree entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    pub api_version: String,
    pub resource: String,
    pub name: String,
    pub namespace: String,
    pub parent_refs: Vec<ResourceReference>,
}

impl ResourceNode {
    pub fn from_reference(reference: &ResourceReference, parent_refs: Vec<ResourceReference>) -> Self {
        Self {
            api_version: reference.api_version.clone(),
            resource: reference.resource.clone(),
            name: reference.name.clone(),
            namespace: reference.namespace.clone(),
            parent_refs,
        }
    }
}

/// Status-side tree entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNodeStatus {
    pub kind: String,
    pub version: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    pub created_at: Option<DateTime<Utc>>,
    pub health: Health,
    /// Indices of parent entries in the owning tree's status list
    pub parent_refs: Vec<usize>,
}

impl ResourceNodeStatus {
    /// Whether this entry describes the given kind and apiVersion
    pub fn is_kind(&self, kind: &str, api_version: &str) -> bool {
        self.kind == kind && self.version == api_version
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTree {
    pub composition_id: String,
    pub creation_timestamp: DateTime<Utc>,
    pub tree: Vec<ResourceNode>,
    pub status: Vec<ResourceNodeStatus>,
}

impl ResourceTree {
    pub fn new(composition_id: impl Into<String>, creation_timestamp: DateTime<Utc>) -> Self {
        Self {
            composition_id: composition_id.into(),
            creation_timestamp,
            tree: Vec::new(),
            status: Vec::new(),
        }
    }

    /// Append a spec/status pair, keeping both lists the same length
    pub fn push(&mut self, node: ResourceNode, status: ResourceNodeStatus) -> usize {
        self.tree.push(node);
        self.status.push(status);
        self.status.len() - 1
    }

    pub fn len(&self) -> usize {
        self.status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
    }

    /// Parent entries of the status entry at `index`
    pub fn parents_of(&self, index: usize) -> Vec<&ResourceNodeStatus> {
        self.status
            .get(index)
            .map(|entry| {
                entry
                    .parent_refs
                    .iter()
                    .filter_map(|&p| self.status.get(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Serialize for ResourceTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResourceTree", 4)?;
        state.serialize_field("compositionId", &self.composition_id)?;
        state.serialize_field("creationTimestamp", &rfc3339(&self.creation_timestamp))?;
        state.serialize_field("spec", &SpecView { tree: &self.tree })?;
        state.serialize_field(
            "status",
            &StatusList {
                tree: self,
                indices: (0..self.status.len()).collect(),
                depth: 0,
            },
        )?;
        state.end()
    }
}

#[derive(Serialize)]
struct SpecView<'a> {
    tree: &'a [ResourceNode],
}

/// Parent links only ever point at the root, but the depth cap keeps a
/// hand-built cyclic tree from recursing forever.
const MAX_PARENT_DEPTH: usize = 8;

struct StatusList<'a> {
    tree: &'a ResourceTree,
    indices: Vec<usize>,
    depth: usize,
}

impl Serialize for StatusList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<usize> = if self.depth > MAX_PARENT_DEPTH {
            Vec::new()
        } else {
            self.indices
                .iter()
                .copied()
                .filter(|&i| i < self.tree.status.len())
                .collect()
        };

        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for index in entries {
            seq.serialize_element(&StatusView {
                tree: self.tree,
                index,
                depth: self.depth,
            })?;
        }
        seq.end()
    }
}

struct StatusView<'a> {
    tree: &'a ResourceTree,
    index: usize,
    depth: usize,
}

impl Serialize for StatusView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entry = &self.tree.status[self.index];
        let mut state = serializer.serialize_struct("ResourceNodeStatus", 9)?;
        state.serialize_field("kind", &entry.kind)?;
        state.serialize_field("version", &entry.version)?;
        state.serialize_field("name", &entry.name)?;
        state.serialize_field("namespace", &entry.namespace)?;
        state.serialize_field("uid", &entry.uid)?;
        state.serialize_field("resourceVersion", &entry.resource_version)?;
        state.serialize_field("createdAt", &entry.created_at.as_ref().map(rfc3339))?;
        state.serialize_field("health", &entry.health)?;
        state.serialize_field(
            "parentRefs",
            &StatusList {
                tree: self.tree,
                indices: entry.parent_refs.clone(),
                depth: self.depth + 1,
            },
        )?;
        state.end()
    }
}

//! Domain model
//!
//! - `reference` - resource references and apiVersion parsing
//! - `exclusion` - exclusion rules applied to managed resources
//! - `object` - typed decoding of cluster objects
//! - `tree` - the resource tree and its wire format
//! - `composition_reference` - the CompositionReference custom resource

pub mod composition_reference;
pub mod exclusion;
pub mod object;
pub mod reference;
pub mod tree;

pub use composition_reference::{CompositionReference, CompositionReferenceSpec, Filters};
pub use exclusion::{ExclusionFilter, ExclusionRule};
pub use object::{ClusterObject, Health, ObjectMetadata};
pub use reference::{GroupVersion, GroupVersionResource, ReferenceParseError, ResourceReference};
pub use tree::{ResourceNode, ResourceNodeStatus, ResourceTree};

//! Watcher module
//!
//! One long-lived watch per tracked composition UID. Each watch is a task
//! reading an [`EventSource`] subscription and dispatching update and delete
//! events to the tree builder and publisher.

mod registry;
mod source;

pub use registry::WatchRegistry;
pub use source::{EventSource, KubeEventSource};

use crate::models::ClusterObject;

/// Change notification for a watched object
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// Object was added or updated
    Updated(ClusterObject),
    /// Object was deleted
    Deleted(ClusterObject),
}

impl ResourceEvent {
    pub fn object(&self) -> &ClusterObject {
        match self {
            ResourceEvent::Updated(obj) | ResourceEvent::Deleted(obj) => obj,
        }
    }
}

//! Composition watcher library
//!
//! Builds a resource tree for each composition (the composition plus the
//! resources it manages, with their health) and keeps an external resource tree
//! service up to date as those resources change.

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod kube;
pub mod models;
pub mod publisher;
pub mod throttle;
pub mod tree;
pub mod watcher;

// Re-export commonly used types for convenience
pub use controller::{CompositionReferenceEvent, Observation, Reconciler};
pub use error::{PublishError, ReconcileError, ResourceFetchError, TreeError, WatchError};
pub use publisher::{HttpPublisher, TreePublisher};
pub use throttle::ReconcileThrottle;
pub use tree::{BuildReport, StatusTreeBuilder};
pub use watcher::{EventSource, KubeEventSource, ResourceEvent, WatchRegistry};

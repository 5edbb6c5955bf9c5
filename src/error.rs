//! Error taxonomy
//!
//! Build-level and publish-level errors propagate to the caller, which retries on
//! its next poll. Per-resource fetch errors never fail a build; they are recorded
//! in the build report instead.

pub use crate::models::ReferenceParseError;
use crate::models::ResourceReference;

/// Errors that fail a whole tree-build pass
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("malformed composition: {0}")]
    MalformedComposition(String),

    #[error(transparent)]
    ReferenceParse(#[from] ReferenceParseError),

    #[error("failed to serialize resource tree: {0}")]
    Serialize(String),
}

/// Failure to resolve a single resource
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceFetchError {
    #[error("resource not found")]
    NotFound,

    #[error("API request failed: {0}")]
    Api(String),

    #[error("failed to decode resource: {0}")]
    Decode(String),
}

/// A managed resource left out of a tree, with the reason
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("skipped {reference}: {error}")]
pub struct SkippedResource {
    pub reference: ResourceReference,
    pub error: ResourceFetchError,
}

/// Failure talking to the resource tree service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("no target webservice configured")]
    NotConfigured,

    #[error("invalid webservice URL: {0}")]
    InvalidUrl(String),

    #[error("could not send http {method} to {url}: {message}")]
    Transport {
        method: &'static str,
        url: String,
        message: String,
    },

    #[error("received error from webservice on {method} {url}: {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },
}

/// Errors raised while starting or running a watch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    ReferenceParse(#[from] ReferenceParseError),

    #[error("watch stream error: {0}")]
    Stream(String),
}

/// Everything a reconcile pass can fail with
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("unable to retrieve composition {reference}: {error}")]
    Composition {
        reference: ResourceReference,
        error: ResourceFetchError,
    },
}

impl ReconcileError {
    /// Whether the next poll can succeed without the declared resources changing.
    ///
    /// Non-retryable errors are still re-observed every poll; they just will not
    /// clear until someone fixes the composition or its reference.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Publish(_) => true,
            ReconcileError::Composition { .. } => true,
            ReconcileError::Watch(WatchError::Stream(_)) => true,
            ReconcileError::Watch(WatchError::ReferenceParse(_)) => false,
            ReconcileError::Tree(TreeError::Serialize(_)) => true,
            ReconcileError::Tree(_) => false,
        }
    }
}

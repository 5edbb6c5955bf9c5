//! Registry of active composition watches
//!
//! Each tracked UID owns one task reading its subscription until the watch is
//! stopped, the composition is deleted or the registry shuts down. The map lock
//! only guards bookkeeping; builds and publishes run with it released.
//!
//! A task shares its CompositionReference spec with the registry, so
//! [`WatchRegistry::update_spec`] changes the exclusions of every later rebuild.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{EventSource, ResourceEvent};
use crate::error::WatchError;
use crate::models::{ClusterObject, CompositionReferenceSpec};
use crate::publisher::TreePublisher;
use crate::tree::StatusTreeBuilder;

type SharedSpec = Arc<RwLock<CompositionReferenceSpec>>;

struct WatchEntry {
    generation: u64,
    spec: SharedSpec,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

type WatchMap = Arc<Mutex<HashMap<String, WatchEntry>>>;

fn lock(watches: &WatchMap) -> MutexGuard<'_, HashMap<String, WatchEntry>> {
    watches
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remove `uid` only if it is still the entry started as `generation`
fn release(watches: &WatchMap, uid: &str, generation: u64) -> bool {
    let mut map = lock(watches);
    if map.get(uid).is_some_and(|entry| entry.generation == generation) {
        map.remove(uid);
        true
    } else {
        false
    }
}

/// Tracks one watch per composition UID
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct WatchRegistry {
    watches: WatchMap,
    next_generation: Arc<AtomicU64>,
    source: Arc<dyn EventSource>,
    builder: StatusTreeBuilder,
    publisher: Arc<dyn TreePublisher>,
}

impl WatchRegistry {
    pub fn new(
        source: Arc<dyn EventSource>,
        builder: StatusTreeBuilder,
        publisher: Arc<dyn TreePublisher>,
    ) -> Self {
        Self {
            watches: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            source,
            builder,
            publisher,
        }
    }

    pub fn exists(&self, uid: &str) -> bool {
        lock(&self.watches).contains_key(uid)
    }

    pub fn len(&self) -> usize {
        lock(&self.watches).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// UIDs currently watched, sorted
    pub fn uids(&self) -> Vec<String> {
        let mut uids: Vec<String> = lock(&self.watches).keys().cloned().collect();
        uids.sort();
        uids
    }

    /// Start watching the composition `spec` points at.
    ///
    /// Returns `Ok(false)` without side effects when `uid` is already watched.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, spec: &CompositionReferenceSpec, uid: &str) -> Result<bool, WatchError> {
        let gvr = spec.reference.group_version_resource()?;

        let mut map = lock(&self.watches);
        if map.contains_key(uid) {
            tracing::debug!("Watch for composition {} already active", uid);
            return Ok(false);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let shared_spec: SharedSpec = Arc::new(RwLock::new(spec.clone()));
        let task = WatchTask {
            uid: uid.to_string(),
            generation,
            spec: shared_spec.clone(),
            watches: self.watches.clone(),
            builder: self.builder.clone(),
            publisher: self.publisher.clone(),
            cancel: cancel.clone(),
        };
        let events = self.source.subscribe(&gvr, &spec.reference.namespace);
        let handle = tokio::spawn(task.run(events));

        map.insert(
            uid.to_string(),
            WatchEntry {
                generation,
                spec: shared_spec,
                cancel,
                handle,
            },
        );

        tracing::info!(
            "Started watch for composition {} ({} {}/{})",
            uid,
            gvr,
            spec.reference.namespace,
            spec.reference.name
        );
        Ok(true)
    }

    /// Replace the spec the watch for `uid` builds with.
    ///
    /// Returns false when `uid` is not watched. The subscription keeps the scope
    /// it was started with.
    pub fn update_spec(&self, uid: &str, spec: &CompositionReferenceSpec) -> bool {
        let map = lock(&self.watches);
        let Some(entry) = map.get(uid) else {
            return false;
        };

        let mut current = entry
            .spec
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current != *spec {
            tracing::debug!("Refreshed filters of watch for composition {}", uid);
            *current = spec.clone();
        }
        true
    }

    /// Stop the watch for `uid` and wait for its task to finish.
    ///
    /// Returns false when `uid` was not watched.
    pub async fn stop(&self, uid: &str) -> bool {
        let entry = lock(&self.watches).remove(uid);
        let Some(entry) = entry else {
            return false;
        };

        entry.cancel.cancel();
        if let Err(e) = entry.handle.await {
            tracing::warn!("Watch task for composition {} ended abnormally: {}", uid, e);
        }
        tracing::info!("Stopped watch for composition {}", uid);
        true
    }

    /// Stop every watch and wait for all tasks to finish
    pub async fn shutdown(&self) {
        let entries: Vec<(String, WatchEntry)> = lock(&self.watches).drain().collect();

        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (uid, entry) in entries {
            if let Err(e) = entry.handle.await {
                tracing::warn!("Watch task for composition {} ended abnormally: {}", uid, e);
            }
        }
    }
}

struct WatchTask {
    uid: String,
    generation: u64,
    spec: SharedSpec,
    watches: WatchMap,
    builder: StatusTreeBuilder,
    publisher: Arc<dyn TreePublisher>,
    cancel: CancellationToken,
}

impl WatchTask {
    async fn run(
        self,
        mut events: futures::stream::BoxStream<'static, Result<ResourceEvent, WatchError>>,
    ) {
        let mut error_count = 0u32;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = events.next() => event,
            };

            match event {
                Some(Ok(ResourceEvent::Updated(obj))) => {
                    error_count = 0;
                    if obj.uid() == self.uid {
                        self.on_update(&obj).await;
                    }
                }
                Some(Ok(ResourceEvent::Deleted(obj))) => {
                    error_count = 0;
                    if obj.uid() == self.uid {
                        self.on_delete().await;
                        break;
                    }
                }
                Some(Err(e)) => {
                    error_count += 1;
                    // The source backs off on its own; only log occasionally
                    if error_count == 1 || error_count.is_multiple_of(10) {
                        tracing::warn!(
                            "Watch for composition {} error ({}): {}",
                            self.uid,
                            error_count,
                            e
                        );
                    }
                }
                None => {
                    tracing::info!("Watch stream for composition {} closed", self.uid);
                    release(&self.watches, &self.uid, self.generation);
                    break;
                }
            }
        }
    }

    fn current_spec(&self) -> CompositionReferenceSpec {
        self.spec
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn on_update(&self, composition: &ClusterObject) {
        let spec = self.current_spec();
        let built = self
            .builder
            .build_json(&spec.reference, composition, &spec.filters.exclude)
            .await;

        let json = match built {
            Ok((json, _)) => json,
            Err(e) => {
                tracing::warn!("error building tree for composition {}: {}", self.uid, e);
                return;
            }
        };

        if let Err(e) = self.publisher.upsert(&self.uid, &json).await {
            tracing::warn!("error publishing tree for composition {}: {}", self.uid, e);
        }
    }

    async fn on_delete(&self) {
        if !release(&self.watches, &self.uid, self.generation) {
            // Stopped concurrently; whoever stopped it owns the cleanup
            return;
        }
        tracing::info!("Composition {} deleted, dropping its tree", self.uid);

        if let Err(e) = self.publisher.delete(&self.uid).await {
            tracing::warn!("error deleting tree for composition {}: {}", self.uid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::ResourceResolver;
    use crate::kube::resolver::MockClusterReader;
    use crate::models::{GroupVersionResource, ResourceReference};
    use crate::publisher::MockTreePublisher;
    use futures::stream::{self, BoxStream};

    /// Subscriptions that never yield
    struct PendingSource;

    impl EventSource for PendingSource {
        fn subscribe(
            &self,
            _gvr: &GroupVersionResource,
            _namespace: &str,
        ) -> BoxStream<'static, Result<ResourceEvent, WatchError>> {
            stream::pending().boxed()
        }
    }

    fn registry() -> WatchRegistry {
        let resolver = ResourceResolver::new(Arc::new(MockClusterReader::new()));
        WatchRegistry::new(
            Arc::new(PendingSource),
            StatusTreeBuilder::new(resolver),
            Arc::new(MockTreePublisher::new()),
        )
    }

    fn spec(api_version: &str) -> CompositionReferenceSpec {
        CompositionReferenceSpec {
            filters: Default::default(),
            reference: ResourceReference::new(api_version, "fireworksapps", "demo", "demo-ns"),
        }
    }

    #[tokio::test]
    async fn test_start_twice_keeps_one_entry() {
        let registry = registry();
        let spec = spec("composition.krateo.io/v1-1-0");

        assert!(registry.start(&spec, "uid-1").unwrap());
        assert!(!registry.start(&spec, "uid-1").unwrap());
        assert_eq!(registry.len(), 1);
        assert!(registry.exists("uid-1"));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_absent_uid() {
        let registry = registry();
        assert!(!registry.stop("missing").await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_then_restart() {
        let registry = registry();
        let spec = spec("composition.krateo.io/v1-1-0");

        registry.start(&spec, "uid-1").unwrap();
        assert!(registry.stop("uid-1").await);
        assert!(!registry.exists("uid-1"));

        assert!(registry.start(&spec, "uid-1").unwrap());
        assert!(registry.exists("uid-1"));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_bad_api_version() {
        let registry = registry();
        let result = registry.start(&spec("a/b/c"), "uid-1");

        assert!(matches!(result, Err(WatchError::ReferenceParse(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_update_spec_only_for_watched_uids() {
        let registry = registry();
        let spec = spec("composition.krateo.io/v1-1-0");
        assert!(!registry.update_spec("uid-1", &spec));

        registry.start(&spec, "uid-1").unwrap();
        assert!(registry.update_spec("uid-1", &spec));
        assert!(!registry.update_spec("uid-2", &spec));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_clears_everything() {
        let registry = registry();
        let spec = spec("composition.krateo.io/v1-1-0");
        registry.start(&spec, "uid-1").unwrap();
        registry.start(&spec, "uid-2").unwrap();
        assert_eq!(registry.uids(), vec!["uid-1", "uid-2"]);

        registry.shutdown().await;
        assert!(registry.is_empty());
    }
}

//! Reconciliation driver
//!
//! Each CompositionReference is reconciled in three steps: observe the
//! composition it points at, make sure a watch exists for it, and republish its
//! tree when the last publish is older than the poll interval. Deleting the
//! CompositionReference drops the tree and the watch.
//!
//! Failures are returned as [`ReconcileError`]; [`Reconciler::run`] logs them
//! and tries again on the next poll tick. A tree whose DELETE failed stays
//! pending until a later tick gets it through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::BoxStream;
use kube::core::DynamicObject;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{ReconcileError, ResourceFetchError, TreeError, WatchError};
use crate::kube::{ResourceResolver, api_resource};
use crate::models::composition_reference::{GROUP, PLURAL, VERSION};
use crate::models::{ClusterObject, CompositionReference, GroupVersionResource};
use crate::publisher::TreePublisher;
use crate::throttle::ReconcileThrottle;
use crate::tree::StatusTreeBuilder;
use crate::watcher::WatchRegistry;

/// Change notification for a CompositionReference
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionReferenceEvent {
    Applied(CompositionReference),
    Deleted(CompositionReference),
}

/// State of one CompositionReference as seen by [`Reconciler::observe`]
#[derive(Debug, Clone)]
pub struct Observation {
    pub composition: ClusterObject,
    /// A watch is running for the composition's UID
    pub exists: bool,
    /// The last publish is recent enough to skip a rebuild
    pub up_to_date: bool,
}

impl Observation {
    pub fn uid(&self) -> &str {
        self.composition.uid()
    }
}

pub struct Reconciler {
    resolver: ResourceResolver,
    builder: StatusTreeBuilder,
    publisher: Arc<dyn TreePublisher>,
    registry: WatchRegistry,
    throttle: ReconcileThrottle,
    /// CompositionReference key -> composition UID whose tree still has to go
    pending_deletes: Mutex<HashMap<String, String>>,
    poll_interval: Duration,
}

impl Reconciler {
    pub fn new(
        resolver: ResourceResolver,
        builder: StatusTreeBuilder,
        publisher: Arc<dyn TreePublisher>,
        registry: WatchRegistry,
        poll_interval: Duration,
    ) -> Self {
        Self {
            resolver,
            builder,
            publisher,
            registry,
            throttle: ReconcileThrottle::new(),
            pending_deletes: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.pending_deletes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the tree for `key` failed to delete and will be retried
    pub fn has_pending_delete(&self, key: &str) -> bool {
        self.pending().contains_key(key)
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn throttle(&self) -> &ReconcileThrottle {
        &self.throttle
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch_composition(
        &self,
        cr: &CompositionReference,
    ) -> Result<ClusterObject, ReconcileError> {
        let reference = cr.reference();
        let gvr = reference.group_version_resource().map_err(TreeError::from)?;

        self.resolver
            .resolve(&gvr, &reference.namespace, &reference.name)
            .await
            .map_err(|error| ReconcileError::Composition {
                reference: reference.clone(),
                error,
            })
    }

    pub async fn observe(&self, cr: &CompositionReference) -> Result<Observation, ReconcileError> {
        let composition = self.fetch_composition(cr).await?;
        let exists = self.registry.exists(composition.uid());
        let up_to_date = self.throttle.is_fresh(&cr.key(), self.poll_interval);

        tracing::debug!(
            "Observed {}: composition {} watched={} up_to_date={}",
            cr.key(),
            composition.uid(),
            exists,
            up_to_date
        );

        Ok(Observation {
            composition,
            exists,
            up_to_date,
        })
    }

    /// Start the watch for the composition's UID
    pub async fn create(&self, cr: &CompositionReference) -> Result<(), ReconcileError> {
        let composition = self.fetch_composition(cr).await?;
        self.start_watch(cr, &composition)
    }

    fn start_watch(
        &self,
        cr: &CompositionReference,
        composition: &ClusterObject,
    ) -> Result<(), ReconcileError> {
        self.registry.start(&cr.spec, composition.uid())?;
        Ok(())
    }

    /// Rebuild and publish the tree with the exclusions currently on `cr`
    pub async fn update(&self, cr: &CompositionReference) -> Result<(), ReconcileError> {
        let composition = self.fetch_composition(cr).await?;
        self.registry.update_spec(composition.uid(), &cr.spec);
        self.publish(cr, &composition).await
    }

    async fn publish(
        &self,
        cr: &CompositionReference,
        composition: &ClusterObject,
    ) -> Result<(), ReconcileError> {
        let (json, report) = self
            .builder
            .build_json(cr.reference(), composition, cr.exclusions())
            .await?;

        self.publisher.upsert(composition.uid(), &json).await?;
        self.throttle.mark_fresh(&cr.key(), Instant::now());

        tracing::info!(
            "Published tree for composition {} ({} entries, {} skipped)",
            composition.uid(),
            report.tree.len(),
            report.skipped.len()
        );
        Ok(())
    }

    /// Stop the watch of the composition `cr` points at, then drop its tree.
    ///
    /// A composition that is already gone only clears the throttle; its watch
    /// handled the delete when the composition went away. When the DELETE
    /// fails the UID is kept and [`Reconciler::retry_deletes`] sends it again.
    pub async fn delete(&self, cr: &CompositionReference) -> Result<(), ReconcileError> {
        let key = cr.key();
        let pending_uid = self.pending().get(&key).cloned();
        let uid = match pending_uid {
            Some(uid) => uid,
            None => match self.fetch_composition(cr).await {
                Ok(composition) => composition.uid().to_string(),
                Err(ReconcileError::Composition {
                    error: ResourceFetchError::NotFound,
                    ..
                }) => {
                    tracing::debug!("Composition for {} already gone", key);
                    self.throttle.forget(&key);
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
        };

        // Stopping first waits out any in-flight upsert from the watch
        if !self.registry.stop(&uid).await {
            tracing::debug!("No watch to stop for composition {}", uid);
        }
        self.throttle.forget(&key);

        let result = self.publisher.delete(&uid).await;
        if let Err(e) = result {
            self.pending().insert(key, uid);
            return Err(e.into());
        }
        self.pending().remove(&key);

        tracing::info!("Deleted tree for composition {}", uid);
        Ok(())
    }

    /// Send the DELETE again for every tree whose delete failed
    pub async fn retry_deletes(&self) {
        let pending: Vec<(String, String)> = self
            .pending()
            .iter()
            .map(|(key, uid)| (key.clone(), uid.clone()))
            .collect();

        for (key, uid) in pending {
            match self.publisher.delete(&uid).await {
                Ok(()) => {
                    self.pending().remove(&key);
                    tracing::info!("Deleted tree for composition {} on retry", uid);
                }
                Err(e) => tracing::warn!(
                    "Delete of tree for {} failed, retrying next poll: {}",
                    key,
                    e
                ),
            }
        }
    }

    /// Observe, start the watch if missing, and republish if stale.
    ///
    /// A freshly started watch is always followed by a publish. A running
    /// watch picks up the current exclusions of `cr`.
    pub async fn reconcile(&self, cr: &CompositionReference) -> Result<(), ReconcileError> {
        let observation = self.observe(cr).await?;

        if !observation.exists {
            self.start_watch(cr, &observation.composition)?;
            return self.publish(cr, &observation.composition).await;
        }
        self.registry.update_spec(observation.uid(), &cr.spec);
        if !observation.up_to_date {
            self.publish(cr, &observation.composition).await?;
        }
        Ok(())
    }

    async fn reconcile_logged(&self, cr: &CompositionReference) {
        if let Err(e) = self.reconcile(cr).await {
            if e.is_retryable() {
                tracing::warn!("Reconcile of {} failed, retrying next poll: {}", cr.key(), e);
            } else {
                tracing::warn!("Reconcile of {} failed: {}", cr.key(), e);
            }
        }
    }

    /// Drive reconciliation until `shutdown` is cancelled.
    ///
    /// Applied events reconcile right away, deletes run [`Reconciler::delete`],
    /// and every poll tick retries failed deletes and re-reconciles everything
    /// seen so far. All watches are stopped before returning.
    pub async fn run(
        &self,
        mut events: BoxStream<'static, Result<CompositionReferenceEvent, WatchError>>,
        shutdown: CancellationToken,
    ) {
        let mut known: HashMap<String, CompositionReference> = HashMap::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;
        let mut error_count = 0u32;

        tracing::info!(
            "Reconciler running (poll interval {:?})",
            self.poll_interval
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.next(), if events_open => match event {
                    Some(Ok(CompositionReferenceEvent::Applied(cr))) => {
                        error_count = 0;
                        // Recreated before its old tree was gone
                        if self.pending().remove(&cr.key()).is_some() {
                            tracing::debug!("Dropped pending delete for {}", cr.key());
                        }
                        self.reconcile_logged(&cr).await;
                        known.insert(cr.key(), cr);
                    }
                    Some(Ok(CompositionReferenceEvent::Deleted(cr))) => {
                        error_count = 0;
                        known.remove(&cr.key());
                        if let Err(e) = self.delete(&cr).await {
                            if self.has_pending_delete(&cr.key()) {
                                tracing::warn!(
                                    "Delete of {} failed, retrying next poll: {}",
                                    cr.key(),
                                    e
                                );
                            } else {
                                tracing::warn!("Delete of {} failed: {}", cr.key(), e);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error_count += 1;
                        if error_count == 1 || error_count.is_multiple_of(10) {
                            tracing::warn!(
                                "CompositionReference watch error ({}): {}",
                                error_count,
                                e
                            );
                        }
                    }
                    None => {
                        tracing::warn!("CompositionReference watch closed, polling known objects only");
                        events_open = false;
                    }
                },
                _ = ticker.tick() => {
                    self.retry_deletes().await;
                    for cr in known.values() {
                        self.reconcile_logged(cr).await;
                    }
                }
            }
        }

        tracing::info!("Shutting down {} watches", self.registry.len());
        self.registry.shutdown().await;
    }
}

fn decode_reference(obj: DynamicObject) -> Result<CompositionReference, WatchError> {
    serde_json::to_value(&obj)
        .and_then(CompositionReference::from_value)
        .map_err(|e| WatchError::Stream(format!("undecodable CompositionReference: {}", e)))
}

/// Watch CompositionReference objects in `namespace`, or cluster-wide when `None`
pub fn composition_reference_events(
    client: Client,
    namespace: Option<&str>,
) -> BoxStream<'static, Result<CompositionReferenceEvent, WatchError>> {
    let resource = api_resource(&GroupVersionResource {
        group: GROUP.to_string(),
        version: VERSION.to_string(),
        resource: PLURAL.to_string(),
    });
    let api: Api<DynamicObject> = match namespace {
        Some(ns) => Api::namespaced_with(client, ns, &resource),
        None => Api::all_with(client, &resource),
    };

    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(watcher::Event::InitApply(obj)) | Ok(watcher::Event::Apply(obj)) => {
                    Some(decode_reference(obj).map(CompositionReferenceEvent::Applied))
                }
                Ok(watcher::Event::Delete(obj)) => {
                    Some(decode_reference(obj).map(CompositionReferenceEvent::Deleted))
                }
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(e) => Some(Err(WatchError::Stream(e.to_string()))),
            }
        })
        .boxed()
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Lifecycle coordinator
//!
//! The single authorized path to create, dispatch to, and destroy entities.
//!
//! ## Teardown sequence (`delete`)
//!
//! ```text
//! 1. Active -> Detaching          (AlreadyDeleted if Deleted; concurrent callers converge)
//! 2. delete children, depth-first (each child unlinks itself from its parent)
//! 3. wait for in-flight callbacks (bounded; TeardownTimeout leaves Detaching)
//! 4. detach the ListenerBinding   (drops user closures, breaking cycles)
//! 5. remove the registry entry    (exactly once)
//! 6. delete the NativeHandle      (idempotent; retried, then abandoned)
//! 7. Detaching -> Deleted
//! ```
//!
//! Any failure before step 7 leaves the entity Detaching, with its tree
//! intact, and a later `delete` resumes where it stopped.
//!
//! ## Thread Safety
//!
//! The coordinator is `Send + Sync`; runtime threads use a cloned
//! [`Dispatcher`]. No lock is held while user callbacks or native calls run.

mod deferred;
mod dispatch;
mod teardown;

pub use deferred::DeferredReport;
pub use dispatch::{DispatchOutcome, Dispatcher};

use crate::config::LifecycleConfig;
use crate::entity::{BuiltinTopic, Entity, EntityConfig, EntityInner, EntityKind, EntityState};
use crate::events::{EventSink, LifecycleEvent};
use crate::listener::{Listener, ListenerBinding};
use crate::native::{NativeHandle, NativeId, NativeRuntime};
use crate::registry::EntityRegistry;
use crate::{Error, Result};
use deferred::DeferredQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters since the coordinator was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub created: u64,
    pub deleted: u64,
    pub delivered_callbacks: u64,
    pub dropped_callbacks: u64,
    pub callback_panics: u64,
    pub teardown_timeouts: u64,
    pub leaked_handles: u64,
}

#[derive(Default)]
struct StatsCounters {
    created: AtomicU64,
    deleted: AtomicU64,
    delivered_callbacks: AtomicU64,
    dropped_callbacks: AtomicU64,
    callback_panics: AtomicU64,
    teardown_timeouts: AtomicU64,
    leaked_handles: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LifecycleStats {
        LifecycleStats {
            created: self.created.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            delivered_callbacks: self.delivered_callbacks.load(Ordering::Relaxed),
            dropped_callbacks: self.dropped_callbacks.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            teardown_timeouts: self.teardown_timeouts.load(Ordering::Relaxed),
            leaked_handles: self.leaked_handles.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of [`LifecycleCoordinator::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Deferred deletes drained before the roots were torn down.
    pub deferred: DeferredReport,
    /// Root entities fully torn down.
    pub deleted_roots: usize,
    /// Roots whose teardown failed.
    pub failures: Vec<(NativeId, Error)>,
    /// Entities still registered afterwards, evicted from the registry.
    pub evicted: usize,
}

impl ShutdownReport {
    /// Everything was torn down and nothing had to be evicted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.evicted == 0 && self.deferred.failed.is_empty()
    }
}

pub(crate) struct Shared {
    runtime: Arc<dyn NativeRuntime>,
    registry: Arc<EntityRegistry>,
    config: LifecycleConfig,
    events: EventSink,
    stats: StatsCounters,
    deferred: DeferredQueue,
}

/// Creates entities, routes callbacks and runs ordered teardown.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    shared: Arc<Shared>,
}

impl LifecycleCoordinator {
    /// Coordinator over the process-wide [`EntityRegistry::global`].
    pub fn new(runtime: Arc<dyn NativeRuntime>, config: LifecycleConfig) -> Self {
        Self::with_registry(runtime, EntityRegistry::global(), config)
    }

    /// Coordinator over a caller-provided registry.
    pub fn with_registry(
        runtime: Arc<dyn NativeRuntime>,
        registry: Arc<EntityRegistry>,
        config: LifecycleConfig,
    ) -> Self {
        let deferred = DeferredQueue::new(config.deferred_queue_capacity);
        Self {
            shared: Arc::new(Shared {
                runtime,
                registry,
                config,
                events: EventSink::default(),
                stats: StatsCounters::default(),
                deferred,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.shared.registry
    }

    pub fn runtime(&self) -> &Arc<dyn NativeRuntime> {
        &self.shared.runtime
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> LifecycleStats {
        self.shared.stats.snapshot()
    }

    /// Resolve a native id to its registered entity.
    pub fn lookup(&self, id: NativeId) -> Option<Entity> {
        self.shared.registry.get(id)
    }

    /// Observe [`LifecycleEvent`]s. Replaces any previous hook.
    ///
    /// The hook runs synchronously on the thread that produced the event,
    /// including runtime dispatch threads; keep it short.
    pub fn set_event_hook(&self, hook: impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
        self.shared.events.set(hook);
    }

    pub fn clear_event_hook(&self) {
        self.shared.events.clear();
    }

    /// Entry point for native runtime threads.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.shared.clone())
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a root participant.
    ///
    /// # Errors
    ///
    /// `NativeCreateFailed` if the runtime rejects the request.
    pub fn create_participant(&self, config: EntityConfig) -> Result<Entity> {
        self.shared.create(None, EntityKind::DomainParticipant, config)
    }

    /// Create a `kind` entity owned by `parent`.
    ///
    /// # Errors
    ///
    /// - `InvalidParent` if `kind` cannot live under `parent`
    /// - `AlreadyDeleted` if `parent` is not Active
    /// - `NativeCreateFailed` if the runtime rejects the request
    pub fn create_child(
        &self,
        parent: &Entity,
        kind: EntityKind,
        config: EntityConfig,
    ) -> Result<Entity> {
        self.shared.create(Some(parent), kind, config)
    }

    pub fn create_publisher(&self, participant: &Entity, config: EntityConfig) -> Result<Entity> {
        self.create_child(participant, EntityKind::Publisher, config)
    }

    pub fn create_subscriber(&self, participant: &Entity, config: EntityConfig) -> Result<Entity> {
        self.create_child(participant, EntityKind::Subscriber, config)
    }

    pub fn create_topic(&self, participant: &Entity, config: EntityConfig) -> Result<Entity> {
        self.create_child(participant, EntityKind::Topic, config)
    }

    /// Reader under a participant (implicit subscriber) or a subscriber.
    pub fn create_reader(&self, parent: &Entity, config: EntityConfig) -> Result<Entity> {
        self.create_child(parent, EntityKind::DataReader, config)
    }

    /// Writer under a participant (implicit publisher) or a publisher.
    pub fn create_writer(&self, parent: &Entity, config: EntityConfig) -> Result<Entity> {
        self.create_child(parent, EntityKind::DataWriter, config)
    }

    /// Reader on one of the DDS builtin topics.
    pub fn create_builtin_reader(&self, parent: &Entity, topic: BuiltinTopic) -> Result<Entity> {
        self.create_reader(parent, EntityConfig::builtin(topic))
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Attach `listener` to `entity`, replacing (and detaching) any previous one.
    ///
    /// # Errors
    ///
    /// `AlreadyDeleted` unless the entity is Active.
    pub fn attach_listener(&self, entity: &Entity, listener: Listener) -> Result<()> {
        let id = entity.native_id();
        let kinds = listener.kinds();
        let binding = Arc::new(ListenerBinding::new(id, listener));

        // State check and install under the listener lock: teardown takes the
        // same lock after leaving Active, so it cannot miss a new binding.
        let previous = {
            let mut slot = entity.inner.listener.lock();
            if !entity.inner.gate.is_active() {
                return Err(Error::AlreadyDeleted(id));
            }
            slot.replace(binding)
        };
        if let Some(previous) = previous {
            previous.detach();
        }

        log::debug!("[lifecycle] listener attached to {} ({:?})", id, kinds);
        self.shared.events.emit(LifecycleEvent::ListenerAttached { id, kinds });
        Ok(())
    }

    /// Detach the listener of `entity`, if any. Returns whether one was attached.
    ///
    /// # Errors
    ///
    /// `AlreadyDeleted` if the entity is Deleted.
    pub fn detach_listener(&self, entity: &Entity) -> Result<bool> {
        let id = entity.native_id();
        if entity.state() == EntityState::Deleted {
            return Err(Error::AlreadyDeleted(id));
        }
        let binding = entity.inner.listener.lock().take();
        match binding {
            Some(binding) => {
                binding.detach();
                self.shared.events.emit(LifecycleEvent::ListenerDetached { id });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Tear down `entity` and its subtree within the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`LifecycleCoordinator::delete_with_timeout`].
    pub fn delete(&self, entity: &Entity) -> Result<()> {
        self.delete_with_timeout(entity, self.shared.config.teardown_timeout)
    }

    /// Tear down `entity` and its subtree, giving up after `timeout`.
    ///
    /// Must not be called from a callback of `entity` or of one of its
    /// descendants; use [`LifecycleCoordinator::delete_deferred`] there.
    ///
    /// # Errors
    ///
    /// - `AlreadyDeleted` if the entity was already Deleted
    /// - `ReentrantDelete` if called from inside one of the subtree's callbacks
    /// - `TeardownTimeout` if children or in-flight callbacks did not finish in time
    /// - `NativeDeleteFailed` if the runtime refused the delete (retriable)
    /// - `NativeDeleteFatal` once the retry budget is exhausted (handle abandoned)
    ///
    /// A `NativeDeleteFailed` entity stays Detaching but is already
    /// unregistered, so neither registry lookups nor [`shutdown`] can reach
    /// it. Keep the [`Entity`] to retry; dropping it leaves the native
    /// resource alive.
    ///
    /// [`shutdown`]: LifecycleCoordinator::shutdown
    pub fn delete_with_timeout(&self, entity: &Entity, timeout: Duration) -> Result<()> {
        self.shared.delete_checked(&entity.inner, deadline_after(timeout))
    }

    /// Queue `entity` for deletion by a later [`LifecycleCoordinator::run_deferred`].
    ///
    /// Safe to call from inside callbacks.
    ///
    /// # Errors
    ///
    /// `AlreadyDeleted` if the entity is Deleted, `DeferredQueueFull` if the
    /// queue is at capacity.
    pub fn delete_deferred(&self, entity: &Entity) -> Result<()> {
        self.shared.deferred.push(entity)
    }

    /// Deletes waiting in the deferred queue.
    pub fn pending_deferred(&self) -> usize {
        self.shared.deferred.len()
    }

    /// Run every queued deferred delete.
    ///
    /// Requests that would still be reentrant on this thread are put back.
    pub fn run_deferred(&self) -> DeferredReport {
        self.shared.run_deferred()
    }

    /// Delete every registered root, then evict whatever is still registered.
    ///
    /// Evicted entities have their listeners detached; their native handles,
    /// if still live, are leaked and logged. Entities already unregistered by
    /// a failed native delete are not seen here; retry them through their
    /// own handle.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let deadline = deadline_after(timeout);
        let mut report = ShutdownReport {
            deferred: self.shared.run_deferred(),
            ..ShutdownReport::default()
        };

        for root in self.shared.registry.roots() {
            match self.shared.delete_checked(&root.inner, deadline) {
                Ok(()) | Err(Error::AlreadyDeleted(_)) => report.deleted_roots += 1,
                Err(err) => {
                    log::warn!(
                        "[lifecycle] shutdown: teardown of {} failed: {}",
                        root.native_id(),
                        err
                    );
                    report.failures.push((root.native_id(), err));
                }
            }
        }

        let leftovers = self.shared.registry.clear();
        for entity in &leftovers {
            let binding = entity.inner.listener.lock().take();
            if let Some(binding) = binding {
                binding.detach();
            }
        }
        report.evicted = leftovers.len();
        if report.evicted > 0 {
            log::warn!(
                "[lifecycle] shutdown evicted {} entities still registered",
                report.evicted
            );
            self.shared.events.emit(LifecycleEvent::RegistryCleared {
                evicted: report.evicted,
            });
        }
        report
    }
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("registry", &self.shared.registry)
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Shared {
    fn create(
        &self,
        parent: Option<&Entity>,
        kind: EntityKind,
        config: EntityConfig,
    ) -> Result<Entity> {
        let parent_kind = parent.map(Entity::kind);
        if !kind.can_be_child_of(parent_kind) {
            return Err(Error::InvalidParent {
                parent: parent_kind,
                child: kind,
            });
        }

        let inner = match parent {
            None => self.create_native(kind, None, config)?,
            Some(parent) => {
                // Held across the native create. Teardown leaves Active before
                // taking this lock to snapshot children, so a new child is
                // either refused here or seen by that snapshot.
                let mut children = parent.inner.children.lock();
                if !parent.inner.gate.is_active() {
                    return Err(Error::AlreadyDeleted(parent.native_id()));
                }
                let inner = self.create_native(kind, Some(&parent.inner), config)?;
                children.insert(inner.id(), inner.clone());
                inner
            }
        };

        let id = inner.id();
        let parent_id = parent.map(Entity::native_id);
        StatsCounters::bump(&self.stats.created);
        log::debug!("[lifecycle] created {} {} (parent {:?})", kind, id, parent_id);
        self.events.emit(LifecycleEvent::Created {
            id,
            kind,
            parent: parent_id,
        });
        Ok(Entity::from_inner(inner))
    }

    fn create_native(
        &self,
        kind: EntityKind,
        parent: Option<&Arc<EntityInner>>,
        config: EntityConfig,
    ) -> Result<Arc<EntityInner>> {
        let parent_id = parent.map(|p| p.id());
        let handle = NativeHandle::create(self.runtime.clone(), kind, parent_id, &config)
            .map_err(|e| {
                log::warn!("[lifecycle] native create of {} failed: {}", kind, e);
                Error::NativeCreateFailed(e)
            })?;
        let inner = Arc::new(EntityInner::new(
            kind,
            handle,
            config,
            parent.map(Arc::downgrade),
        ));

        if let Err(err) = self.registry.insert(inner.clone()) {
            // The id belongs to the entity already registered; do not delete it.
            log::error!("[lifecycle] runtime reissued live id {}", inner.id());
            inner.handle.abandon();
            inner.gate.finish_teardown();
            StatsCounters::bump(&self.stats.leaked_handles);
            return Err(err);
        }
        Ok(inner)
    }
}

/// `now + timeout`, saturating far in the future instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered teardown of one entity subtree.

use super::{dispatch, Shared, StatsCounters};
use crate::entity::{EntityInner, EntityState, TeardownRefused, TeardownStart};
use crate::events::LifecycleEvent;
use crate::{Error, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

impl Shared {
    /// Teardown entry point for user-facing paths: refuses to run from
    /// inside a callback of the subtree being deleted.
    pub(super) fn delete_checked(
        &self,
        entity: &Arc<EntityInner>,
        deadline: Instant,
    ) -> Result<()> {
        dispatch::ensure_not_dispatching(entity)?;
        self.delete_entity(entity, deadline)
    }

    fn delete_entity(&self, entity: &Arc<EntityInner>, deadline: Instant) -> Result<()> {
        let id = entity.id();
        match entity.gate.begin_teardown(deadline) {
            Ok(TeardownStart::Owner) => {}
            Ok(TeardownStart::CompletedElsewhere) => {
                log::debug!("[lifecycle] {} deleted by a concurrent caller", id);
                return Ok(());
            }
            Err(TeardownRefused::AlreadyDeleted) => return Err(Error::AlreadyDeleted(id)),
            Err(TeardownRefused::TimedOut { in_flight }) => {
                return Err(self.timed_out(entity, in_flight));
            }
        }

        log::debug!("[lifecycle] teardown of {} {} started", entity.kind, id);
        self.events.emit(LifecycleEvent::TeardownStarted { id });

        let result = self.run_teardown(entity, deadline);
        match &result {
            Ok(()) => {}
            // Our own handle was leaked: the entity is already Deleted.
            Err(Error::NativeDeleteFatal { id: failed, .. }) if *failed == id => {}
            // Anything else, including a leaked descendant, leaves us retryable.
            Err(_) => entity.gate.abort_teardown(),
        }
        result
    }

    fn run_teardown(&self, entity: &Arc<EntityInner>, deadline: Instant) -> Result<()> {
        let id = entity.id();

        // 1. Children, depth-first. No new child can be added once Detaching.
        let children: Vec<Arc<EntityInner>> = entity.children.lock().values().cloned().collect();
        for child in &children {
            match self.delete_entity(child, deadline) {
                Ok(()) | Err(Error::AlreadyDeleted(_)) => {}
                Err(err) => return Err(err),
            }
        }
        entity
            .children
            .lock()
            .retain(|_, child| child.gate.state() != EntityState::Deleted);

        // 2. In-flight callbacks.
        if let Err(in_flight) = entity.gate.wait_idle(deadline) {
            return Err(self.timed_out(entity, in_flight));
        }

        // 3. Listener. Dropping the closures releases anything they captured.
        let binding = entity.listener.lock().take();
        if let Some(binding) = binding {
            binding.detach();
            self.events.emit(LifecycleEvent::ListenerDetached { id });
        }

        // 4. Registry entry.
        self.registry.remove(id);

        // 5. Native resource.
        if let Err(error) = entity.handle.delete() {
            let attempts = entity.native_delete_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if attempts >= self.config.max_native_delete_attempts {
                entity.handle.abandon();
                entity.gate.finish_teardown();
                entity.unlink_from_parent();
                StatsCounters::bump(&self.stats.leaked_handles);
                log::error!(
                    "[lifecycle] giving up on {} {} after {} failed deletes: {}",
                    entity.kind,
                    id,
                    attempts,
                    error
                );
                self.events.emit(LifecycleEvent::HandleLeaked { id, attempts });
                return Err(Error::NativeDeleteFatal {
                    id,
                    attempts,
                    source: error,
                });
            }

            log::warn!(
                "[lifecycle] native delete of {} failed (attempt {}/{}): {}",
                id,
                attempts,
                self.config.max_native_delete_attempts,
                error
            );
            self.events.emit(LifecycleEvent::NativeDeleteFailed {
                id,
                attempts,
                error: error.clone(),
            });
            return Err(Error::NativeDeleteFailed {
                id,
                attempts,
                source: error,
            });
        }

        // 6. Terminal state.
        entity.gate.finish_teardown();
        entity.unlink_from_parent();
        StatsCounters::bump(&self.stats.deleted);
        log::debug!("[lifecycle] deleted {} {}", entity.kind, id);
        self.events.emit(LifecycleEvent::Deleted {
            id,
            kind: entity.kind,
        });
        Ok(())
    }

    fn timed_out(&self, entity: &EntityInner, in_flight: usize) -> Error {
        let id = entity.id();
        StatsCounters::bump(&self.stats.teardown_timeouts);
        log::warn!(
            "[lifecycle] teardown of {} {} timed out with {} callbacks in flight",
            entity.kind,
            id,
            in_flight
        );
        self.events.emit(LifecycleEvent::TeardownTimedOut { id, in_flight });
        Error::TeardownTimeout { id, in_flight }
    }
}

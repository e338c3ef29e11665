// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback routing from native runtime threads.
//!
//! `dispatch` resolves the native id through the registry, enters the
//! entity's gate (refused once teardown started), and runs the listener
//! callback with no lock held. Panics are contained here so they never
//! unwind into the native runtime.

use super::{Shared, StatsCounters};
use crate::entity::{Entity, EntityInner};
use crate::events::{DropReason, LifecycleEvent};
use crate::listener::{CallbackKind, CallbackPayload};
use crate::native::NativeId;
use crate::{Error, Result};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Entities whose callbacks are running on this thread, innermost last.
    static DISPATCHING: RefCell<Vec<NativeId>> = const { RefCell::new(Vec::new()) };
}

/// Marks `id` as dispatching on this thread until dropped.
struct DispatchScope;

impl DispatchScope {
    fn enter(id: NativeId) -> Self {
        DISPATCHING.with(|stack| stack.borrow_mut().push(id));
        DispatchScope
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Refuse a synchronous delete of `entity` from inside a callback of the
/// entity or one of its descendants; it would wait on its own in-flight count.
pub(super) fn ensure_not_dispatching(entity: &EntityInner) -> Result<()> {
    let active: Vec<NativeId> = DISPATCHING.with(|stack| stack.borrow().clone());
    if active.is_empty() {
        return Ok(());
    }
    let mut subtree = Vec::new();
    entity.collect_subtree(&mut subtree);
    match active.iter().find(|id| subtree.contains(id)) {
        Some(&id) => {
            log::warn!(
                "[lifecycle] delete of {} refused: called from a callback of {}",
                entity.id(),
                id
            );
            Err(Error::ReentrantDelete(entity.id()))
        }
        None => Ok(()),
    }
}

/// Result of one [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The callback ran to completion.
    Delivered,
    /// The entity is Active but has no callback for this kind.
    NoListener,
    /// Dropped without running anything.
    Dropped(DropReason),
    /// The callback panicked; the panic was contained.
    Panicked,
}

/// Routes native callbacks to listener closures.
///
/// Cloneable and `Send + Sync`; hand one to each runtime thread.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Deliver `payload` to the listener of entity `id`.
    ///
    /// Never blocks on teardown and never panics.
    pub fn dispatch(&self, id: NativeId, payload: CallbackPayload) -> DispatchOutcome {
        let kind = payload.kind();
        let Some(inner) = self.shared.registry.get_inner(id) else {
            return self.dropped(id, kind, DropReason::Unregistered);
        };

        let _in_flight = match inner.gate.try_enter() {
            Ok(guard) => guard,
            Err(state) => return self.dropped(id, kind, DropReason::NotActive(state)),
        };

        let binding = inner.listener.lock().clone();
        let Some(binding) = binding else {
            return DispatchOutcome::NoListener;
        };

        let entity = Entity::from_inner(inner.clone());
        let _scope = DispatchScope::enter(id);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            binding.invoke(&entity, &payload)
        }));

        match result {
            Ok(true) => {
                StatsCounters::bump(&self.shared.stats.delivered_callbacks);
                DispatchOutcome::Delivered
            }
            Ok(false) => DispatchOutcome::NoListener,
            Err(_) => {
                StatsCounters::bump(&self.shared.stats.callback_panics);
                log::error!("[dispatch] {} callback panicked for {}", kind, id);
                self.shared.events.emit(LifecycleEvent::CallbackPanicked { id, kind });
                DispatchOutcome::Panicked
            }
        }
    }

    fn dropped(&self, id: NativeId, kind: CallbackKind, reason: DropReason) -> DispatchOutcome {
        StatsCounters::bump(&self.shared.stats.dropped_callbacks);
        log::debug!("[dispatch] dropped {} for {} ({:?})", kind, id, reason);
        self.shared.events.emit(LifecycleEvent::DroppedCallback { id, kind, reason });
        DispatchOutcome::Dropped(reason)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

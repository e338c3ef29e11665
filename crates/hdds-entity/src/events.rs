// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle events.
//!
//! Everything observable about teardown that is not an error for the caller
//! (dropped callbacks, leaked handles, panicking callbacks) is reported here.
//! Install a hook with
//! [`LifecycleCoordinator::set_event_hook`](crate::LifecycleCoordinator::set_event_hook).

use crate::entity::{EntityKind, EntityState};
use crate::listener::CallbackKind;
use crate::native::{NativeError, NativeId};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Why a callback was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No entity is registered under the native id.
    Unregistered,
    /// The entity is Detaching or Deleted.
    NotActive(EntityState),
}

/// Events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created {
        id: NativeId,
        kind: EntityKind,
        parent: Option<NativeId>,
    },
    ListenerAttached {
        id: NativeId,
        kinds: Vec<CallbackKind>,
    },
    ListenerDetached {
        id: NativeId,
    },
    /// Informational: a callback arrived for an entity that cannot take it.
    DroppedCallback {
        id: NativeId,
        kind: CallbackKind,
        reason: DropReason,
    },
    /// A callback panicked; the panic was contained at the dispatch boundary.
    CallbackPanicked {
        id: NativeId,
        kind: CallbackKind,
    },
    TeardownStarted {
        id: NativeId,
    },
    TeardownTimedOut {
        id: NativeId,
        in_flight: usize,
    },
    NativeDeleteFailed {
        id: NativeId,
        attempts: u32,
        error: NativeError,
    },
    /// The native handle was abandoned after repeated delete failures.
    HandleLeaked {
        id: NativeId,
        attempts: u32,
    },
    Deleted {
        id: NativeId,
        kind: EntityKind,
    },
    /// Shutdown evicted entities that were still registered.
    RegistryCleared {
        evicted: usize,
    },
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::Created { id, kind, parent } => match parent {
                Some(parent) => write!(f, "created {} {} under {}", kind, id, parent),
                None => write!(f, "created {} {}", kind, id),
            },
            LifecycleEvent::ListenerAttached { id, kinds } => {
                write!(f, "listener attached to {} ({} callbacks)", id, kinds.len())
            }
            LifecycleEvent::ListenerDetached { id } => write!(f, "listener detached from {}", id),
            LifecycleEvent::DroppedCallback { id, kind, reason } => {
                write!(f, "dropped {} for {} ({:?})", kind, id, reason)
            }
            LifecycleEvent::CallbackPanicked { id, kind } => {
                write!(f, "{} panicked for {}", kind, id)
            }
            LifecycleEvent::TeardownStarted { id } => write!(f, "teardown of {} started", id),
            LifecycleEvent::TeardownTimedOut { id, in_flight } => write!(
                f,
                "teardown of {} timed out ({} in flight)",
                id, in_flight
            ),
            LifecycleEvent::NativeDeleteFailed {
                id,
                attempts,
                error,
            } => write!(
                f,
                "native delete of {} failed (attempt {}): {}",
                id, attempts, error
            ),
            LifecycleEvent::HandleLeaked { id, attempts } => write!(
                f,
                "native handle {} leaked after {} attempts",
                id, attempts
            ),
            LifecycleEvent::Deleted { id, kind } => write!(f, "deleted {} {}", kind, id),
            LifecycleEvent::RegistryCleared { evicted } => {
                write!(f, "registry cleared ({} evicted)", evicted)
            }
        }
    }
}

/// Observer callback for lifecycle events.
pub type EventHook = dyn Fn(&LifecycleEvent) + Send + Sync + 'static;

// ArcSwap needs a sized payload.
struct HookCell(Box<EventHook>);

/// Lock-free slot holding the current hook.
#[derive(Default)]
pub(crate) struct EventSink {
    hook: ArcSwapOption<HookCell>,
}

impl EventSink {
    pub(crate) fn set(&self, hook: impl Fn(&LifecycleEvent) + Send + Sync + 'static) {
        self.hook.store(Some(Arc::new(HookCell(Box::new(hook)))));
    }

    pub(crate) fn clear(&self) {
        self.hook.store(None);
    }

    /// Run the hook, if any. A panicking hook is logged and swallowed so
    /// it never unwinds into dispatch or teardown.
    pub(crate) fn emit(&self, event: LifecycleEvent) {
        let Some(cell) = self.hook.load_full() else {
            return;
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (cell.0)(&event)));
        if result.is_err() {
            log::error!("[events] hook panicked on {}", event);
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owned wrapper around one native resource id.

use super::{NativeError, NativeId, NativeRuntime};
use crate::entity::{EntityConfig, EntityKind};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Live,
    Deleted,
    /// Given up on after repeated native delete failures.
    Abandoned,
}

/// Exclusive owner of one native resource.
///
/// Not `Clone`: exactly one [`Entity`](crate::Entity) owns each handle.
/// Dropping a handle never deletes the native resource; only
/// [`NativeHandle::delete`] does, and only once.
pub struct NativeHandle {
    id: NativeId,
    runtime: Arc<dyn NativeRuntime>,
    // Held across the native call so concurrent deletes serialize and the
    // runtime sees at most one successful delete per id.
    state: Mutex<HandleState>,
}

impl NativeHandle {
    pub(crate) fn create(
        runtime: Arc<dyn NativeRuntime>,
        kind: EntityKind,
        parent: Option<NativeId>,
        config: &EntityConfig,
    ) -> Result<Self, NativeError> {
        let id = runtime.create(kind, parent, config)?;
        Ok(Self {
            id,
            runtime,
            state: Mutex::new(HandleState::Live),
        })
    }

    /// Native identifier.
    pub fn id(&self) -> NativeId {
        self.id
    }

    /// Whether the native resource is still owned by this handle.
    pub fn is_live(&self) -> bool {
        *self.state.lock() == HandleState::Live
    }

    /// Delete the native resource.
    ///
    /// Returns `Ok(true)` when this call deleted it, `Ok(false)` when it was
    /// already deleted or abandoned. A failed delete leaves the handle live.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error if it refused the delete.
    pub fn delete(&self) -> Result<bool, NativeError> {
        let mut state = self.state.lock();
        if *state != HandleState::Live {
            return Ok(false);
        }
        self.runtime.delete(self.id)?;
        *state = HandleState::Deleted;
        Ok(true)
    }

    /// Stop owning the resource without deleting it.
    pub(crate) fn abandon(&self) {
        let mut state = self.state.lock();
        if *state == HandleState::Live {
            *state = HandleState::Abandoned;
        }
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if *self.state.get_mut() == HandleState::Live {
            log::warn!(
                "[native] handle {} dropped while live, native resource leaked",
                self.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{ReturnCode, SimRuntime};

    fn participant_handle(sim: &Arc<SimRuntime>) -> NativeHandle {
        NativeHandle::create(
            sim.clone(),
            EntityKind::DomainParticipant,
            None,
            &EntityConfig::participant(0),
        )
        .expect("create should succeed")
    }

    #[test]
    fn test_delete_is_idempotent() {
        let sim = Arc::new(SimRuntime::new());
        let handle = participant_handle(&sim);
        let id = handle.id();

        assert_eq!(handle.delete(), Ok(true));
        assert_eq!(handle.delete(), Ok(false));
        assert_eq!(handle.delete(), Ok(false));

        assert!(!handle.is_live());
        assert_eq!(sim.delete_attempts(id), 1);
        assert_eq!(sim.double_delete_count(), 0);
    }

    #[test]
    fn test_failed_delete_leaves_handle_live() {
        let sim = Arc::new(SimRuntime::new());
        let handle = participant_handle(&sim);
        sim.fail_deletes(handle.id(), 1);

        let err = handle.delete().expect_err("first delete should fail");
        assert_eq!(err.code, ReturnCode::Error);
        assert!(handle.is_live());

        assert_eq!(handle.delete(), Ok(true));
        assert!(!sim.is_live(handle.id()));
    }

    #[test]
    fn test_abandon_skips_native_delete() {
        let sim = Arc::new(SimRuntime::new());
        let handle = participant_handle(&sim);
        let id = handle.id();

        handle.abandon();
        assert_eq!(handle.delete(), Ok(false));
        assert!(sim.is_live(id), "abandoned resource stays with the runtime");
        assert_eq!(sim.delete_attempts(id), 0);
    }

    #[test]
    fn test_concurrent_deletes_reach_runtime_once() {
        let sim = Arc::new(SimRuntime::new());
        let handle = Arc::new(participant_handle(&sim));
        let id = handle.id();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || handle.delete().expect("delete should not fail"))
            })
            .collect();
        let deleted: usize = threads
            .into_iter()
            .map(|t| usize::from(t.join().expect("thread panicked")))
            .sum();

        assert_eq!(deleted, 1);
        assert_eq!(sim.delete_attempts(id), 1);
    }
}

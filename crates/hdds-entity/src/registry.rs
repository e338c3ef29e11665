// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity registry: `NativeId` -> owning entity.
//!
//! The registry holds a **strong** reference to every live entity. Callbacks
//! arriving from runtime threads are resolved here, so an entity must stay
//! reachable for exactly as long as its native resource can still fire them.
//! A lookup-only (weak) table would let an entity that sits in a reference
//! cycle with its own listener closures be freed while the runtime still
//! dispatches to it.
//!
//! Entries are inserted when an entity is created and removed exactly once,
//! by the coordinator's teardown. [`EntityRegistry::clear`] is the explicit
//! shutdown path.
//!
//! # Thread Safety
//!
//! All access goes through one registry-wide mutex. Lookups clone the entry
//! out and release the lock before any callback runs.

use crate::entity::{Entity, EntityInner};
use crate::native::NativeId;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Native id to owning entity table.
#[derive(Default)]
pub struct EntityRegistry {
    entries: Mutex<HashMap<NativeId, Arc<EntityInner>>>,
}

impl EntityRegistry {
    /// Create an empty, private registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, initialized on first use.
    pub fn global() -> Arc<EntityRegistry> {
        static REGISTRY: OnceLock<Arc<EntityRegistry>> = OnceLock::new();
        REGISTRY
            .get_or_init(|| Arc::new(EntityRegistry::new()))
            .clone()
    }

    pub(crate) fn insert(&self, entity: Arc<EntityInner>) -> Result<()> {
        let id = entity.id();
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(Error::AlreadyRegistered(id));
        }
        entries.insert(id, entity);
        Ok(())
    }

    pub(crate) fn remove(&self, id: NativeId) -> Option<Arc<EntityInner>> {
        self.entries.lock().remove(&id)
    }

    pub(crate) fn get_inner(&self, id: NativeId) -> Option<Arc<EntityInner>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Resolve a native id to its entity.
    pub fn get(&self, id: NativeId) -> Option<Entity> {
        self.get_inner(id).map(Entity::from_inner)
    }

    pub fn contains(&self, id: NativeId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Registered ids (unordered snapshot).
    pub fn ids(&self) -> Vec<NativeId> {
        self.entries.lock().keys().copied().collect()
    }

    /// Registered entities without a parent (participants).
    pub fn roots(&self) -> Vec<Entity> {
        self.entries
            .lock()
            .values()
            .filter(|inner| inner.parent.is_none())
            .cloned()
            .map(Entity::from_inner)
            .collect()
    }

    /// Remove every entry and return the evicted entities.
    ///
    /// Does not touch native resources; callers decide what to do with
    /// entities that were still registered (see
    /// [`LifecycleCoordinator::shutdown`](crate::LifecycleCoordinator::shutdown)).
    pub fn clear(&self) -> Vec<Entity> {
        let drained: Vec<Arc<EntityInner>> =
            self.entries.lock().drain().map(|(_, inner)| inner).collect();
        if !drained.is_empty() {
            log::debug!("[registry] cleared {} entries", drained.len());
        }
        drained.into_iter().map(Entity::from_inner).collect()
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process simulated native runtime.
//!
//! Behaves like a strict DDS runtime as far as resource lifetimes go:
//!
//! - a resource with live children cannot be deleted (`PRECONDITION_NOT_MET`)
//! - deleting an unknown or already deleted id fails (`ALREADY_DELETED`)
//! - a topic name is bound to one type name per participant
//! - after [`SimRuntime::shutdown`] every create fails
//!
//! Every violation is counted so tests can assert the binding never
//! triggered one. Faults (failed creates/deletes, slow deletes) can be
//! injected to exercise retry and timeout paths.

use super::{NativeError, NativeId, NativeRuntime, ReturnCode};
use crate::config::MAX_DOMAIN_ID;
use crate::entity::{EntityConfig, EntityKind};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct SimNode {
    kind: EntityKind,
    parent: Option<NativeId>,
    live_children: usize,
    /// (participant, topic name) for topics, used to release the name binding.
    topic_key: Option<(NativeId, String)>,
}

/// Topic name binding on one participant: the bound type and how many topics use it.
#[derive(Debug)]
struct TopicBinding {
    type_name: String,
    users: usize,
}

/// In-memory [`NativeRuntime`] with invariant checking and fault injection.
#[derive(Debug)]
pub struct SimRuntime {
    next_id: AtomicU64,
    nodes: DashMap<NativeId, SimNode>,
    topics: DashMap<(NativeId, String), TopicBinding>,
    delete_attempts: DashMap<NativeId, u32>,
    delete_failures: DashMap<NativeId, u32>,
    fail_next_creates: AtomicU32,
    delete_delay: Mutex<Option<Duration>>,
    deletion_log: Mutex<Vec<NativeId>>,
    shut_down: AtomicBool,
    created: AtomicU64,
    deleted: AtomicU64,
    double_deletes: AtomicU64,
    order_violations: AtomicU64,
}

impl SimRuntime {
    /// Create an empty runtime.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            nodes: DashMap::new(),
            topics: DashMap::new(),
            delete_attempts: DashMap::new(),
            delete_failures: DashMap::new(),
            fail_next_creates: AtomicU32::new(0),
            delete_delay: Mutex::new(None),
            deletion_log: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            created: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            double_deletes: AtomicU64::new(0),
            order_violations: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Make the next `count` create calls fail with `OUT_OF_RESOURCES`.
    pub fn fail_next_creates(&self, count: u32) {
        self.fail_next_creates.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` delete calls for `id` fail with `ERROR`.
    pub fn fail_deletes(&self, id: NativeId, count: u32) {
        if count == 0 {
            self.delete_failures.remove(&id);
        } else {
            self.delete_failures.insert(id, count);
        }
    }

    /// Sleep for `delay` inside every delete call (simulates a runtime that
    /// blocks on its own internal state).
    pub fn set_delete_delay(&self, delay: Option<Duration>) {
        *self.delete_delay.lock() = delay;
    }

    /// Reject every further create call.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Whether `id` is a live native resource. Usable without the
    /// [`NativeRuntime`] trait in scope.
    pub fn is_live(&self, id: NativeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live native resources.
    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total successful creates.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Total successful deletes.
    pub fn deleted_count(&self) -> u64 {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Deletes issued for ids that were unknown or already deleted.
    pub fn double_delete_count(&self) -> u64 {
        self.double_deletes.load(Ordering::SeqCst)
    }

    /// Deletes issued for resources that still had live children.
    pub fn order_violation_count(&self) -> u64 {
        self.order_violations.load(Ordering::SeqCst)
    }

    /// Delete calls received for `id`, successful or not.
    pub fn delete_attempts(&self, id: NativeId) -> u32 {
        self.delete_attempts.get(&id).map_or(0, |n| *n)
    }

    /// Ids in the order they were successfully deleted.
    pub fn deletion_log(&self) -> Vec<NativeId> {
        self.deletion_log.lock().clone()
    }

    /// Kind of a live resource.
    pub fn kind_of(&self, id: NativeId) -> Option<EntityKind> {
        self.nodes.get(&id).map(|node| node.kind)
    }

    /// Parent of a live resource.
    pub fn parent_of(&self, id: NativeId) -> Option<NativeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    fn bind_topic(&self, participant: NativeId, config: &EntityConfig) -> Result<(), NativeError> {
        let (Some(name), Some(type_name)) = (config.topic_name(), config.type_name()) else {
            return Err(NativeError::new(
                ReturnCode::BadParameter,
                "topic requires a name and a type name",
            ));
        };
        let key = (participant, name.to_string());
        let mut binding = self.topics.entry(key).or_insert_with(|| TopicBinding {
            type_name: type_name.to_string(),
            users: 0,
        });
        if binding.type_name != type_name {
            return Err(NativeError::new(
                ReturnCode::PreconditionNotMet,
                format!(
                    "topic '{}' already bound to type '{}'",
                    name, binding.type_name
                ),
            ));
        }
        binding.users += 1;
        Ok(())
    }

    fn release_topic(&self, key: (NativeId, String)) {
        self.topics.remove_if_mut(&key, |_, binding| {
            binding.users = binding.users.saturating_sub(1);
            binding.users == 0
        });
    }

    fn validate(
        &self,
        kind: EntityKind,
        parent: Option<NativeId>,
        config: &EntityConfig,
    ) -> Result<(), NativeError> {
        if kind == EntityKind::DomainParticipant && config.domain_id() > MAX_DOMAIN_ID {
            return Err(NativeError::new(
                ReturnCode::BadParameter,
                format!(
                    "domain id {} out of range (0-{})",
                    config.domain_id(),
                    MAX_DOMAIN_ID
                ),
            ));
        }
        if matches!(kind, EntityKind::DataReader | EntityKind::DataWriter)
            && config.topic_name().is_none()
        {
            return Err(NativeError::new(
                ReturnCode::BadParameter,
                format!("{} requires a topic name", kind),
            ));
        }
        if let Some(parent) = parent {
            if !self.nodes.contains_key(&parent) {
                return Err(NativeError::new(
                    ReturnCode::BadParameter,
                    format!("parent {} does not exist", parent),
                ));
            }
        }
        Ok(())
    }

    fn participant_of(&self, parent: Option<NativeId>) -> Option<NativeId> {
        let mut current = parent;
        while let Some(id) = current {
            let node = self.nodes.get(&id)?;
            if node.kind == EntityKind::DomainParticipant {
                return Some(id);
            }
            current = node.parent;
        }
        None
    }
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRuntime for SimRuntime {
    fn create(
        &self,
        kind: EntityKind,
        parent: Option<NativeId>,
        config: &EntityConfig,
    ) -> Result<NativeId, NativeError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(NativeError::new(
                ReturnCode::PreconditionNotMet,
                "runtime is shutting down",
            ));
        }
        if self
            .fail_next_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(NativeError::new(
                ReturnCode::OutOfResources,
                "injected create failure",
            ));
        }
        self.validate(kind, parent, config)?;

        let topic_key = if kind == EntityKind::Topic {
            let participant = self.participant_of(parent).ok_or_else(|| {
                NativeError::new(ReturnCode::BadParameter, "topic needs a participant")
            })?;
            self.bind_topic(participant, config)?;
            config
                .topic_name()
                .map(|name| (participant, name.to_string()))
        } else {
            None
        };

        if let Some(parent) = parent {
            // Shard write lock serializes against remove_if() in delete().
            match self.nodes.get_mut(&parent) {
                Some(mut node) => node.live_children += 1,
                None => {
                    if let Some(key) = topic_key {
                        self.release_topic(key);
                    }
                    return Err(NativeError::new(
                        ReturnCode::BadParameter,
                        format!("parent {} deleted during create", parent),
                    ));
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.nodes.insert(
            id,
            SimNode {
                kind,
                parent,
                live_children: 0,
                topic_key,
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn delete(&self, id: NativeId) -> Result<(), NativeError> {
        *self.delete_attempts.entry(id).or_insert(0) += 1;

        let delay = *self.delete_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let injected = self
            .delete_failures
            .remove_if_mut(&id, |_, remaining| {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            })
            .is_some()
            || self.delete_failures.contains_key(&id);
        if injected {
            return Err(NativeError::new(ReturnCode::Error, "injected delete failure"));
        }

        if let Some((_, node)) = self.nodes.remove_if(&id, |_, node| node.live_children == 0) {
            if let Some(parent) = node.parent {
                if let Some(mut parent) = self.nodes.get_mut(&parent) {
                    parent.live_children = parent.live_children.saturating_sub(1);
                }
            }
            if let Some(key) = node.topic_key {
                self.release_topic(key);
            }
            self.deletion_log.lock().push(id);
            self.deleted.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        if self.nodes.contains_key(&id) {
            self.order_violations.fetch_add(1, Ordering::SeqCst);
            log::error!("[sim] delete of {} refused: children still alive", id);
            Err(NativeError::new(
                ReturnCode::PreconditionNotMet,
                format!("entity {} still has live children", id),
            ))
        } else {
            self.double_deletes.fetch_add(1, Ordering::SeqCst);
            log::error!("[sim] delete of unknown or deleted entity {}", id);
            Err(NativeError::new(
                ReturnCode::AlreadyDeleted,
                format!("entity {} already deleted", id),
            ))
        }
    }

    fn is_live(&self, id: NativeId) -> bool {
        self.nodes.contains_key(&id)
    }
}

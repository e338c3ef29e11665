// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Entity tree
//!
//! Binding-side mirror of the native resource hierarchy.
//!
//! ```text
//! DomainParticipant
//! +-- Publisher
//! |   +-- DataWriter
//! +-- Subscriber
//! |   +-- DataReader
//! +-- Topic
//! +-- DataReader / DataWriter   (implicit subscriber/publisher, builtin readers)
//! ```
//!
//! Parents own children strongly; children point back through a `Weak`
//! that never keeps a parent alive. State moves
//! `Active -> Detaching -> Deleted`, driven exclusively by the
//! [`LifecycleCoordinator`](crate::LifecycleCoordinator).

mod gate;

pub(crate) use gate::{DispatchGate, TeardownRefused, TeardownStart};

use crate::listener::ListenerBinding;
use crate::native::{NativeHandle, NativeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Weak};

/// The six DDS entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    DomainParticipant,
    Publisher,
    Subscriber,
    Topic,
    DataReader,
    DataWriter,
}

impl EntityKind {
    /// Whether an entity of this kind may be created under `parent`
    /// (`None` meaning "as a root").
    pub fn can_be_child_of(self, parent: Option<EntityKind>) -> bool {
        use EntityKind::*;
        match (parent, self) {
            (None, DomainParticipant) => true,
            (None, _) => false,
            (Some(DomainParticipant), DomainParticipant) => false,
            (Some(DomainParticipant), _) => true,
            (Some(Publisher), DataWriter) => true,
            (Some(Subscriber), DataReader) => true,
            (Some(_), _) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::DomainParticipant => "DomainParticipant",
            EntityKind::Publisher => "Publisher",
            EntityKind::Subscriber => "Subscriber",
            EntityKind::Topic => "Topic",
            EntityKind::DataReader => "DataReader",
            EntityKind::DataWriter => "DataWriter",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an entity. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Usable; callbacks are delivered.
    Active,
    /// Teardown started (or was interrupted); callbacks are dropped.
    Detaching,
    /// Native resource released.
    Deleted,
}

/// DDS builtin topics that can be read through a builtin reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTopic {
    DcpsParticipant,
    DcpsTopic,
    DcpsPublication,
    DcpsSubscription,
}

impl BuiltinTopic {
    pub fn topic_name(self) -> &'static str {
        match self {
            BuiltinTopic::DcpsParticipant => "DCPSParticipant",
            BuiltinTopic::DcpsTopic => "DCPSTopic",
            BuiltinTopic::DcpsPublication => "DCPSPublication",
            BuiltinTopic::DcpsSubscription => "DCPSSubscription",
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            BuiltinTopic::DcpsParticipant => "DDS::ParticipantBuiltinTopicData",
            BuiltinTopic::DcpsTopic => "DDS::TopicBuiltinTopicData",
            BuiltinTopic::DcpsPublication => "DDS::PublicationBuiltinTopicData",
            BuiltinTopic::DcpsSubscription => "DDS::SubscriptionBuiltinTopicData",
        }
    }
}

/// Parameters forwarded to the native factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityConfig {
    domain_id: u32,
    name: Option<String>,
    topic_name: Option<String>,
    type_name: Option<String>,
}

impl EntityConfig {
    /// Participant on `domain_id`.
    pub fn participant(domain_id: u32) -> Self {
        Self {
            domain_id,
            ..Self::default()
        }
    }

    /// Topic `name` carrying `type_name`.
    pub fn topic(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            topic_name: Some(name.into()),
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    /// Reader on `topic_name`.
    pub fn reader(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: Some(topic_name.into()),
            ..Self::default()
        }
    }

    /// Writer on `topic_name`.
    pub fn writer(topic_name: impl Into<String>) -> Self {
        Self::reader(topic_name)
    }

    /// Reader on a builtin topic.
    pub fn builtin(topic: BuiltinTopic) -> Self {
        Self::topic(topic.topic_name(), topic.type_name())
    }

    /// Attach a diagnostic name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn topic_name(&self) -> Option<&str> {
        self.topic_name.as_deref()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }
}

pub(crate) struct EntityInner {
    pub(crate) kind: EntityKind,
    pub(crate) handle: NativeHandle,
    pub(crate) config: EntityConfig,
    pub(crate) parent: Option<Weak<EntityInner>>,
    pub(crate) children: Mutex<HashMap<NativeId, Arc<EntityInner>>>,
    pub(crate) listener: Mutex<Option<Arc<ListenerBinding>>>,
    pub(crate) gate: DispatchGate,
    pub(crate) native_delete_failures: AtomicU32,
}

impl EntityInner {
    pub(crate) fn new(
        kind: EntityKind,
        handle: NativeHandle,
        config: EntityConfig,
        parent: Option<Weak<EntityInner>>,
    ) -> Self {
        Self {
            kind,
            handle,
            config,
            parent,
            children: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            gate: DispatchGate::new(),
            native_delete_failures: AtomicU32::new(0),
        }
    }

    pub(crate) fn id(&self) -> NativeId {
        self.handle.id()
    }

    pub(crate) fn parent(&self) -> Option<Arc<EntityInner>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Drop this entity from its parent's children.
    pub(crate) fn unlink_from_parent(&self) {
        if let Some(parent) = self.parent() {
            parent.children.lock().remove(&self.id());
        }
    }

    /// Ids of this entity and every descendant.
    pub(crate) fn collect_subtree(&self, out: &mut Vec<NativeId>) {
        out.push(self.id());
        let children: Vec<Arc<EntityInner>> = self.children.lock().values().cloned().collect();
        for child in children {
            child.collect_subtree(out);
        }
    }
}

/// Handle to a binding-side entity.
///
/// Cheap to clone. Dropping every `Entity` handle does not delete anything:
/// the registry keeps the entity alive until
/// [`LifecycleCoordinator::delete`](crate::LifecycleCoordinator::delete)
/// runs its teardown.
#[derive(Clone)]
pub struct Entity {
    pub(crate) inner: Arc<EntityInner>,
}

impl Entity {
    pub(crate) fn from_inner(inner: Arc<EntityInner>) -> Self {
        Self { inner }
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    pub fn native_id(&self) -> NativeId {
        self.inner.id()
    }

    pub fn state(&self) -> EntityState {
        self.inner.gate.state()
    }

    pub fn config(&self) -> &EntityConfig {
        &self.inner.config
    }

    /// Whether the native handle has not been deleted (or abandoned) yet.
    pub fn is_native_live(&self) -> bool {
        self.inner.handle.is_live()
    }

    /// Parent entity, while it exists and is not Deleted.
    pub fn parent(&self) -> Option<Entity> {
        self.inner
            .parent()
            .filter(|parent| parent.gate.state() != EntityState::Deleted)
            .map(Entity::from_inner)
    }

    /// Current children (unordered snapshot).
    pub fn children(&self) -> Vec<Entity> {
        self.inner
            .children
            .lock()
            .values()
            .cloned()
            .map(Entity::from_inner)
            .collect()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    pub fn has_listener(&self) -> bool {
        self.inner.listener.lock().is_some()
    }

    /// Callback invocations currently running for this entity.
    pub fn in_flight(&self) -> usize {
        self.inner.gate.in_flight()
    }

    /// Non-owning handle, e.g. for checking that teardown released the entity.
    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Entity {}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind())
            .field("native_id", &self.native_id())
            .field("state", &self.state())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Non-owning entity handle.
#[derive(Clone, Debug)]
pub struct WeakEntity {
    inner: Weak<EntityInner>,
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.inner.upgrade().map(Entity::from_inner)
    }

    /// Whether the entity object has been freed.
    pub fn is_released(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listener closures and their per-entity binding.
//!
//! A [`Listener`] is the set of callbacks an application supplies. Once
//! attached, it becomes a [`ListenerBinding`] owned by exactly one entity.
//! The binding only remembers its owner's native id; it never holds the
//! entity itself. Closures are free to capture their own entity: the cycle
//! `Entity -> binding -> closure -> Entity` is broken by
//! [`ListenerBinding::detach`], which teardown always runs.
//!
//! # Thread Safety
//!
//! Callbacks run on the native runtime's threads and must be `Send + Sync`.
//! They must not delete their own entity synchronously; see
//! [`LifecycleCoordinator::delete_deferred`](crate::LifecycleCoordinator::delete_deferred).

mod status;

pub use status::{
    LivelinessChangedStatus, OfferedIncompatibleQosStatus, PublicationMatchedStatus,
    RequestedDeadlineMissedStatus, RequestedIncompatibleQosStatus, SampleLostStatus,
    SampleRejectedReason, SampleRejectedStatus, SubscriptionMatchedStatus,
};

use crate::entity::Entity;
use crate::native::NativeId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Listener callback kinds, in DDS status order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallbackKind {
    DataAvailable,
    SampleLost,
    SampleRejected,
    LivelinessChanged,
    RequestedDeadlineMissed,
    RequestedIncompatibleQos,
    SubscriptionMatched,
    PublicationMatched,
    OfferedDeadlineMissed,
    OfferedIncompatibleQos,
    LivelinessLost,
    InconsistentTopic,
}

impl CallbackKind {
    /// Every kind, in order.
    pub const ALL: [CallbackKind; 12] = [
        CallbackKind::DataAvailable,
        CallbackKind::SampleLost,
        CallbackKind::SampleRejected,
        CallbackKind::LivelinessChanged,
        CallbackKind::RequestedDeadlineMissed,
        CallbackKind::RequestedIncompatibleQos,
        CallbackKind::SubscriptionMatched,
        CallbackKind::PublicationMatched,
        CallbackKind::OfferedDeadlineMissed,
        CallbackKind::OfferedIncompatibleQos,
        CallbackKind::LivelinessLost,
        CallbackKind::InconsistentTopic,
    ];

    /// Listener method name (`on_data_available`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackKind::DataAvailable => "on_data_available",
            CallbackKind::SampleLost => "on_sample_lost",
            CallbackKind::SampleRejected => "on_sample_rejected",
            CallbackKind::LivelinessChanged => "on_liveliness_changed",
            CallbackKind::RequestedDeadlineMissed => "on_requested_deadline_missed",
            CallbackKind::RequestedIncompatibleQos => "on_requested_incompatible_qos",
            CallbackKind::SubscriptionMatched => "on_subscription_matched",
            CallbackKind::PublicationMatched => "on_publication_matched",
            CallbackKind::OfferedDeadlineMissed => "on_offered_deadline_missed",
            CallbackKind::OfferedIncompatibleQos => "on_offered_incompatible_qos",
            CallbackKind::LivelinessLost => "on_liveliness_lost",
            CallbackKind::InconsistentTopic => "on_inconsistent_topic",
        }
    }
}

impl std::fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event data handed to a callback. The variant selects the callback kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPayload {
    /// Serialized sample bytes.
    DataAvailable(Vec<u8>),
    SampleLost(SampleLostStatus),
    SampleRejected(SampleRejectedStatus),
    LivelinessChanged(LivelinessChangedStatus),
    RequestedDeadlineMissed(RequestedDeadlineMissedStatus),
    RequestedIncompatibleQos(RequestedIncompatibleQosStatus),
    SubscriptionMatched(SubscriptionMatchedStatus),
    PublicationMatched(PublicationMatchedStatus),
    /// Instance handle that missed the deadline, if any.
    OfferedDeadlineMissed(Option<u64>),
    OfferedIncompatibleQos(OfferedIncompatibleQosStatus),
    LivelinessLost,
    /// Total count of inconsistent remote topics.
    InconsistentTopic(u32),
}

impl CallbackPayload {
    pub fn kind(&self) -> CallbackKind {
        match self {
            CallbackPayload::DataAvailable(_) => CallbackKind::DataAvailable,
            CallbackPayload::SampleLost(_) => CallbackKind::SampleLost,
            CallbackPayload::SampleRejected(_) => CallbackKind::SampleRejected,
            CallbackPayload::LivelinessChanged(_) => CallbackKind::LivelinessChanged,
            CallbackPayload::RequestedDeadlineMissed(_) => CallbackKind::RequestedDeadlineMissed,
            CallbackPayload::RequestedIncompatibleQos(_) => {
                CallbackKind::RequestedIncompatibleQos
            }
            CallbackPayload::SubscriptionMatched(_) => CallbackKind::SubscriptionMatched,
            CallbackPayload::PublicationMatched(_) => CallbackKind::PublicationMatched,
            CallbackPayload::OfferedDeadlineMissed(_) => CallbackKind::OfferedDeadlineMissed,
            CallbackPayload::OfferedIncompatibleQos(_) => CallbackKind::OfferedIncompatibleQos,
            CallbackPayload::LivelinessLost => CallbackKind::LivelinessLost,
            CallbackPayload::InconsistentTopic(_) => CallbackKind::InconsistentTopic,
        }
    }
}

/// A listener callback. Receives the entity the event fired on.
pub type Callback = Arc<dyn Fn(&Entity, &CallbackPayload) + Send + Sync + 'static>;

/// Set of callbacks to attach to an entity.
///
/// # Example
///
/// ```rust
/// use hdds_entity::{CallbackKind, Listener};
///
/// let listener = Listener::new()
///     .on_data_available(|_entity, _payload| {})
///     .on_sample_lost(|_entity, _payload| {});
/// assert_eq!(
///     listener.kinds(),
///     vec![CallbackKind::DataAvailable, CallbackKind::SampleLost]
/// );
/// ```
#[derive(Clone, Default)]
pub struct Listener {
    callbacks: BTreeMap<CallbackKind, Callback>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback for `kind`, replacing any previous one.
    #[must_use]
    pub fn on<F>(mut self, kind: CallbackKind, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.callbacks.insert(kind, Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_data_available<F>(self, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.on(CallbackKind::DataAvailable, callback)
    }

    #[must_use]
    pub fn on_sample_lost<F>(self, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.on(CallbackKind::SampleLost, callback)
    }

    #[must_use]
    pub fn on_sample_rejected<F>(self, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.on(CallbackKind::SampleRejected, callback)
    }

    #[must_use]
    pub fn on_liveliness_changed<F>(self, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.on(CallbackKind::LivelinessChanged, callback)
    }

    #[must_use]
    pub fn on_subscription_matched<F>(self, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.on(CallbackKind::SubscriptionMatched, callback)
    }

    #[must_use]
    pub fn on_publication_matched<F>(self, callback: F) -> Self
    where
        F: Fn(&Entity, &CallbackPayload) + Send + Sync + 'static,
    {
        self.on(CallbackKind::PublicationMatched, callback)
    }

    /// Kinds with a callback, in order.
    pub fn kinds(&self) -> Vec<CallbackKind> {
        self.callbacks.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// A listener attached to one entity.
pub struct ListenerBinding {
    owner: NativeId,
    callbacks: Mutex<BTreeMap<CallbackKind, Callback>>,
    detached: AtomicBool,
}

impl ListenerBinding {
    pub(crate) fn new(owner: NativeId, listener: Listener) -> Self {
        Self {
            owner,
            callbacks: Mutex::new(listener.callbacks),
            detached: AtomicBool::new(false),
        }
    }

    /// Native id of the owning entity (diagnostics only).
    pub fn owner(&self) -> NativeId {
        self.owner
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub fn kinds(&self) -> Vec<CallbackKind> {
        self.callbacks.lock().keys().copied().collect()
    }

    /// Run the callback registered for the payload's kind.
    ///
    /// Returns `false` without calling anything if the binding is detached or
    /// has no callback for that kind. The callback runs without any lock held.
    pub fn invoke(&self, entity: &Entity, payload: &CallbackPayload) -> bool {
        if self.is_detached() {
            return false;
        }
        let callback = self.callbacks.lock().get(&payload.kind()).cloned();
        match callback {
            Some(callback) => {
                callback(entity, payload);
                true
            }
            None => false,
        }
    }

    /// Release every callback. Idempotent; returns `true` on the first call.
    pub fn detach(&self) -> bool {
        if self.detached.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Closures (and whatever they captured) drop outside the lock.
        let released = std::mem::take(&mut *self.callbacks.lock());
        drop(released);
        true
    }
}

impl std::fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("owner", &self.owner)
            .field("kinds", &self.kinds())
            .field("detached", &self.is_detached())
            .finish()
    }
}

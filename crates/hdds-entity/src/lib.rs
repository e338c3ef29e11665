// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HDDS Entity Lifecycle
//!
//! Entity lifecycle layer for HDDS language bindings: owns the mapping between
//! native middleware resources (participants, topics, readers, ...) and the
//! binding-side objects that represent them, and is the only path through which
//! those resources are torn down.
//!
//! ## Quick Start
//!
//! ```rust
//! use hdds_entity::{
//!     CallbackPayload, EntityConfig, EntityRegistry, LifecycleConfig, LifecycleCoordinator,
//!     Listener, SimRuntime,
//! };
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(SimRuntime::new());
//! let coordinator = LifecycleCoordinator::with_registry(
//!     runtime.clone(),
//!     Arc::new(EntityRegistry::new()),
//!     LifecycleConfig::default(),
//! );
//!
//! let participant = coordinator.create_participant(EntityConfig::participant(0))?;
//! let reader = coordinator.create_reader(&participant, EntityConfig::reader("sensors"))?;
//! coordinator.attach_listener(&reader, Listener::new().on_data_available(|_r, _p| {}))?;
//!
//! // Runtime threads deliver callbacks by native id.
//! coordinator
//!     .dispatcher()
//!     .dispatch(reader.native_id(), CallbackPayload::DataAvailable(vec![1, 2, 3]));
//!
//! // Children first, then the participant itself.
//! coordinator.delete(&participant)?;
//! assert_eq!(runtime.live_count(), 0);
//! # Ok::<(), hdds_entity::Error>(())
//! ```
//!
//! ## Ownership
//!
//! ```text
//! EntityRegistry ==strong==> Entity (every live entity, keyed by NativeId)
//! Entity         ==strong==> child Entity
//! Entity         ==strong==> ListenerBinding ==strong==> user closures
//! child Entity   --weak----> parent Entity
//! ListenerBinding --id-----> owning Entity (diagnostics only)
//! ```
//!
//! Nothing is torn down by dropping the last user handle. Entities are released
//! only by [`LifecycleCoordinator::delete`], which detaches the listener
//! (breaking any closure that captured its own entity), unregisters the entity
//! and deletes the native handle after every child is gone.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`LifecycleCoordinator`] | Creates entities, dispatches callbacks, runs teardown |
//! | [`Entity`] | Binding-side owner of one native resource |
//! | [`EntityRegistry`] | `NativeId` to owning entity table |
//! | [`Listener`] / [`ListenerBinding`] | Callback closures attached to one entity |
//! | [`NativeRuntime`] | Contract of the native middleware (create/delete/status) |
//! | [`SimRuntime`] | In-process runtime used by tests and demos |
//!
//! ## Caller contract
//!
//! Never delete an entity synchronously from one of its own callbacks (or a
//! callback of one of its descendants). Such a call fails with
//! [`Error::ReentrantDelete`]; use [`LifecycleCoordinator::delete_deferred`]
//! and drain the queue with [`LifecycleCoordinator::run_deferred`] instead.

/// Lifecycle configuration (timeouts, retry limits, YAML/env loaders).
pub mod config;
/// Teardown orchestration and callback dispatch.
pub mod coordinator;
/// Entity tree (kinds, states, parent/child links).
pub mod entity;
/// Lifecycle events and the observer hook.
pub mod events;
/// Listener closures and their per-entity binding.
pub mod listener;
/// `env_logger` initialisation helpers.
pub mod logging;
/// Native runtime contract, handles and the in-process simulator.
pub mod native;
/// Process-wide native id to entity table.
pub mod registry;

pub use config::LifecycleConfig;
pub use coordinator::{
    DeferredReport, DispatchOutcome, Dispatcher, LifecycleCoordinator, LifecycleStats,
    ShutdownReport,
};
pub use entity::{BuiltinTopic, Entity, EntityConfig, EntityKind, EntityState, WeakEntity};
pub use events::{DropReason, LifecycleEvent};
pub use listener::{
    CallbackKind, CallbackPayload, Listener, ListenerBinding, LivelinessChangedStatus,
    OfferedIncompatibleQosStatus, PublicationMatchedStatus, RequestedDeadlineMissedStatus,
    RequestedIncompatibleQosStatus, SampleLostStatus, SampleRejectedReason, SampleRejectedStatus,
    SubscriptionMatchedStatus,
};
pub use native::{NativeError, NativeHandle, NativeId, NativeRuntime, ReturnCode, SimRuntime};
pub use registry::EntityRegistry;

/// Errors returned by entity lifecycle operations.
///
/// Dropped callbacks are not errors: they are reported through
/// [`LifecycleEvent::DroppedCallback`].
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Creation Errors
    // ========================================================================
    /// The native runtime rejected the create request (bad parameters, shutdown).
    NativeCreateFailed(NativeError),
    /// The requested kind cannot be created under this parent.
    InvalidParent {
        /// Kind of the would-be parent (`None` for a root entity).
        parent: Option<EntityKind>,
        /// Kind that was requested.
        child: EntityKind,
    },
    /// The runtime handed out an id that is still owned by a live entity.
    AlreadyRegistered(NativeId),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The entity (or the parent it was used with) is no longer Active.
    AlreadyDeleted(NativeId),
    /// Teardown did not complete before the caller's deadline; the entity stays
    /// Detaching and `delete` can be retried.
    TeardownTimeout {
        /// Entity whose teardown timed out.
        id: NativeId,
        /// Callback invocations still running when the deadline passed.
        in_flight: usize,
    },
    /// `delete` was called from inside a callback of the entity or a descendant.
    ReentrantDelete(NativeId),
    /// The deferred deletion queue is full.
    DeferredQueueFull(NativeId),
    /// The native runtime refused to delete the handle; retriable.
    NativeDeleteFailed {
        /// Entity whose handle could not be deleted.
        id: NativeId,
        /// Failed attempts so far.
        attempts: u32,
        /// Runtime error of the last attempt.
        source: NativeError,
    },
    /// Native delete kept failing; the handle was abandoned (leaked) and the
    /// entity marked Deleted.
    NativeDeleteFatal {
        /// Entity whose handle was abandoned.
        id: NativeId,
        /// Failed attempts before giving up.
        attempts: u32,
        /// Runtime error of the last attempt.
        source: NativeError,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration value.
    Config(String),
    /// Configuration file not found at specified path.
    ConfigFileNotFound(String),
    /// A global logger was already installed.
    LoggerAlreadyInitialized,
    /// I/O error with underlying cause.
    IoError(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NativeCreateFailed(e) => write!(f, "Native create failed: {}", e),
            Error::InvalidParent {
                parent: Some(parent),
                child,
            } => write!(f, "A {} cannot be created under a {}", child, parent),
            Error::InvalidParent {
                parent: None,
                child,
            } => write!(f, "A {} cannot be created without a parent", child),
            Error::AlreadyRegistered(id) => {
                write!(f, "Native id {} is already owned by a live entity", id)
            }
            Error::AlreadyDeleted(id) => write!(f, "Entity {} is already deleted", id),
            Error::TeardownTimeout { id, in_flight } => write!(
                f,
                "Teardown of entity {} timed out ({} callbacks in flight)",
                id, in_flight
            ),
            Error::ReentrantDelete(id) => write!(
                f,
                "Entity {} cannot be deleted from its own callback (use delete_deferred)",
                id
            ),
            Error::DeferredQueueFull(id) => {
                write!(f, "Deferred delete queue full, entity {} not queued", id)
            }
            Error::NativeDeleteFailed {
                id,
                attempts,
                source,
            } => write!(
                f,
                "Native delete of entity {} failed (attempt {}): {}",
                id, attempts, source
            ),
            Error::NativeDeleteFatal {
                id,
                attempts,
                source,
            } => write!(
                f,
                "Native delete of entity {} abandoned after {} attempts: {}",
                id, attempts, source
            ),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::ConfigFileNotFound(path) => write!(f, "Config file not found: {}", path),
            Error::LoggerAlreadyInitialized => write!(f, "Logger already initialized"),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NativeCreateFailed(e)
            | Error::NativeDeleteFailed { source: e, .. }
            | Error::NativeDeleteFatal { source: e, .. } => Some(e),
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Convenient alias for lifecycle results using the crate `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

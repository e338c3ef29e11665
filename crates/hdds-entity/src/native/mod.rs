// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Native runtime contract.
//!
//! The middleware runtime is opaque to this crate. It exposes three operations:
//!
//! ```text
//! create(kind, parent_id, config) -> native_id | error
//! delete(native_id)               -> ok | error   (at most once per id)
//! is_live(native_id)              -> bool
//! ```
//!
//! and calls back into the binding from its own threads through a
//! [`Dispatcher`](crate::Dispatcher). [`NativeHandle`] wraps one id and makes
//! deletion idempotent regardless of how often teardown is retried.

mod handle;
mod sim;

pub use handle::NativeHandle;
pub use sim::SimRuntime;

use crate::entity::{EntityConfig, EntityKind};

/// Identifier the native runtime assigns to a resource. `0` is never issued.
pub type NativeId = u64;

/// DDS return codes reported by the native runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Generic, unspecified failure.
    Error,
    /// Illegal parameter value.
    BadParameter,
    /// A precondition for the operation was not met (e.g. entity still has children).
    PreconditionNotMet,
    /// The runtime ran out of resources.
    OutOfResources,
    /// The referenced resource was already deleted.
    AlreadyDeleted,
    /// The operation timed out inside the runtime.
    Timeout,
    /// Operation not supported by this runtime.
    Unsupported,
}

impl ReturnCode {
    /// Canonical DDS name (`DDS_RETCODE_*` suffix).
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnCode::Error => "ERROR",
            ReturnCode::BadParameter => "BAD_PARAMETER",
            ReturnCode::PreconditionNotMet => "PRECONDITION_NOT_MET",
            ReturnCode::OutOfResources => "OUT_OF_RESOURCES",
            ReturnCode::AlreadyDeleted => "ALREADY_DELETED",
            ReturnCode::Timeout => "TIMEOUT",
            ReturnCode::Unsupported => "UNSUPPORTED",
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the native runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// DDS return code.
    pub code: ReturnCode,
    /// Human-readable reason from the runtime.
    pub reason: String,
}

impl NativeError {
    /// Build an error from a return code and a reason.
    pub fn new(code: ReturnCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

impl std::error::Error for NativeError {}

/// Operations the binding needs from the native middleware.
///
/// Implementations are called from application threads, possibly
/// concurrently. `delete` may block (the runtime may wait on its own
/// internal state); the coordinator never holds a lock shared with the
/// dispatch path while calling it.
pub trait NativeRuntime: Send + Sync {
    /// Create a native resource of `kind` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the runtime rejects the parameters or is shutting down.
    fn create(
        &self,
        kind: EntityKind,
        parent: Option<NativeId>,
        config: &EntityConfig,
    ) -> Result<NativeId, NativeError>;

    /// Delete a native resource. Called at most once successfully per id.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the runtime refuses (e.g. the resource is still referenced).
    fn delete(&self, id: NativeId) -> Result<(), NativeError>;

    /// Whether the runtime still holds the resource.
    fn is_live(&self, id: NativeId) -> bool;
}

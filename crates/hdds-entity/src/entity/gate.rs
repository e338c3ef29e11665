// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-entity dispatch gate.
//!
//! Lifecycle state and the in-flight callback count live under one mutex,
//! so "is the entity Active?" and "count this invocation" happen as one
//! step. Teardown flips the state first, which stops new entries, then
//! waits on the condvar for the count to drain.

use super::EntityState;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

#[derive(Debug)]
struct GateState {
    state: EntityState,
    in_flight: usize,
    /// A thread currently owns the Detaching -> Deleted sequence.
    teardown_owned: bool,
}

/// Outcome of [`DispatchGate::begin_teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownStart {
    /// Caller owns the teardown and must finish or abort it.
    Owner,
    /// Another thread completed the teardown while the caller waited.
    CompletedElsewhere,
}

/// Why [`DispatchGate::begin_teardown`] refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownRefused {
    AlreadyDeleted,
    TimedOut { in_flight: usize },
}

#[derive(Debug)]
pub(crate) struct DispatchGate {
    inner: Mutex<GateState>,
    changed: Condvar,
}

impl DispatchGate {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(GateState {
                state: EntityState::Active,
                in_flight: 0,
                teardown_owned: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> EntityState {
        self.inner.lock().state
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == EntityState::Active
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Count one callback invocation, unless the entity left Active.
    pub(crate) fn try_enter(&self) -> Result<InFlightGuard<'_>, EntityState> {
        let mut inner = self.inner.lock();
        if inner.state != EntityState::Active {
            return Err(inner.state);
        }
        inner.in_flight += 1;
        Ok(InFlightGuard { gate: self })
    }

    fn exit(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight -= 1;
        if inner.in_flight == 0 {
            self.changed.notify_all();
        }
    }

    /// Move to Detaching and take ownership of the teardown.
    ///
    /// If another thread owns it, wait until it finishes (converge) or
    /// aborts (take over), bounded by `deadline`.
    pub(crate) fn begin_teardown(
        &self,
        deadline: Instant,
    ) -> Result<TeardownStart, TeardownRefused> {
        let mut inner = self.inner.lock();
        let mut waited = false;
        loop {
            match inner.state {
                EntityState::Deleted if waited => return Ok(TeardownStart::CompletedElsewhere),
                EntityState::Deleted => return Err(TeardownRefused::AlreadyDeleted),
                EntityState::Active => {
                    inner.state = EntityState::Detaching;
                    inner.teardown_owned = true;
                    return Ok(TeardownStart::Owner);
                }
                EntityState::Detaching if !inner.teardown_owned => {
                    inner.teardown_owned = true;
                    return Ok(TeardownStart::Owner);
                }
                EntityState::Detaching => {
                    waited = true;
                    if self.changed.wait_until(&mut inner, deadline).timed_out()
                        && inner.teardown_owned
                        && inner.state == EntityState::Detaching
                    {
                        return Err(TeardownRefused::TimedOut {
                            in_flight: inner.in_flight,
                        });
                    }
                }
            }
        }
    }

    /// Block until no invocation is in flight. Returns the remaining count on timeout.
    pub(crate) fn wait_idle(&self, deadline: Instant) -> Result<(), usize> {
        let mut inner = self.inner.lock();
        debug_assert_ne!(inner.state, EntityState::Active);
        while inner.in_flight > 0 {
            if self.changed.wait_until(&mut inner, deadline).timed_out() && inner.in_flight > 0 {
                return Err(inner.in_flight);
            }
        }
        Ok(())
    }

    /// Give up ownership, leaving the entity Detaching for a later retry.
    pub(crate) fn abort_teardown(&self) {
        let mut inner = self.inner.lock();
        inner.teardown_owned = false;
        self.changed.notify_all();
    }

    pub(crate) fn finish_teardown(&self) {
        let mut inner = self.inner.lock();
        inner.state = EntityState::Deleted;
        inner.teardown_owned = false;
        self.changed.notify_all();
    }
}

/// Decrements the in-flight count on drop, including during unwinding.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    gate: &'a DispatchGate,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gate.exit();
    }
}

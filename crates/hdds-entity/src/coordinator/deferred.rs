// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deferred deletes.
//!
//! A callback cannot delete its own entity synchronously (it would wait on
//! its own in-flight count). It queues the request instead, and the
//! application drains the queue from a thread outside any callback.

use super::Shared;
use crate::entity::{Entity, EntityState};
use crate::native::NativeId;
use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

/// Outcome of [`LifecycleCoordinator::run_deferred`](super::LifecycleCoordinator::run_deferred).
#[derive(Debug, Default)]
pub struct DeferredReport {
    /// Entities now Deleted (including ones deleted by another path meanwhile).
    pub completed: Vec<NativeId>,
    /// Still reentrant on the draining thread; queued again.
    pub requeued: Vec<NativeId>,
    pub failed: Vec<(NativeId, Error)>,
}

impl DeferredReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.requeued.is_empty() && self.failed.is_empty()
    }
}

pub(super) struct DeferredQueue {
    tx: Sender<Entity>,
    rx: Receiver<Entity>,
}

impl DeferredQueue {
    pub(super) fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub(super) fn push(&self, entity: &Entity) -> Result<()> {
        let id = entity.native_id();
        if entity.state() == EntityState::Deleted {
            return Err(Error::AlreadyDeleted(id));
        }
        match self.tx.try_send(entity.clone()) {
            Ok(()) => {
                log::debug!("[deferred] queued delete of {}", id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("[deferred] queue full, delete of {} rejected", id);
                Err(Error::DeferredQueueFull(id))
            }
            // Both ends live in the queue itself.
            Err(TrySendError::Disconnected(_)) => Err(Error::DeferredQueueFull(id)),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.rx.len()
    }
}

impl Shared {
    pub(super) fn run_deferred(&self) -> DeferredReport {
        let mut report = DeferredReport::default();
        // Bounded by the current length so requeued requests are not retried forever.
        let pending = self.deferred.len();
        for _ in 0..pending {
            let Ok(entity) = self.deferred.rx.try_recv() else {
                break;
            };
            let id = entity.native_id();
            let deadline = super::deadline_after(self.config.teardown_timeout);
            match self.delete_checked(&entity.inner, deadline) {
                Ok(()) | Err(Error::AlreadyDeleted(_)) => report.completed.push(id),
                Err(Error::ReentrantDelete(_)) => match self.deferred.push(&entity) {
                    Ok(()) => report.requeued.push(id),
                    Err(err) => report.failed.push((id, err)),
                },
                Err(err) => report.failed.push((id, err)),
            }
        }
        if !report.is_empty() {
            log::debug!(
                "[deferred] drained: {} completed, {} requeued, {} failed",
                report.completed.len(),
                report.requeued.len(),
                report.failed.len()
            );
        }
        report
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::too_many_lines)] // Example/test code

//! Callbacks racing teardown: in-flight draining, timeouts, reentrancy.

use crossbeam::channel;
use hdds_entity::{
    CallbackPayload, DispatchOutcome, DropReason, Entity, EntityConfig, EntityRegistry,
    EntityState, Error, LifecycleConfig, LifecycleCoordinator, LifecycleEvent, Listener,
    SimRuntime,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn setup() -> (Arc<SimRuntime>, LifecycleCoordinator) {
    let sim = Arc::new(SimRuntime::new());
    let coordinator = LifecycleCoordinator::with_registry(
        sim.clone(),
        Arc::new(EntityRegistry::new()),
        LifecycleConfig::default(),
    );
    (sim, coordinator)
}

fn participant_with_reader(coordinator: &LifecycleCoordinator) -> (Entity, Entity) {
    let participant = coordinator
        .create_participant(EntityConfig::participant(0))
        .expect("participant");
    let reader = coordinator
        .create_reader(&participant, EntityConfig::reader("telemetry"))
        .expect("reader");
    (participant, reader)
}

fn sample() -> CallbackPayload {
    CallbackPayload::DataAvailable(vec![0xAB; 16])
}

#[test]
fn in_flight_callback_completes_before_native_delete() {
    let (sim, coordinator) = setup();
    let (participant, reader) = participant_with_reader(&coordinator);
    let reader_id = reader.native_id();

    let (started_tx, started_rx) = channel::bounded::<()>(1);
    let finished = Arc::new(AtomicBool::new(false));
    let native_live_at_end = Arc::new(AtomicBool::new(false));
    {
        let finished = finished.clone();
        let native_live_at_end = native_live_at_end.clone();
        let sim = sim.clone();
        coordinator
            .attach_listener(
                &reader,
                Listener::new().on_data_available(move |entity, _| {
                    let _ = started_tx.try_send(());
                    thread::sleep(Duration::from_millis(100));
                    native_live_at_end.store(sim.is_live(entity.native_id()), Ordering::SeqCst);
                    finished.store(true, Ordering::SeqCst);
                }),
            )
            .expect("attach");
    }

    let dispatcher = coordinator.dispatcher();
    let runtime_thread = thread::spawn(move || dispatcher.dispatch(reader_id, sample()));

    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback started");
    coordinator.delete(&participant).expect("delete waits for the callback");

    assert!(finished.load(Ordering::SeqCst), "delete returned mid-callback");
    assert!(
        native_live_at_end.load(Ordering::SeqCst),
        "native reader deleted while its callback was running"
    );
    assert!(!sim.is_live(reader_id));
    assert_eq!(
        runtime_thread.join().expect("runtime thread panicked"),
        DispatchOutcome::Delivered
    );
}

#[test]
fn no_callback_runs_after_delete_returns() {
    let (_sim, coordinator) = setup();
    let (participant, reader) = participant_with_reader(&coordinator);
    let reader_id = reader.native_id();

    let invocations = Arc::new(AtomicUsize::new(0));
    {
        let invocations = invocations.clone();
        coordinator
            .attach_listener(
                &reader,
                Listener::new().on_data_available(move |_, _| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("attach");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let runtime_threads: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = coordinator.dispatcher();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut dropped = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    if let DispatchOutcome::Dropped(_) = dispatcher.dispatch(reader_id, sample()) {
                        dropped += 1;
                    }
                }
                dropped
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    coordinator.delete(&participant).expect("delete");
    let after_delete = invocations.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::Relaxed);

    let dropped: usize = runtime_threads
        .into_iter()
        .map(|t| t.join().expect("runtime thread panicked"))
        .sum();
    assert_eq!(invocations.load(Ordering::SeqCst), after_delete);
    assert!(dropped > 0, "callbacks kept arriving after teardown");
    assert!(coordinator.stats().dropped_callbacks >= dropped as u64);
}

#[test]
fn teardown_timeout_leaves_entity_detaching_then_retry_succeeds() {
    let (sim, coordinator) = setup();
    let (participant, reader) = participant_with_reader(&coordinator);
    let reader_id = reader.native_id();

    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = events.clone();
        coordinator.set_event_hook(move |event| events.lock().push(event.clone()));
    }

    let (started_tx, started_rx) = channel::bounded::<()>(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);
    coordinator
        .attach_listener(
            &reader,
            Listener::new().on_data_available(move |_, _| {
                let _ = started_tx.try_send(());
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            }),
        )
        .expect("attach");

    let dispatcher = coordinator.dispatcher();
    let blocked = thread::spawn(move || dispatcher.dispatch(reader_id, sample()));
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback started");

    let err = coordinator
        .delete_with_timeout(&reader, Duration::from_millis(50))
        .expect_err("callback still running");
    assert!(matches!(
        err,
        Error::TeardownTimeout { id, in_flight: 1 } if id == reader_id
    ));
    assert_eq!(reader.state(), EntityState::Detaching);
    assert!(sim.is_live(reader_id), "native handle untouched on timeout");
    assert!(coordinator.registry().contains(reader_id));

    // Still registered, but no longer Active.
    assert_eq!(
        coordinator.dispatcher().dispatch(reader_id, sample()),
        DispatchOutcome::Dropped(DropReason::NotActive(EntityState::Detaching))
    );
    assert!(matches!(
        coordinator.attach_listener(&reader, Listener::new()),
        Err(Error::AlreadyDeleted(_))
    ));

    release_tx.send(()).expect("release callback");
    assert_eq!(
        blocked.join().expect("runtime thread panicked"),
        DispatchOutcome::Delivered
    );

    coordinator.delete(&reader).expect("retry succeeds");
    assert_eq!(reader.state(), EntityState::Deleted);
    coordinator.delete(&participant).expect("delete participant");
    assert_eq!(sim.live_count(), 0);

    let events = events.lock();
    assert!(events.contains(&LifecycleEvent::TeardownTimedOut {
        id: reader_id,
        in_flight: 1
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        LifecycleEvent::DroppedCallback {
            reason: DropReason::NotActive(EntityState::Detaching),
            ..
        }
    )));
}

#[test]
fn parent_delete_times_out_on_a_busy_child() {
    let (sim, coordinator) = setup();
    let (participant, reader) = participant_with_reader(&coordinator);
    let reader_id = reader.native_id();

    let (started_tx, started_rx) = channel::bounded::<()>(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);
    coordinator
        .attach_listener(
            &reader,
            Listener::new().on_data_available(move |_, _| {
                let _ = started_tx.try_send(());
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            }),
        )
        .expect("attach");

    let dispatcher = coordinator.dispatcher();
    let blocked = thread::spawn(move || dispatcher.dispatch(reader_id, sample()));
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback started");

    let err = coordinator
        .delete_with_timeout(&participant, Duration::from_millis(50))
        .expect_err("child busy");
    assert!(matches!(err, Error::TeardownTimeout { id, .. } if id == reader_id));
    assert_eq!(participant.state(), EntityState::Detaching);
    assert!(sim.is_live(participant.native_id()));
    assert_eq!(participant.child_count(), 1, "tree intact after abort");

    release_tx.send(()).expect("release callback");
    blocked.join().expect("runtime thread panicked");

    coordinator.delete(&participant).expect("retry succeeds");
    assert_eq!(sim.live_count(), 0);
    assert_eq!(sim.order_violation_count(), 0);
}

#[test]
fn callback_deleting_its_parent_is_refused_and_deferred() {
    let (sim, coordinator) = setup();
    let (participant, reader) = participant_with_reader(&coordinator);
    let reader_id = reader.native_id();

    let outcome = Arc::new(Mutex::new(Vec::new()));
    {
        let outcome = outcome.clone();
        let coordinator_in_callback = coordinator.clone();
        let parent = participant.clone();
        coordinator
            .attach_listener(
                &reader,
                Listener::new().on_data_available(move |_, _| {
                    let sync = coordinator_in_callback.delete(&parent);
                    outcome
                        .lock()
                        .push(matches!(sync, Err(Error::ReentrantDelete(_))));
                    coordinator_in_callback
                        .delete_deferred(&parent)
                        .expect("deferred delete is allowed in callbacks");
                }),
            )
            .expect("attach");
    }

    let dispatcher = coordinator.dispatcher();
    thread::spawn(move || dispatcher.dispatch(reader_id, sample()))
        .join()
        .expect("runtime thread panicked");

    assert_eq!(*outcome.lock(), vec![true]);
    assert_eq!(participant.state(), EntityState::Active);

    let report = coordinator.run_deferred();
    assert_eq!(report.completed, vec![participant.native_id()]);
    assert!(report.failed.is_empty());
    assert_eq!(reader.state(), EntityState::Deleted);
    assert_eq!(sim.live_count(), 0);
}

#[test]
fn panicking_callback_does_not_block_teardown() {
    let (sim, coordinator) = setup();
    let (participant, reader) = participant_with_reader(&coordinator);
    let reader_id = reader.native_id();
    coordinator
        .attach_listener(
            &reader,
            Listener::new().on_data_available(|_, payload| {
                if let CallbackPayload::DataAvailable(bytes) = payload {
                    assert!(bytes.is_empty(), "unexpected sample");
                }
            }),
        )
        .expect("attach");

    let dispatcher = coordinator.dispatcher();
    let outcomes: Vec<_> = thread::spawn(move || {
        (0..10)
            .map(|_| dispatcher.dispatch(reader_id, sample()))
            .collect()
    })
    .join()
    .expect("panics never cross the dispatch boundary");

    assert!(outcomes.iter().all(|o| *o == DispatchOutcome::Panicked));
    assert_eq!(reader.in_flight(), 0);
    assert_eq!(coordinator.stats().callback_panics, 10);

    coordinator
        .delete_with_timeout(&participant, Duration::from_millis(200))
        .expect("nothing left in flight");
    assert_eq!(sim.live_count(), 0);
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Create/delete churn: nothing may leak, double-free, or outlive teardown.

use hdds_entity::{
    BuiltinTopic, CallbackPayload, EntityConfig, EntityRegistry, EntityState, Error,
    LifecycleConfig, LifecycleCoordinator, Listener, SimRuntime, WeakEntity,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const ITERATIONS: usize = 10_000;

fn setup() -> (Arc<SimRuntime>, LifecycleCoordinator) {
    let sim = Arc::new(SimRuntime::new());
    let coordinator = LifecycleCoordinator::with_registry(
        sim.clone(),
        Arc::new(EntityRegistry::new()),
        LifecycleConfig::default(),
    );
    (sim, coordinator)
}

#[test]
fn churn_with_self_capturing_listeners() {
    let (sim, coordinator) = setup();
    let dispatcher = coordinator.dispatcher();
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let mut released: Vec<WeakEntity> = Vec::with_capacity(ITERATIONS * 3);

    for i in 0..ITERATIONS {
        let participant = coordinator
            .create_participant(EntityConfig::participant(rng.u32(0..=232)))
            .expect("participant");
        let topic_name = format!("stress_{}", i % 7);
        let topic = coordinator
            .create_topic(&participant, EntityConfig::topic(topic_name.clone(), "Sample"))
            .expect("topic");
        let reader = coordinator
            .create_reader(&participant, EntityConfig::reader(topic_name))
            .expect("reader");

        // The closure owns its reader and the coordinator: a reference cycle
        // only teardown can break.
        let own_reader = reader.clone();
        let own_coordinator = coordinator.clone();
        coordinator
            .attach_listener(
                &reader,
                Listener::new().on_data_available(move |entity, _| {
                    assert_eq!(entity, &own_reader);
                    assert!(own_coordinator.registry().contains(entity.native_id()));
                }),
            )
            .expect("attach");

        if rng.bool() {
            dispatcher.dispatch(reader.native_id(), CallbackPayload::DataAvailable(vec![1]));
        }

        match rng.u8(0..3) {
            0 => coordinator.delete(&participant).expect("delete participant"),
            1 => {
                coordinator.delete(&reader).expect("delete reader");
                coordinator.delete(&participant).expect("delete participant");
            }
            _ => {
                coordinator.delete(&topic).expect("delete topic");
                coordinator.delete(&reader).expect("delete reader");
                coordinator.delete(&participant).expect("delete participant");
            }
        }

        for entity in [&participant, &topic, &reader] {
            assert_eq!(entity.state(), EntityState::Deleted);
            released.push(entity.downgrade());
        }
    }

    assert!(coordinator.registry().is_empty());
    assert_eq!(sim.live_count(), 0);
    assert_eq!(sim.double_delete_count(), 0);
    assert_eq!(sim.order_violation_count(), 0);
    assert_eq!(sim.deleted_count(), (ITERATIONS * 3) as u64);
    assert!(released.iter().all(WeakEntity::is_released));
}

#[test]
fn builtin_readers_created_and_destroyed_repeatedly() {
    let (sim, coordinator) = setup();
    let builtins = [
        BuiltinTopic::DcpsParticipant,
        BuiltinTopic::DcpsTopic,
        BuiltinTopic::DcpsPublication,
        BuiltinTopic::DcpsSubscription,
    ];

    for _ in 0..500 {
        let participant = coordinator
            .create_participant(EntityConfig::participant(0))
            .expect("participant");
        for topic in builtins {
            let reader = coordinator
                .create_builtin_reader(&participant, topic)
                .expect("builtin reader");
            assert_eq!(reader.config().topic_name(), Some(topic.topic_name()));
            coordinator
                .attach_listener(&reader, Listener::new().on_data_available(|_, _| {}))
                .expect("attach");
        }
        coordinator.delete(&participant).expect("delete");
    }

    assert!(coordinator.registry().is_empty());
    assert_eq!(sim.live_count(), 0);
    assert_eq!(sim.double_delete_count(), 0);
}

#[test]
fn parallel_churn_with_concurrent_dispatch() {
    let (sim, coordinator) = setup();
    let stop = Arc::new(AtomicBool::new(false));

    let dispatch_thread = {
        let dispatcher = coordinator.dispatcher();
        let registry = coordinator.registry().clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut rng = fastrand::Rng::with_seed(7);
            while !stop.load(Ordering::Relaxed) {
                let ids = registry.ids();
                if ids.is_empty() {
                    thread::yield_now();
                    continue;
                }
                let id = ids[rng.usize(..ids.len())];
                dispatcher.dispatch(id, CallbackPayload::DataAvailable(Vec::new()));
            }
        })
    };

    let workers: Vec<_> = (0..4u64)
        .map(|seed| {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                let mut rng = fastrand::Rng::with_seed(seed);
                for _ in 0..1_000 {
                    let participant = coordinator
                        .create_participant(EntityConfig::participant(seed as u32))
                        .expect("participant");
                    let subscriber = coordinator
                        .create_subscriber(&participant, EntityConfig::default())
                        .expect("subscriber");
                    let reader = coordinator
                        .create_reader(&subscriber, EntityConfig::reader("churn"))
                        .expect("reader");
                    let own = reader.clone();
                    coordinator
                        .attach_listener(
                            &reader,
                            Listener::new().on_data_available(move |entity, _| {
                                assert_eq!(entity, &own);
                            }),
                        )
                        .expect("attach");
                    if rng.bool() {
                        match coordinator.delete(&reader) {
                            Ok(()) | Err(Error::AlreadyDeleted(_)) => {}
                            Err(err) => panic!("reader delete failed: {}", err),
                        }
                    }
                    coordinator.delete(&participant).expect("delete participant");
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }
    stop.store(true, Ordering::Relaxed);
    dispatch_thread.join().expect("dispatch thread panicked");

    assert!(coordinator.registry().is_empty());
    assert_eq!(sim.live_count(), 0);
    assert_eq!(sim.double_delete_count(), 0);
    assert_eq!(sim.order_violation_count(), 0);
    assert_eq!(coordinator.stats().callback_panics, 0);
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Process-wide registry. Kept to a single test: the registry is shared by
//! every coordinator in this binary.

use hdds_entity::{
    CallbackPayload, DispatchOutcome, EntityConfig, EntityRegistry, LifecycleConfig,
    LifecycleCoordinator, LifecycleEvent, SimRuntime,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn coordinators_share_the_global_registry_until_shutdown() {
    let _ = env_logger::builder().is_test(true).try_init();

    let sim_a = Arc::new(SimRuntime::new());
    let sim_b = Arc::new(SimRuntime::new());
    let config = LifecycleConfig::default().with_teardown_timeout(Duration::from_secs(1));
    let a = LifecycleCoordinator::new(sim_a.clone(), config.clone());
    let b = LifecycleCoordinator::new(sim_b.clone(), config);
    assert!(Arc::ptr_eq(a.registry(), &EntityRegistry::global()));
    assert!(Arc::ptr_eq(a.registry(), b.registry()));

    // Sim ids are allocated per runtime, so only `a` creates entities here.
    let participant = a
        .create_participant(EntityConfig::participant(1))
        .expect("participant");
    let writer = a
        .create_writer(&participant, EntityConfig::writer("status"))
        .expect("writer");
    assert!(b.lookup(writer.native_id()).is_some());

    assert_eq!(
        b.dispatcher()
            .dispatch(writer.native_id(), CallbackPayload::LivelinessLost),
        DispatchOutcome::NoListener
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = events.clone();
        a.set_event_hook(move |event| events.lock().push(event.clone()));
    }
    let report = a.shutdown(Duration::from_secs(1));
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.deleted_roots, 1);
    assert!(EntityRegistry::global().is_empty());
    assert_eq!(sim_a.live_count(), 0);
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, LifecycleEvent::Deleted { id, .. } if *id == writer.native_id())));
    assert_eq!(sim_b.created_count(), 0);
}

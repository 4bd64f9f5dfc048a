/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The engine lifecycle state machine, end to end.
//!
//! The context is process-global, so this suite is a single test walking
//! the whole `UNINITIALIZED -> INITIALIZED -> TERMINATED` arc in order.
//! It must not share a process with the other suites.

mod common;

use std::sync::atomic::Ordering;

use display_mirror::{ClientContext, EngineConfig, EngineContext, FrameId, MirrorError, SessionOptions};

use common::MockEngine;

#[test]
fn lifecycle_enforces_ordering_and_terminates_for_good() {
    // Nothing exists before initialization.
    assert!(matches!(
        EngineContext::instance(),
        Err(MirrorError::NotInitialized)
    ));

    // A backend that fails to start leaves the state machine untouched.
    assert!(matches!(
        EngineContext::initialize(
            EngineConfig::default(),
            Box::new(MockEngine::failing("no display"))
        ),
        Err(MirrorError::InitFailed(_))
    ));
    assert!(matches!(
        EngineContext::instance(),
        Err(MirrorError::NotInitialized)
    ));

    let (backend, state) = MockEngine::new();
    let engine =
        EngineContext::initialize(EngineConfig::default(), Box::new(backend)).expect("init");
    assert!(state.started.load(Ordering::SeqCst));

    // One engine per process.
    let (second, _) = MockEngine::new();
    assert!(matches!(
        EngineContext::initialize(EngineConfig::default(), Box::new(second)),
        Err(MirrorError::AlreadyInitialized)
    ));
    assert!(EngineContext::instance().is_ok());

    let session = engine
        .create_session(
            SessionOptions::new(common::test_url("lifecycle")),
            ClientContext::new(),
        )
        .expect("session");

    // Shutdown refuses while a session is still alive.
    assert!(matches!(
        engine.shutdown(),
        Err(MirrorError::ShutdownOrdering(1))
    ));
    assert!(!state.stopped.load(Ordering::SeqCst));

    session.close();
    engine.shutdown().expect("ordered shutdown");
    assert!(state.stopped.load(Ordering::SeqCst));

    // TERMINATED is terminal: no second shutdown, no re-init, no access.
    assert!(matches!(engine.shutdown(), Err(MirrorError::Terminated)));
    assert!(matches!(
        EngineContext::instance(),
        Err(MirrorError::Terminated)
    ));
    let (third, _) = MockEngine::new();
    assert!(matches!(
        EngineContext::initialize(EngineConfig::default(), Box::new(third)),
        Err(MirrorError::Terminated)
    ));
    assert!(matches!(
        engine.create_session(
            SessionOptions::new(common::test_url("lifecycle/late")),
            ClientContext::new()
        ),
        Err(MirrorError::Terminated)
    ));

    // No backend callback lands after termination: the closed session's
    // event pump drops everything.
    let handle = state.last_browser();
    handle
        .events
        .on_load_end(FrameId::MAIN, &common::test_url("lifecycle/after"), 200);
    assert_eq!(session.current_url(), None);
}

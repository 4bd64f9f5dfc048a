/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Process-wide engine context.
//!
//! One engine per process, with an explicit guarded state machine:
//! `UNINITIALIZED → INITIALIZED → TERMINATED`, where `TERMINATED` is
//! terminal. Every accessor fails loudly on misuse instead of silently
//! materializing a global. Shutdown ordering is structural: the context
//! refuses to terminate while any session it owns is still alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::info;

use crate::backend::EngineBackend;
use crate::client::ClientContext;
use crate::session::{self, BrowserSession, SessionInner};
use crate::types::{EngineConfig, MirrorError, SessionId, SessionOptions};

enum Lifecycle {
    Uninitialized,
    Initialized(Arc<EngineInner>),
    Terminated,
}

static LIFECYCLE: Mutex<Lifecycle> = Mutex::new(Lifecycle::Uninitialized);

pub(crate) struct EngineInner {
    pub(crate) backend: Box<dyn EngineBackend>,
    sessions: Mutex<HashMap<SessionId, Weak<SessionInner>>>,
    next_session_id: AtomicU64,
}

impl EngineInner {
    pub(crate) fn allocate_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_session(&self, id: SessionId, session: Weak<SessionInner>) {
        self.sessions.lock().unwrap().insert(id, session);
    }

    pub(crate) fn deregister_session(&self, id: SessionId) {
        self.sessions.lock().unwrap().remove(&id);
    }

    fn alive_sessions(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, weak| weak.upgrade().is_some());
        sessions.len()
    }
}

/// Cheap cloneable handle to the process-wide engine context.
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<EngineInner>,
}

impl EngineContext {
    /// Initialize the native engine and transition to `INITIALIZED`.
    ///
    /// Fails with [`MirrorError::AlreadyInitialized`] or
    /// [`MirrorError::Terminated`] outside `UNINITIALIZED`, and with
    /// [`MirrorError::InitFailed`] when the backend cannot start (the state
    /// machine then stays `UNINITIALIZED`).
    pub fn initialize(
        config: EngineConfig,
        backend: Box<dyn EngineBackend>,
    ) -> Result<EngineContext, MirrorError> {
        let mut state = LIFECYCLE.lock().unwrap();
        match *state {
            Lifecycle::Uninitialized => {}
            Lifecycle::Initialized(_) => return Err(MirrorError::AlreadyInitialized),
            Lifecycle::Terminated => return Err(MirrorError::Terminated),
        }

        backend.start(&config)?;

        let inner = Arc::new(EngineInner {
            backend,
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        });
        *state = Lifecycle::Initialized(inner.clone());
        info!("engine context initialized");
        Ok(EngineContext { inner })
    }

    /// Accessor for the live context. Fails loudly when the engine was
    /// never initialized or has been terminated.
    pub fn instance() -> Result<EngineContext, MirrorError> {
        match *LIFECYCLE.lock().unwrap() {
            Lifecycle::Uninitialized => Err(MirrorError::NotInitialized),
            Lifecycle::Initialized(ref inner) => Ok(EngineContext {
                inner: inner.clone(),
            }),
            Lifecycle::Terminated => Err(MirrorError::Terminated),
        }
    }

    /// Create a new browser session bound to `client`. Requires
    /// `INITIALIZED`; begins the asynchronous initial navigation to
    /// `options.start_url`.
    pub fn create_session(
        &self,
        options: SessionOptions,
        client: ClientContext,
    ) -> Result<BrowserSession, MirrorError> {
        self.ensure_live()?;
        session::create(self.inner.clone(), options, client)
    }

    /// Transition to `TERMINATED` and release native resources.
    ///
    /// Every session must already be closed; a live session yields
    /// [`MirrorError::ShutdownOrdering`], which callers must treat as a
    /// fatal ordering violation rather than something to retry around.
    /// After a successful return no query, load, or poll callback is
    /// delivered.
    pub fn shutdown(&self) -> Result<(), MirrorError> {
        let mut state = LIFECYCLE.lock().unwrap();
        match *state {
            Lifecycle::Uninitialized => return Err(MirrorError::NotInitialized),
            Lifecycle::Terminated => return Err(MirrorError::Terminated),
            Lifecycle::Initialized(ref inner) => {
                let alive = inner.alive_sessions();
                if alive > 0 {
                    return Err(MirrorError::ShutdownOrdering(alive));
                }
                inner.backend.stop();
            }
        }
        *state = Lifecycle::Terminated;
        info!("engine context terminated");
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), MirrorError> {
        match *LIFECYCLE.lock().unwrap() {
            Lifecycle::Initialized(ref inner) if Arc::ptr_eq(inner, &self.inner) => Ok(()),
            Lifecycle::Uninitialized | Lifecycle::Initialized(_) => {
                Err(MirrorError::NotInitialized)
            }
            Lifecycle::Terminated => Err(MirrorError::Terminated),
        }
    }
}

/// Register a freshly created session, but only while `engine` is still the
/// live context. Registration and the shutdown liveness check share the
/// lifecycle lock, so a shutdown that raced a blocking browser creation
/// either sees the session or wins outright; it never interleaves. A
/// refusal means the caller owns an orphan browser and must close it.
pub(crate) fn register_session_if_live(
    engine: &Arc<EngineInner>,
    id: SessionId,
    session: Weak<SessionInner>,
) -> Result<(), MirrorError> {
    let state = LIFECYCLE.lock().unwrap();
    match *state {
        Lifecycle::Initialized(ref inner) if Arc::ptr_eq(inner, engine) => {
            engine.register_session(id, session);
            Ok(())
        }
        Lifecycle::Uninitialized | Lifecycle::Initialized(_) => Err(MirrorError::NotInitialized),
        Lifecycle::Terminated => Err(MirrorError::Terminated),
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! One navigable browser session and its event pump.
//!
//! [`BrowserSession`] is a cheap cloneable handle; the UI thread and the
//! poller thread share it read-only. The backend never sees the session
//! directly — it drives a [`SessionEventPump`] (the crate's
//! [`SessionEvents`] implementation), which updates navigation state and
//! fans events out to the session's routers and load handlers. Once the
//! session is closed the pump drops everything, so no callback outlives
//! teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use log::{debug, error, warn};
use url::Url;

use crate::backend::{BridgeChannel, BrowserBackend, QueryCompletion, SessionEvents};
use crate::client::ClientContext;
use crate::engine::EngineInner;
use crate::types::{FrameId, MirrorError, QueryId, SessionId, SessionOptions};

#[derive(Default)]
struct NavState {
    current_url: Option<Url>,
    is_loading: bool,
    can_go_back: bool,
    can_go_forward: bool,
    last_load_failure: Option<(String, String)>,
}

pub(crate) struct SessionInner {
    id: SessionId,
    engine: Weak<EngineInner>,
    client: Arc<ClientContext>,
    backend: OnceLock<Box<dyn BrowserBackend>>,
    nav: Mutex<NavState>,
    closed: AtomicBool,
}

/// Handle to one browser session owned by the engine context.
#[derive(Clone)]
pub struct BrowserSession {
    inner: Arc<SessionInner>,
}

pub(crate) fn create(
    engine: Arc<EngineInner>,
    options: SessionOptions,
    client: ClientContext,
) -> Result<BrowserSession, MirrorError> {
    let id = engine.allocate_session_id();
    let inner = Arc::new(SessionInner {
        id,
        engine: Arc::downgrade(&engine),
        client: Arc::new(client),
        backend: OnceLock::new(),
        nav: Mutex::new(NavState {
            is_loading: true,
            ..NavState::default()
        }),
        closed: AtomicBool::new(false),
    });
    let session = BrowserSession {
        inner: inner.clone(),
    };

    let pump = Arc::new(SessionEventPump {
        session: session.clone(),
    });
    let browser = engine.backend.create_browser(&options, pump)?;
    let _ = inner.backend.set(browser);

    // Browser creation blocks without holding the lifecycle lock, so a
    // concurrent shutdown may have terminated the context in the meantime.
    // Registration re-checks liveness under that lock; on refusal the
    // just-built browser must not outlive the dead context.
    if let Err(e) = crate::engine::register_session_if_live(&engine, id, Arc::downgrade(&inner)) {
        warn!("session {id} creation lost a race with engine teardown: {e}");
        session.close();
        return Err(e);
    }
    debug!("session {id} created, navigating to {}", options.start_url);
    Ok(session)
}

impl BrowserSession {
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Begin an asynchronous navigation, observable through the session's
    /// load handlers.
    pub fn navigate(&self, url: &str) -> Result<(), MirrorError> {
        if url.trim().is_empty() {
            return Err(MirrorError::InvalidArgument("empty url".to_string()));
        }
        let parsed =
            Url::parse(url).map_err(|e| MirrorError::InvalidArgument(format!("url: {e}")))?;
        self.backend()?.load_url(&parsed)
    }

    /// Fire-and-forget script execution in the page's context. No return
    /// value reaches the host; results travel through the bridge instead.
    pub fn execute_script(
        &self,
        code: &str,
        origin_url: &str,
        line_offset: u32,
    ) -> Result<(), MirrorError> {
        self.backend()?.execute_script(code, origin_url, line_offset)
    }

    pub fn current_url(&self) -> Option<Url> {
        self.inner.nav.lock().unwrap().current_url.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.nav.lock().unwrap().is_loading
    }

    pub fn can_go_back(&self) -> bool {
        self.inner.nav.lock().unwrap().can_go_back
    }

    pub fn can_go_forward(&self) -> bool {
        self.inner.nav.lock().unwrap().can_go_forward
    }

    /// The most recent main-frame load failure, if the last navigation
    /// attempt ended in one. Cleared by the next navigation; never acted
    /// on automatically.
    pub fn last_load_failure(&self) -> Option<MirrorError> {
        self.inner
            .nav
            .lock()
            .unwrap()
            .last_load_failure
            .clone()
            .map(|(url, reason)| MirrorError::LoadFailed { url, reason })
    }

    /// Attach a secondary, read-only devtools view to this session.
    /// Failure is non-fatal and logged.
    pub fn show_devtools(&self) {
        match self.backend().and_then(|b| b.open_devtools()) {
            Ok(()) => debug!("devtools attached to session {}", self.inner.id),
            Err(e) => warn!("devtools attach failed for session {}: {e}", self.inner.id),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the session: cancel pending queries, close the native browser,
    /// and release it from the engine context. Idempotent.
    ///
    /// Must happen before the engine context may terminate.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.client.cancel_all_queries(self);
        if let Some(backend) = self.inner.backend.get() {
            backend.close();
        }
        if let Some(engine) = self.inner.engine.upgrade() {
            engine.deregister_session(self.inner.id);
        }
        debug!("session {} closed", self.inner.id);
    }

    fn backend(&self) -> Result<&dyn BrowserBackend, MirrorError> {
        if self.is_closed() {
            return Err(MirrorError::SessionClosed);
        }
        self.inner
            .backend
            .get()
            .map(|b| b.as_ref())
            .ok_or(MirrorError::SessionClosed)
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }
}

/// Turns raw backend events into state updates and router/handler dispatch.
///
/// Runs on the engine's message-loop thread; none of these paths block.
struct SessionEventPump {
    session: BrowserSession,
}

impl SessionEventPump {
    fn live(&self) -> bool {
        if self.session.is_closed() {
            debug!(
                "event for closed session {} dropped",
                self.session.inner.id
            );
            return false;
        }
        true
    }
}

impl SessionEvents for SessionEventPump {
    fn on_load_start(&self, frame: FrameId, url: &Url) {
        if !self.live() {
            return;
        }
        let inner = &self.session.inner;
        if frame.is_main() {
            // The old page's script context is gone; its queries can never
            // complete.
            inner.client.cancel_all_queries(&self.session);
            let mut nav = inner.nav.lock().unwrap();
            nav.is_loading = true;
            nav.last_load_failure = None;
        }
        inner.client.notify_load_start(&self.session, frame, url);
    }

    fn on_load_end(&self, frame: FrameId, url: &Url, http_status: i32) {
        if !self.live() {
            return;
        }
        let inner = &self.session.inner;
        if frame.is_main() {
            let mut nav = inner.nav.lock().unwrap();
            nav.is_loading = false;
            nav.current_url = Some(url.clone());
            nav.last_load_failure = None;
        }
        inner
            .client
            .notify_load_end(&self.session, frame, url, http_status);
    }

    fn on_load_error(&self, frame: FrameId, failed_url: &str, error_text: &str) {
        if !self.live() {
            return;
        }
        // Logged and recorded; no retry, no user notice.
        error!("load error for {failed_url}: {error_text}");
        let inner = &self.session.inner;
        if frame.is_main() {
            let mut nav = inner.nav.lock().unwrap();
            nav.is_loading = false;
            nav.last_load_failure = Some((failed_url.to_string(), error_text.to_string()));
        }
        inner
            .client
            .notify_load_error(&self.session, frame, failed_url, error_text);
    }

    fn on_loading_state_change(&self, is_loading: bool, can_go_back: bool, can_go_forward: bool) {
        if !self.live() {
            return;
        }
        let inner = &self.session.inner;
        {
            let mut nav = inner.nav.lock().unwrap();
            nav.is_loading = is_loading;
            nav.can_go_back = can_go_back;
            nav.can_go_forward = can_go_forward;
        }
        inner.client.notify_loading_state_change(
            &self.session,
            is_loading,
            can_go_back,
            can_go_forward,
        );
    }

    fn on_query(
        &self,
        channel: &str,
        frame: FrameId,
        query_id: QueryId,
        payload: &str,
        persistent: bool,
        completion: Arc<dyn QueryCompletion>,
    ) -> bool {
        if !self.live() {
            return false;
        }
        self.session.inner.client.dispatch_query(
            &self.session,
            channel,
            frame,
            query_id,
            payload,
            persistent,
            completion,
        )
    }

    fn on_query_canceled(&self, channel: &str, frame: FrameId, query_id: QueryId) {
        if !self.live() {
            return;
        }
        self.session
            .inner
            .client
            .dispatch_query_canceled(&self.session, channel, frame, query_id);
    }

    fn bridge_channels(&self) -> Vec<BridgeChannel> {
        self.session.inner.client.bridge_channels()
    }
}

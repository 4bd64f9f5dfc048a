/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The seam between the bridge core and a native browser engine.
//!
//! The core never touches engine types directly. A backend implements
//! [`EngineBackend`] (process lifecycle, message-loop thread) and
//! [`BrowserBackend`] (one navigable browser), and delivers engine callbacks
//! into the core through the [`SessionEvents`] sink it receives at browser
//! creation. Callbacks arrive on the engine's message-loop thread and must
//! not block.
//!
//! The shipped backend lives in [`crate::webview`] behind the `webview`
//! feature; tests drive the core through a scripted backend.

use std::sync::Arc;

use url::Url;

use crate::types::{EngineConfig, FrameId, MirrorError, QueryId, SessionOptions};

/// A bridge channel pair as exposed to page script: the names of the
/// page-global request and cancel functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeChannel {
    pub query_function: String,
    pub cancel_function: String,
}

/// Completion path for one query, handed to the core together with the query
/// itself. Implementations route the outcome back to the page-side caller.
///
/// The core guarantees at most one call per query id, and none after that
/// query was canceled.
pub trait QueryCompletion: Send + Sync {
    fn succeed(&self, query_id: QueryId, response: &str);
    fn fail(&self, query_id: QueryId, error_code: i32, message: &str);
}

/// Event sink the backend drives for one browser session.
///
/// Implemented by the core (see `session::SessionEventPump`); backends call
/// these from the engine's message-loop thread.
pub trait SessionEvents: Send + Sync {
    /// A navigation attempt started in `frame`.
    fn on_load_start(&self, frame: FrameId, url: &Url);

    /// A navigation finished successfully.
    fn on_load_end(&self, frame: FrameId, url: &Url, http_status: i32);

    /// A navigation failed. Observed and logged only; no corrective action.
    fn on_load_error(&self, frame: FrameId, failed_url: &str, error_text: &str);

    /// Aggregate loading / history state changed.
    fn on_loading_state_change(&self, is_loading: bool, can_go_back: bool, can_go_forward: bool);

    /// Page script invoked a bridge request function. Returns whether any
    /// router claimed the query.
    fn on_query(
        &self,
        channel: &str,
        frame: FrameId,
        query_id: QueryId,
        payload: &str,
        persistent: bool,
        completion: Arc<dyn QueryCompletion>,
    ) -> bool;

    /// The page-side call for `query_id` was aborted.
    fn on_query_canceled(&self, channel: &str, frame: FrameId, query_id: QueryId);

    /// Channel pairs the backend must expose to page script for this
    /// session, one per registered router.
    fn bridge_channels(&self) -> Vec<BridgeChannel>;
}

/// One navigable browser owned by a backend.
pub trait BrowserBackend: Send + Sync {
    /// Begin an asynchronous navigation.
    fn load_url(&self, url: &Url) -> Result<(), MirrorError>;

    /// Fire-and-forget script execution in the page's context. No return
    /// value is observable to the host.
    fn execute_script(
        &self,
        code: &str,
        origin_url: &str,
        line_offset: u32,
    ) -> Result<(), MirrorError>;

    /// Attach a devtools view observing this browser.
    fn open_devtools(&self) -> Result<(), MirrorError>;

    /// Close the native browser. Idempotent.
    fn close(&self);
}

/// The native engine itself: global init, message-loop thread, teardown.
pub trait EngineBackend: Send + Sync {
    /// Initialize the native engine and start its message-loop thread.
    fn start(&self, config: &EngineConfig) -> Result<(), MirrorError>;

    /// Create one browser bound to `events`; begins the initial navigation
    /// to `options.start_url`.
    fn create_browser(
        &self,
        options: &SessionOptions,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Box<dyn BrowserBackend>, MirrorError>;

    /// Release all native resources. Called exactly once, after every
    /// browser has been closed.
    fn stop(&self);
}

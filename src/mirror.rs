/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The display-mirroring layer on top of the bridge.
//!
//! Page script periodically reads one DOM element's text and sends it
//! through the bridge as a `"display:"`-tagged payload. The host strips
//! the tag, trims the remainder, and surfaces it as the live display text.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::ClientContext;
use crate::engine::EngineContext;
use crate::load::InstallOnLoad;
use crate::poller::ScriptPoller;
use crate::router::{MessageRouter, Query, QueryCallback, QueryHandler, RouterConfig};
use crate::session::BrowserSession;
use crate::types::{MirrorError, SessionOptions};

/// Payload tag carrying live display text.
pub const DISPLAY_TAG: &str = "display:";

/// Page-global request function name of the display channel.
pub const QUERY_FUNCTION: &str = "displayUpdate";

/// Page-global cancel function name of the display channel.
pub const CANCEL_FUNCTION: &str = "displayUpdateCancel";

/// Name of the page-global function the poller invokes each tick. Fixed by
/// this system; installed after every successful load.
pub const PAGE_QUERY_FUNCTION: &str = "queryCurrentText";

/// CSS selector of the game's display element.
pub const DEFAULT_SELECTOR: &str = ".jjo-display";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The display channel pair.
pub fn display_channel() -> RouterConfig {
    RouterConfig::new(QUERY_FUNCTION, CANCEL_FUNCTION)
}

/// Definition of the page-global query function: reads the watched
/// element's text and forwards it through the display channel.
pub fn install_script(selector: &str) -> String {
    let escaped = selector.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "function {PAGE_QUERY_FUNCTION}() {{ \
            var el = document.querySelector('{escaped}'); \
            window.{QUERY_FUNCTION}({{request: '{DISPLAY_TAG}' + (el ? el.textContent : '')}}); \
        }}"
    )
}

/// The per-tick invocation the poller injects.
pub fn poll_script() -> String {
    format!("{PAGE_QUERY_FUNCTION}()")
}

/// Mirroring parameters, persisted alongside [`crate::EngineConfig`] in the
/// CLI's config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// CSS selector of the element to mirror.
    pub selector: String,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Attach the devtools companion view after session creation.
    pub show_devtools: bool,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            selector: DEFAULT_SELECTOR.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            show_devtools: false,
        }
    }
}

/// Handler for the display channel: claims `"display:"` payloads, strips
/// the tag, trims, and publishes the text. Everything else is declined.
pub struct DisplayHandler {
    latest: Mutex<String>,
    on_text: Box<dyn Fn(&str) + Send + Sync>,
}

impl DisplayHandler {
    pub fn new(on_text: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            latest: Mutex::new(String::new()),
            on_text: Box::new(on_text),
        }
    }

    /// Most recent display text, trimmed.
    pub fn latest_text(&self) -> String {
        self.latest.lock().unwrap().clone()
    }
}

impl QueryHandler for DisplayHandler {
    fn on_query(&self, query: &Query, callback: QueryCallback) -> bool {
        let Some(rest) = query.payload.strip_prefix(DISPLAY_TAG) else {
            return false;
        };
        let text = rest.trim();
        *self.latest.lock().unwrap() = text.to_string();
        (self.on_text)(text);
        callback.resolve("");
        true
    }
}

/// Everything needed to mirror one page's display element: session, display
/// router, script installer, and poller, torn down in the required order.
pub struct DisplayMirror {
    session: BrowserSession,
    poller: Option<ScriptPoller>,
    handler: Arc<DisplayHandler>,
}

impl DisplayMirror {
    /// Create the session and start mirroring. `on_text` runs on the
    /// engine's message-loop thread for every received payload and must
    /// not block.
    pub fn attach(
        engine: &EngineContext,
        options: SessionOptions,
        settings: &MirrorSettings,
        on_text: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<DisplayMirror, MirrorError> {
        let handler = Arc::new(DisplayHandler::new(on_text));

        let mut client = ClientContext::new();
        client.add_message_router(MessageRouter::new(display_channel(), handler.clone()));
        client.add_load_handler(InstallOnLoad::new(install_script(&settings.selector)));

        let session = engine.create_session(options, client)?;
        if settings.show_devtools {
            session.show_devtools();
        }

        let poller = ScriptPoller::spawn(
            &session,
            poll_script(),
            Duration::from_millis(settings.poll_interval_ms),
        )?;

        Ok(DisplayMirror {
            session,
            poller: Some(poller),
            handler,
        })
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    /// Most recent mirrored text.
    pub fn latest_text(&self) -> String {
        self.handler.latest_text()
    }

    /// Poll injections that failed so far.
    pub fn injection_failures(&self) -> u64 {
        self.poller.as_ref().map_or(0, ScriptPoller::failure_count)
    }

    /// Ordered teardown: stop the poller, then close the session. The
    /// engine context itself stays up for the caller to shut down.
    pub fn detach(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.session.close();
    }
}

impl Drop for DisplayMirror {
    fn drop(&mut self) {
        self.teardown();
    }
}

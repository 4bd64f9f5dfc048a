/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Load lifecycle coordination.
//!
//! Each navigation attempt runs `started → (loadEnd | loadError)`,
//! independently per attempt. [`LoadHandler`] is a capability set with
//! default no-ops, so a coordinator overrides only the events it cares
//! about. Load errors are observed and logged by the session event pump;
//! there is no retry and no user-visible recovery.

use log::{debug, warn};
use url::Url;

use crate::session::BrowserSession;
use crate::types::FrameId;

/// Observer of one session's load lifecycle. All methods default to no-ops.
pub trait LoadHandler: Send + Sync {
    fn on_load_start(&self, _session: &BrowserSession, _frame: FrameId, _url: &Url) {}

    fn on_load_end(&self, _session: &BrowserSession, _frame: FrameId, _url: &Url, _status: i32) {}

    fn on_load_error(
        &self,
        _session: &BrowserSession,
        _frame: FrameId,
        _failed_url: &str,
        _error_text: &str,
    ) {
    }

    fn on_loading_state_change(
        &self,
        _session: &BrowserSession,
        _is_loading: bool,
        _can_go_back: bool,
        _can_go_forward: bool,
    ) {
    }
}

/// Re-installs a page-global script after every successful main-frame load.
///
/// Page globals do not survive navigation, so installation must follow
/// every `loadEnd`, not just the first.
pub struct InstallOnLoad {
    script: String,
}

impl InstallOnLoad {
    pub fn new(script: String) -> Self {
        Self { script }
    }
}

impl LoadHandler for InstallOnLoad {
    fn on_load_end(&self, session: &BrowserSession, frame: FrameId, url: &Url, _status: i32) {
        if !frame.is_main() {
            return;
        }
        debug!("installing page query function after load of {url}");
        if let Err(e) = session.execute_script(&self.script, url.as_str(), 0) {
            warn!("page function install failed after load of {url}: {e}");
        }
    }
}

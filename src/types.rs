/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Shared public types used across all layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Process-wide engine configuration, applied once at
/// [`EngineContext::initialize`](crate::EngineContext::initialize).
///
/// Persisted as JSON by the CLI shell: the file is written with defaults on
/// first run and read back on subsequent runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render without a native window where the platform supports it.
    pub windowless_rendering: bool,
    /// Override the engine's user agent string.
    pub user_agent: Option<String>,
    /// Remote debugging port, if the backend supports one.
    pub remote_debugging_port: Option<u16>,
}

/// How a session's browser surface is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    /// A regular native window.
    Windowed,
    /// Off-screen rendering, no visible surface of its own.
    OffScreen,
}

/// Options for creating one browser session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// URL loaded as the initial asynchronous navigation.
    pub start_url: Url,
    /// Render mode for the session's surface.
    pub render_mode: RenderMode,
    /// Transparent background (default: false).
    pub transparent: bool,
    /// Surface width in pixels (default: 800).
    pub width: u32,
    /// Surface height in pixels (default: 600).
    pub height: u32,
}

impl SessionOptions {
    pub fn new(start_url: Url) -> Self {
        Self {
            start_url,
            render_mode: RenderMode::Windowed,
            transparent: false,
            width: 800,
            height: 600,
        }
    }
}

/// An identifier for a frame within a session's page.
///
/// Frame 0 is the main frame; subframes get backend-assigned ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    pub const MAIN: FrameId = FrameId(0);

    pub fn is_main(self) -> bool {
        self.0 == 0
    }
}

/// Identifier of a query issued by page script, unique among the queries
/// currently pending on its session.
pub type QueryId = u64;

/// Identifier of a browser session within the engine context.
pub type SessionId = u64;

/// Errors that can occur across the bridge.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The native engine could not start. Fatal; aborts startup.
    #[error("engine initialization failed: {0}")]
    InitFailed(String),
    /// `initialize` was called while the engine context is already live.
    #[error("engine context is already initialized")]
    AlreadyInitialized,
    /// The engine context was used before `initialize`.
    #[error("engine context is not initialized")]
    NotInitialized,
    /// The engine context was terminated; termination is terminal.
    #[error("engine context has been terminated")]
    Terminated,
    /// `shutdown` was called while sessions are still alive.
    #[error("cannot shut down: {0} session(s) still alive")]
    ShutdownOrdering(usize),
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A navigation failed. Recorded on the session and logged; no retry.
    #[error("page load failed for {url}: {reason}")]
    LoadFailed { url: String, reason: String },
    /// Fire-and-forget script execution could not be submitted.
    #[error("script execution failed: {0}")]
    ScriptFailed(String),
    /// The session was already closed.
    #[error("session is closed")]
    SessionClosed,
    /// The devtools view could not be attached. Non-fatal.
    #[error("devtools unavailable: {0}")]
    DevtoolsUnavailable(String),
}

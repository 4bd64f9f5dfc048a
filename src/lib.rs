/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A minimal desktop shell that embeds a browser engine and mirrors a live
//! text element from the loaded page back into the host process.
//!
//! The crate is the **browser host bridge**, three layers deep:
//!
//! - **Engine lifecycle** — [`EngineContext`], a process-wide singleton
//!   with a guarded `UNINITIALIZED → INITIALIZED → TERMINATED` state
//!   machine, owning [`BrowserSession`]s and enforcing shutdown ordering.
//! - **Message routing** — [`MessageRouter`] binds a bridge channel pair
//!   (page-global request/cancel functions) to a [`QueryHandler`];
//!   asynchronous queries from page script are resolved, rejected, or
//!   canceled exactly once.
//! - **Mirroring** — [`DisplayMirror`] installs a page-global reader after
//!   every successful load and drives it from a cancellable fixed-interval
//!   [`ScriptPoller`].
//!
//! The native engine sits behind the [`backend`] traits. The shipped
//! backend (`webview` feature) embeds the system webview via `wry`/`tao`;
//! tests drive the core through a scripted backend.
//!
//! # Example
//!
//! ```no_run
//! use display_mirror::{
//!     DisplayMirror, EngineConfig, EngineContext, MirrorSettings, SessionOptions,
//! };
//!
//! # fn backend() -> Box<dyn display_mirror::backend::EngineBackend> { unimplemented!() }
//! let engine = EngineContext::initialize(EngineConfig::default(), backend()).unwrap();
//! let options = SessionOptions::new("https://kkutu.org/".parse().unwrap());
//! let mirror = DisplayMirror::attach(&engine, options, &MirrorSettings::default(), |text| {
//!     println!("Display text change: {text}");
//! })
//! .unwrap();
//! // ... window closes:
//! mirror.detach();
//! engine.shutdown().unwrap();
//! ```

pub mod backend;
mod client;
mod engine;
mod load;
mod mirror;
mod poller;
mod router;
mod session;
mod types;
#[cfg(feature = "webview")]
pub mod webview;

pub use client::ClientContext;
pub use engine::EngineContext;
pub use load::{InstallOnLoad, LoadHandler};
pub use mirror::{
    CANCEL_FUNCTION, DEFAULT_POLL_INTERVAL, DEFAULT_SELECTOR, DISPLAY_TAG, DisplayHandler,
    DisplayMirror, MirrorSettings, PAGE_QUERY_FUNCTION, QUERY_FUNCTION, display_channel,
    install_script, poll_script,
};
pub use poller::ScriptPoller;
pub use router::{MessageRouter, Query, QueryCallback, QueryHandler, RouterConfig};
pub use session::BrowserSession;
pub use types::{
    EngineConfig, FrameId, MirrorError, QueryId, RenderMode, SessionId, SessionOptions,
};
#[cfg(feature = "webview")]
pub use webview::WryEngineBackend;

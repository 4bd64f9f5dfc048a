/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! System-webview backend on `wry`/`tao` (feature `webview`).
//!
//! The engine's message-loop thread is a `tao` event loop running off the
//! main thread (Linux and Windows; macOS requires the main thread and is
//! unsupported here). Session handles talk to it through an
//! [`EventLoopProxy`], which keeps [`BrowserBackend`] calls fire-and-forget
//! from any thread.
//!
//! The bridge channel pair is installed by an initialization script that
//! runs before page script on every navigation: each request function
//! allocates a page-side query id and forwards an envelope over
//! `window.ipc.postMessage`; completions travel back as a
//! `__displayMirrorBridge.complete(...)` call.
//!
//! Limitations of the system webview, logged where they bite: no
//! off-screen rendering (an off-screen session runs in a hidden window),
//! no load-error callback (that path never fires from this backend), and
//! no per-script origin/line attribution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use serde::Deserialize;
use tao::dpi::LogicalSize;
use tao::event::{Event, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use tao::platform::run_return::EventLoopExtRunReturn;
#[cfg(target_os = "linux")]
use tao::platform::unix::EventLoopBuilderExtUnix;
#[cfg(target_os = "windows")]
use tao::platform::windows::EventLoopBuilderExtWindows;
use tao::window::{Window, WindowBuilder};
use url::Url;
use wry::{PageLoadEvent, WebView, WebViewBuilder};

use crate::backend::{
    BridgeChannel, BrowserBackend, EngineBackend, QueryCompletion, SessionEvents,
};
use crate::types::{EngineConfig, FrameId, MirrorError, QueryId, RenderMode, SessionOptions};

const UNHANDLED_QUERY_ERROR: i32 = -1;

enum UiCommand {
    CreateBrowser {
        key: u64,
        options: SessionOptions,
        events: Arc<dyn SessionEvents>,
        reply: Sender<Result<(), MirrorError>>,
    },
    LoadUrl {
        key: u64,
        url: Url,
    },
    ExecuteScript {
        key: u64,
        code: String,
    },
    OpenDevtools {
        key: u64,
    },
    Complete {
        key: u64,
        query_id: QueryId,
        ok: bool,
        error_code: i32,
        payload: String,
    },
    CloseBrowser {
        key: u64,
    },
    Shutdown,
}

/// Engine backend embedding the system webview.
pub struct WryEngineBackend {
    proxy: Mutex<Option<EventLoopProxy<UiCommand>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    close_rx: Mutex<Option<Receiver<()>>>,
    close_tx: Sender<()>,
    next_key: AtomicU64,
}

impl WryEngineBackend {
    pub fn new() -> Self {
        let (close_tx, close_rx) = mpsc::channel();
        Self {
            proxy: Mutex::new(None),
            thread: Mutex::new(None),
            close_rx: Mutex::new(Some(close_rx)),
            close_tx,
            next_key: AtomicU64::new(1),
        }
    }

    /// Receiver that fires once after the last browser window was closed
    /// by the user. Take it before handing the backend to the engine.
    pub fn take_close_signal(&self) -> Option<Receiver<()>> {
        self.close_rx.lock().unwrap().take()
    }

    fn proxy(&self) -> Result<EventLoopProxy<UiCommand>, MirrorError> {
        self.proxy
            .lock()
            .unwrap()
            .clone()
            .ok_or(MirrorError::NotInitialized)
    }
}

impl Default for WryEngineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBackend for WryEngineBackend {
    fn start(&self, config: &EngineConfig) -> Result<(), MirrorError> {
        let mut thread_slot = self.thread.lock().unwrap();
        if thread_slot.is_some() {
            return Err(MirrorError::AlreadyInitialized);
        }
        if config.remote_debugging_port.is_some() {
            debug!("remote_debugging_port is not supported by the webview backend");
        }

        let (proxy_tx, proxy_rx) = mpsc::channel();
        let close_tx = self.close_tx.clone();
        let config = config.clone();
        let thread = thread::Builder::new()
            .name("display-mirror-ui".to_string())
            .spawn(move || run_ui_loop(config, proxy_tx, close_tx))
            .map_err(|e| MirrorError::InitFailed(format!("ui thread: {e}")))?;
        let proxy = proxy_rx
            .recv()
            .map_err(|_| MirrorError::InitFailed("event loop did not start".to_string()))?;

        *self.proxy.lock().unwrap() = Some(proxy);
        *thread_slot = Some(thread);
        Ok(())
    }

    fn create_browser(
        &self,
        options: &SessionOptions,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Box<dyn BrowserBackend>, MirrorError> {
        let proxy = self.proxy()?;
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = mpsc::channel();
        proxy
            .send_event(UiCommand::CreateBrowser {
                key,
                options: options.clone(),
                events,
                reply: reply_tx,
            })
            .map_err(|_| MirrorError::InitFailed("event loop gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| MirrorError::InitFailed("event loop gone".to_string()))??;
        Ok(Box::new(WryBrowser { key, proxy }))
    }

    fn stop(&self) {
        if let Some(proxy) = self.proxy.lock().unwrap().take() {
            let _ = proxy.send_event(UiCommand::Shutdown);
        }
        if let Some(thread) = self.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

struct WryBrowser {
    key: u64,
    proxy: EventLoopProxy<UiCommand>,
}

impl WryBrowser {
    fn send(&self, command: UiCommand) -> Result<(), MirrorError> {
        self.proxy
            .send_event(command)
            .map_err(|_| MirrorError::SessionClosed)
    }
}

impl BrowserBackend for WryBrowser {
    fn load_url(&self, url: &Url) -> Result<(), MirrorError> {
        self.send(UiCommand::LoadUrl {
            key: self.key,
            url: url.clone(),
        })
    }

    fn execute_script(
        &self,
        code: &str,
        _origin_url: &str,
        _line_offset: u32,
    ) -> Result<(), MirrorError> {
        self.send(UiCommand::ExecuteScript {
            key: self.key,
            code: code.to_string(),
        })
        .map_err(|_| MirrorError::ScriptFailed("event loop gone".to_string()))
    }

    fn open_devtools(&self) -> Result<(), MirrorError> {
        self.send(UiCommand::OpenDevtools { key: self.key })
            .map_err(|e| MirrorError::DevtoolsUnavailable(e.to_string()))
    }

    fn close(&self) {
        let _ = self.send(UiCommand::CloseBrowser { key: self.key });
    }
}

struct BrowserBundle {
    window: Window,
    webview: WebView,
}

fn run_ui_loop(
    config: EngineConfig,
    proxy_tx: Sender<EventLoopProxy<UiCommand>>,
    close_tx: Sender<()>,
) {
    let mut builder = EventLoopBuilder::<UiCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "windows"))]
    builder.with_any_thread(true);
    let mut event_loop = builder.build();

    let proxy = event_loop.create_proxy();
    if proxy_tx.send(proxy.clone()).is_err() {
        return;
    }

    let mut browsers: HashMap<u64, BrowserBundle> = HashMap::new();

    event_loop.run_return(move |event, target, control_flow| {
        *control_flow = ControlFlow::Wait;
        match event {
            Event::UserEvent(command) => match command {
                UiCommand::CreateBrowser {
                    key,
                    options,
                    events,
                    reply,
                } => {
                    let result = build_browser(target, &config, &options, events, key, &proxy)
                        .map(|bundle| {
                            browsers.insert(key, bundle);
                        });
                    let _ = reply.send(result);
                }
                UiCommand::LoadUrl { key, url } => {
                    if let Some(bundle) = browsers.get(&key) {
                        if let Err(e) = bundle.webview.load_url(url.as_str()) {
                            warn!("navigation to {url} failed to submit: {e}");
                        }
                    }
                }
                UiCommand::ExecuteScript { key, code } => {
                    if let Some(bundle) = browsers.get(&key) {
                        if let Err(e) = bundle.webview.evaluate_script(&code) {
                            warn!("script execution failed: {e}");
                        }
                    }
                }
                UiCommand::OpenDevtools { key } => {
                    if let Some(bundle) = browsers.get(&key) {
                        bundle.webview.open_devtools();
                    }
                }
                UiCommand::Complete {
                    key,
                    query_id,
                    ok,
                    error_code,
                    payload,
                } => {
                    if let Some(bundle) = browsers.get(&key) {
                        let script = complete_script(query_id, ok, error_code, &payload);
                        if let Err(e) = bundle.webview.evaluate_script(&script) {
                            warn!("query completion delivery failed: {e}");
                        }
                    }
                }
                UiCommand::CloseBrowser { key } => {
                    browsers.remove(&key);
                }
                UiCommand::Shutdown => {
                    browsers.clear();
                    *control_flow = ControlFlow::Exit;
                }
            },
            Event::WindowEvent {
                window_id,
                event: WindowEvent::CloseRequested,
                ..
            } => {
                browsers.retain(|_, bundle| bundle.window.id() != window_id);
                if browsers.is_empty() {
                    let _ = close_tx.send(());
                }
            }
            _ => {}
        }
    });
}

fn build_browser(
    target: &EventLoopWindowTarget<UiCommand>,
    config: &EngineConfig,
    options: &SessionOptions,
    events: Arc<dyn SessionEvents>,
    key: u64,
    proxy: &EventLoopProxy<UiCommand>,
) -> Result<BrowserBundle, MirrorError> {
    // No off-screen rendering in the system webview; approximate with a
    // hidden window.
    let visible = options.render_mode == RenderMode::Windowed;
    let window = WindowBuilder::new()
        .with_title("display-mirror")
        .with_inner_size(LogicalSize::new(options.width as f64, options.height as f64))
        .with_transparent(options.transparent)
        .with_visible(visible)
        .build(target)
        .map_err(|e| MirrorError::InitFailed(format!("window: {e}")))?;

    let channels = events.bridge_channels();
    let ipc_events = events.clone();
    let load_events = events.clone();
    let completion: Arc<dyn QueryCompletion> = Arc::new(ProxyCompletion {
        key,
        proxy: proxy.clone(),
    });

    let mut builder = WebViewBuilder::new()
        .with_url(options.start_url.as_str())
        .with_transparent(options.transparent)
        .with_devtools(true)
        .with_initialization_script(&bridge_script(&channels))
        .with_ipc_handler(move |request: wry::http::Request<String>| {
            handle_ipc(&ipc_events, &completion, request.body());
        })
        .with_on_page_load_handler(move |event, url| {
            let Ok(parsed) = Url::parse(&url) else {
                debug!("page load event with unparsable url {url:?}");
                return;
            };
            match event {
                PageLoadEvent::Started => load_events.on_load_start(FrameId::MAIN, &parsed),
                // The system webview reports no HTTP status; a finished
                // load is reported as 200.
                PageLoadEvent::Finished => load_events.on_load_end(FrameId::MAIN, &parsed, 200),
            }
        });
    if let Some(ref user_agent) = config.user_agent {
        builder = builder.with_user_agent(user_agent);
    }

    #[cfg(target_os = "linux")]
    let webview = {
        use tao::platform::unix::WindowExtUnix;
        use wry::WebViewBuilderExtUnix;
        builder
            .build_gtk(window.gtk_window())
            .map_err(|e| MirrorError::InitFailed(format!("webview: {e}")))?
    };
    #[cfg(not(target_os = "linux"))]
    let webview = builder
        .build(&window)
        .map_err(|e| MirrorError::InitFailed(format!("webview: {e}")))?;

    Ok(BrowserBundle { window, webview })
}

/// Envelope sent by the injected request/cancel functions.
#[derive(Deserialize)]
struct IpcEnvelope {
    channel: String,
    #[serde(rename = "queryId")]
    query_id: QueryId,
    #[serde(default)]
    persistent: bool,
    #[serde(default)]
    request: String,
    #[serde(default)]
    cancel: bool,
}

fn handle_ipc(events: &Arc<dyn SessionEvents>, completion: &Arc<dyn QueryCompletion>, body: &str) {
    let envelope: IpcEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("malformed bridge message dropped: {e}");
            return;
        }
    };

    if envelope.cancel {
        events.on_query_canceled(&envelope.channel, FrameId::MAIN, envelope.query_id);
        return;
    }

    let handled = events.on_query(
        &envelope.channel,
        FrameId::MAIN,
        envelope.query_id,
        &envelope.request,
        envelope.persistent,
        completion.clone(),
    );
    if !handled {
        completion.fail(
            envelope.query_id,
            UNHANDLED_QUERY_ERROR,
            "no handler for query",
        );
    }
}

/// Delivers query outcomes back into the page by re-entering the event
/// loop, so completions may be called from any thread.
struct ProxyCompletion {
    key: u64,
    proxy: EventLoopProxy<UiCommand>,
}

impl QueryCompletion for ProxyCompletion {
    fn succeed(&self, query_id: QueryId, response: &str) {
        let _ = self.proxy.send_event(UiCommand::Complete {
            key: self.key,
            query_id,
            ok: true,
            error_code: 0,
            payload: response.to_string(),
        });
    }

    fn fail(&self, query_id: QueryId, error_code: i32, message: &str) {
        let _ = self.proxy.send_event(UiCommand::Complete {
            key: self.key,
            query_id,
            ok: false,
            error_code,
            payload: message.to_string(),
        });
    }
}

/// Initialization script installing one request/cancel function pair per
/// router. Runs before page script on every navigation, so the functions
/// exist even though page globals reset.
fn bridge_script(channels: &[BridgeChannel]) -> String {
    let mut script = String::from(
        "(function(){\
            if (window.__displayMirrorBridge) { return; }\
            var seq = 0, pending = {};\
            window.__displayMirrorBridge = {\
                complete: function(id, ok, payload){\
                    var q = pending[id];\
                    delete pending[id];\
                    if (!q) { return; }\
                    if (ok) { q.onSuccess && q.onSuccess(payload); }\
                    else { q.onFailure && q.onFailure(payload); }\
                }\
            };",
    );
    for channel in channels {
        let query_json =
            serde_json::to_string(&channel.query_function).unwrap_or_else(|_| "\"\"".to_string());
        script.push_str(&format!(
            "window[{query_json}] = function(q){{\
                q = q || {{}};\
                var id = ++seq;\
                pending[id] = q;\
                window.ipc.postMessage(JSON.stringify({{\
                    channel: {query_json},\
                    queryId: id,\
                    persistent: !!q.persistent,\
                    request: String(q.request == null ? '' : q.request)\
                }}));\
                return id;\
            }};"
        ));
        let cancel_json =
            serde_json::to_string(&channel.cancel_function).unwrap_or_else(|_| "\"\"".to_string());
        script.push_str(&format!(
            "window[{cancel_json}] = function(id){{\
                if (!pending[id]) {{ return; }}\
                delete pending[id];\
                window.ipc.postMessage(JSON.stringify({{\
                    channel: {query_json},\
                    queryId: id,\
                    cancel: true\
                }}));\
            }};"
        ));
    }
    script.push_str("})();");
    script
}

fn complete_script(query_id: QueryId, ok: bool, error_code: i32, payload: &str) -> String {
    let body = if ok {
        serde_json::to_string(payload).unwrap_or_else(|_| "\"\"".to_string())
    } else {
        format!(
            "{{code: {error_code}, message: {}}}",
            serde_json::to_string(payload).unwrap_or_else(|_| "\"\"".to_string())
        )
    };
    format!(
        "window.__displayMirrorBridge && \
         window.__displayMirrorBridge.complete({query_id}, {ok}, {body});"
    )
}

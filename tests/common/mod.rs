/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Scripted engine backend shared by the integration suites.
//!
//! One engine context per test process; each suite initializes it once
//! through [`shared_engine`] and never shuts it down (except the shutdown
//! suite, which owns its whole lifecycle).

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use url::Url;

use display_mirror::backend::{
    BrowserBackend, EngineBackend, QueryCompletion, SessionEvents,
};
use display_mirror::{EngineConfig, EngineContext, MirrorError, QueryId, SessionOptions};

pub struct MockEngineState {
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    start_error: Mutex<Option<String>>,
    browsers: Mutex<Vec<MockBrowserHandle>>,
}

impl MockEngineState {
    /// Event sink and scripted state of the most recently created browser.
    pub fn last_browser(&self) -> MockBrowserHandle {
        self.browsers
            .lock()
            .unwrap()
            .last()
            .expect("no browser created")
            .clone()
    }

    pub fn browser_count(&self) -> usize {
        self.browsers.lock().unwrap().len()
    }
}

#[derive(Clone)]
pub struct MockBrowserHandle {
    pub events: Arc<dyn SessionEvents>,
    pub state: Arc<MockBrowserState>,
}

#[derive(Default)]
pub struct MockBrowserState {
    pub loaded: Mutex<Vec<Url>>,
    pub scripts: Mutex<Vec<ExecutedScript>>,
    pub fail_scripts: AtomicBool,
    pub devtools_opens: AtomicU64,
    pub closed: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedScript {
    pub code: String,
    pub origin_url: String,
}

impl MockBrowserState {
    pub fn script_codes(&self) -> Vec<String> {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.code.clone())
            .collect()
    }

    pub fn loaded_urls(&self) -> Vec<Url> {
        self.loaded.lock().unwrap().clone()
    }
}

pub struct MockEngine {
    state: Arc<MockEngineState>,
}

impl MockEngine {
    pub fn new() -> (MockEngine, Arc<MockEngineState>) {
        let state = Arc::new(MockEngineState {
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            start_error: Mutex::new(None),
            browsers: Mutex::new(Vec::new()),
        });
        (
            MockEngine {
                state: state.clone(),
            },
            state,
        )
    }

    /// Make the next `start` fail with `InitFailed(reason)`.
    pub fn failing(reason: &str) -> MockEngine {
        let (engine, state) = MockEngine::new();
        *state.start_error.lock().unwrap() = Some(reason.to_string());
        engine
    }
}

impl EngineBackend for MockEngine {
    fn start(&self, _config: &EngineConfig) -> Result<(), MirrorError> {
        if let Some(reason) = self.state.start_error.lock().unwrap().take() {
            return Err(MirrorError::InitFailed(reason));
        }
        self.state.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn create_browser(
        &self,
        options: &SessionOptions,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Box<dyn BrowserBackend>, MirrorError> {
        let browser_state = Arc::new(MockBrowserState::default());
        browser_state
            .loaded
            .lock()
            .unwrap()
            .push(options.start_url.clone());
        self.state.browsers.lock().unwrap().push(MockBrowserHandle {
            events,
            state: browser_state.clone(),
        });
        Ok(Box::new(MockBrowser {
            state: browser_state,
        }))
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

struct MockBrowser {
    state: Arc<MockBrowserState>,
}

impl BrowserBackend for MockBrowser {
    fn load_url(&self, url: &Url) -> Result<(), MirrorError> {
        self.state.loaded.lock().unwrap().push(url.clone());
        Ok(())
    }

    fn execute_script(
        &self,
        code: &str,
        origin_url: &str,
        _line_offset: u32,
    ) -> Result<(), MirrorError> {
        if self.state.fail_scripts.load(Ordering::SeqCst) {
            return Err(MirrorError::ScriptFailed("scripted failure".to_string()));
        }
        self.state.scripts.lock().unwrap().push(ExecutedScript {
            code: code.to_string(),
            origin_url: origin_url.to_string(),
        });
        Ok(())
    }

    fn open_devtools(&self) -> Result<(), MirrorError> {
        self.state.devtools_opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every terminal event a backend would deliver to the page.
#[derive(Default)]
pub struct RecordingCompletion {
    outcomes: Mutex<Vec<Outcome>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        query_id: QueryId,
        response: String,
    },
    Failure {
        query_id: QueryId,
        error_code: i32,
        message: String,
    },
}

impl RecordingCompletion {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl QueryCompletion for RecordingCompletion {
    fn succeed(&self, query_id: QueryId, response: &str) {
        self.outcomes.lock().unwrap().push(Outcome::Success {
            query_id,
            response: response.to_string(),
        });
    }

    fn fail(&self, query_id: QueryId, error_code: i32, message: &str) {
        self.outcomes.lock().unwrap().push(Outcome::Failure {
            query_id,
            error_code,
            message: message.to_string(),
        });
    }
}

/// The process-wide engine context over a scripted backend. Initialized on
/// first use; intentionally never shut down.
pub fn shared_engine() -> &'static (EngineContext, Arc<MockEngineState>) {
    static ENGINE: OnceLock<(EngineContext, Arc<MockEngineState>)> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let (backend, state) = MockEngine::new();
        let engine = EngineContext::initialize(EngineConfig::default(), Box::new(backend))
            .expect("engine init");
        (engine, state)
    })
}

pub fn test_url(path: &str) -> Url {
    Url::parse(&format!("https://example.test/{path}")).expect("valid test url")
}

/// Poll `predicate` until it holds or the deadline passes.
pub fn wait_until(predicate: impl Fn() -> bool, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

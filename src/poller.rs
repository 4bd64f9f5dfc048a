/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Periodic script injection.
//!
//! A [`ScriptPoller`] runs on its own thread, decoupled from the engine's
//! message loop, and fire-and-forgets one script execution per tick. Ticks
//! carry no back-pressure and are never deduplicated; a failed tick is
//! counted and logged, and the loop continues.
//!
//! Cancellation is bound to the session's lifetime three ways: an explicit
//! stop signal (also sent on drop), a weak session reference, and the
//! session's closed flag. A destroyed session therefore terminates the
//! loop instead of racing teardown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::session::BrowserSession;
use crate::types::MirrorError;

/// Cancellable fixed-interval script injector for one session.
pub struct ScriptPoller {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl ScriptPoller {
    /// Spawn the poller thread. The first tick fires one `interval` after
    /// spawn, then ticks keep the fixed cadence regardless of per-tick
    /// success or failure.
    pub fn spawn(
        session: &BrowserSession,
        script: String,
        interval: Duration,
    ) -> Result<ScriptPoller, MirrorError> {
        let weak = session.downgrade();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let ticks = Arc::new(AtomicU64::new(0));
        let failures = Arc::new(AtomicU64::new(0));

        let thread_ticks = ticks.clone();
        let thread_failures = failures.clone();
        let thread = thread::Builder::new()
            .name("display-mirror-poller".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(inner) = weak.upgrade() else { break };
                    let session = BrowserSession::from_inner(inner);
                    if session.is_closed() {
                        break;
                    }
                    thread_ticks.fetch_add(1, Ordering::Relaxed);
                    let origin = session
                        .current_url()
                        .map(|u| u.to_string())
                        .unwrap_or_default();
                    if let Err(e) = session.execute_script(&script, &origin, 0) {
                        thread_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("poll injection failed: {e}");
                    }
                }
                debug!("poller thread stopped");
            })
            .map_err(|e| MirrorError::InitFailed(format!("poller thread: {e}")))?;

        Ok(ScriptPoller {
            stop_tx,
            thread: Some(thread),
            ticks,
            failures,
        })
    }

    /// Ticks attempted so far, successful or not.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Injections that failed. The loop never stops on failure; this
    /// counter is the observable trace of otherwise-swallowed errors.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Stop the poller and join its thread. Must complete before the
    /// owning session's engine context is disposed.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ScriptPoller {
    fn drop(&mut self) {
        self.halt();
    }
}

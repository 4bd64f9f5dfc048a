/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Router semantics: claim/decline, pending-id uniqueness, and the
//! mutual exclusivity of resolve, reject, and cancel.

mod common;

use std::sync::{Arc, Mutex};

use display_mirror::{
    BrowserSession, ClientContext, DisplayHandler, FrameId, MessageRouter, Query, QueryCallback,
    QueryHandler, QueryId, RouterConfig, SessionOptions, display_channel,
};

use common::{Outcome, RecordingCompletion};

fn test_session(name: &str) -> BrowserSession {
    let (engine, _) = common::shared_engine();
    engine
        .create_session(SessionOptions::new(common::test_url(name)), ClientContext::new())
        .expect("session")
}

/// Claims every query but defers resolution, so tests control the order
/// of terminal events.
#[derive(Default)]
struct DeferringHandler {
    callbacks: Mutex<Vec<QueryCallback>>,
    canceled: Mutex<Vec<QueryId>>,
}

impl DeferringHandler {
    fn take_callback(&self) -> QueryCallback {
        self.callbacks.lock().unwrap().remove(0)
    }

    fn canceled_ids(&self) -> Vec<QueryId> {
        let mut ids = self.canceled.lock().unwrap().clone();
        ids.sort_unstable();
        ids
    }
}

impl QueryHandler for DeferringHandler {
    fn on_query(&self, _query: &Query, callback: QueryCallback) -> bool {
        self.callbacks.lock().unwrap().push(callback);
        true
    }

    fn on_query_canceled(&self, _session: &BrowserSession, _frame: FrameId, query_id: QueryId) {
        self.canceled.lock().unwrap().push(query_id);
    }
}

fn deferring_router() -> (MessageRouter, Arc<DeferringHandler>) {
    let handler = Arc::new(DeferringHandler::default());
    let router = MessageRouter::new(RouterConfig::new("bridgeQuery", "bridgeQueryCancel"), handler.clone());
    (router, handler)
}

#[test]
fn display_payload_is_trimmed_and_resolved() {
    let session = test_session("display");
    let texts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = texts.clone();
    let handler = Arc::new(DisplayHandler::new(move |text| {
        sink.lock().unwrap().push(text.to_string());
    }));
    let router = MessageRouter::new(display_channel(), handler.clone());
    let completion = Arc::new(RecordingCompletion::default());

    let handled = router.deliver_query(
        &session,
        FrameId::MAIN,
        1,
        "display:  hello world  ",
        false,
        completion.clone(),
    );

    assert!(handled);
    assert_eq!(handler.latest_text(), "hello world");
    assert_eq!(*texts.lock().unwrap(), vec!["hello world".to_string()]);
    assert_eq!(
        completion.outcomes(),
        vec![Outcome::Success {
            query_id: 1,
            response: String::new(),
        }]
    );
    assert_eq!(router.pending_queries(), 0);
}

#[test]
fn unrelated_payload_is_declined() {
    let session = test_session("declined");
    let handler = Arc::new(DisplayHandler::new(|_| {}));
    let router = MessageRouter::new(display_channel(), handler);
    let completion = Arc::new(RecordingCompletion::default());

    let handled = router.deliver_query(
        &session,
        FrameId::MAIN,
        1,
        "navigate:https://example.test/",
        false,
        completion.clone(),
    );

    assert!(!handled);
    assert!(completion.outcomes().is_empty());
    assert_eq!(router.pending_queries(), 0);
}

#[test]
fn duplicate_pending_id_is_refused() {
    let session = test_session("duplicate");
    let (router, _handler) = deferring_router();
    let completion = Arc::new(RecordingCompletion::default());

    assert!(router.deliver_query(&session, FrameId::MAIN, 7, "first", true, completion.clone()));
    assert!(!router.deliver_query(&session, FrameId::MAIN, 7, "second", true, completion.clone()));
    assert_eq!(router.pending_queries(), 1);
    assert!(completion.outcomes().is_empty());
}

#[test]
fn cancel_wins_over_late_resolve() {
    let session = test_session("cancel-first");
    let (router, handler) = deferring_router();
    let completion = Arc::new(RecordingCompletion::default());

    router.deliver_query(&session, FrameId::MAIN, 1, "payload", true, completion.clone());
    router.deliver_cancel(&session, FrameId::MAIN, 1);

    assert_eq!(handler.canceled_ids(), vec![1]);
    assert_eq!(router.pending_queries(), 0);

    // The handler resolves after the fact; nothing reaches the page.
    handler.take_callback().resolve("too late");
    assert!(completion.outcomes().is_empty());
}

#[test]
fn resolve_wins_over_late_cancel() {
    let session = test_session("resolve-first");
    let (router, handler) = deferring_router();
    let completion = Arc::new(RecordingCompletion::default());

    router.deliver_query(&session, FrameId::MAIN, 1, "payload", true, completion.clone());
    handler.take_callback().resolve("result");
    router.deliver_cancel(&session, FrameId::MAIN, 1);

    assert!(handler.canceled_ids().is_empty());
    assert_eq!(
        completion.outcomes(),
        vec![Outcome::Success {
            query_id: 1,
            response: "result".to_string(),
        }]
    );
}

#[test]
fn reject_reaches_the_page_once() {
    let session = test_session("reject");
    let (router, handler) = deferring_router();
    let completion = Arc::new(RecordingCompletion::default());

    router.deliver_query(&session, FrameId::MAIN, 3, "payload", true, completion.clone());
    handler.take_callback().reject(404, "no such element");
    router.deliver_cancel(&session, FrameId::MAIN, 3);

    assert_eq!(
        completion.outcomes(),
        vec![Outcome::Failure {
            query_id: 3,
            error_code: 404,
            message: "no such element".to_string(),
        }]
    );
    assert!(handler.canceled_ids().is_empty());
}

#[test]
fn cancel_for_unknown_id_is_a_no_op() {
    let session = test_session("unknown-cancel");
    let (router, handler) = deferring_router();

    router.deliver_cancel(&session, FrameId::MAIN, 42);
    assert!(handler.canceled_ids().is_empty());
}

#[test]
fn cancel_all_drains_every_pending_query() {
    let session = test_session("cancel-all");
    let (router, handler) = deferring_router();
    let completion = Arc::new(RecordingCompletion::default());

    for id in 1..=3 {
        router.deliver_query(&session, FrameId::MAIN, id, "payload", true, completion.clone());
    }
    assert_eq!(router.pending_queries(), 3);

    router.cancel_all(&session);

    assert_eq!(handler.canceled_ids(), vec![1, 2, 3]);
    assert_eq!(router.pending_queries(), 0);
    assert!(completion.outcomes().is_empty());
}

#[test]
fn deferred_query_stays_pending_until_resolved() {
    let session = test_session("deferred");
    let (router, handler) = deferring_router();
    let completion = Arc::new(RecordingCompletion::default());

    router.deliver_query(&session, FrameId::MAIN, 9, "payload", true, completion.clone());
    assert_eq!(router.pending_queries(), 1);

    handler.take_callback().resolve("done");
    assert_eq!(router.pending_queries(), 0);
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Message routing between injected page script and host callbacks.
//!
//! A [`MessageRouter`] binds one bridge channel pair to one
//! [`QueryHandler`]. Page script calls the pair's request function with a
//! `{request: <string>}` object; the backend delivers it here as a query,
//! and the handler either claims it (and later resolves or rejects it
//! exactly once) or declines it so another router may try.
//!
//! Terminal events per query are mutually exclusive: a query is resolved,
//! rejected, or canceled, never more than one of those. The pending table
//! enforces this with a single removal under one lock — whichever path
//! removes the entry wins, every later path becomes a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::backend::QueryCompletion;
use crate::session::BrowserSession;
use crate::types::{FrameId, QueryId};

/// Names of the page-global request and cancel functions served by one
/// router. Unique per router; routers never see another pair's traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub query_function: String,
    pub cancel_function: String,
}

impl RouterConfig {
    pub fn new(query_function: &str, cancel_function: &str) -> Self {
        Self {
            query_function: query_function.to_string(),
            cancel_function: cancel_function.to_string(),
        }
    }
}

/// One query as delivered to a handler.
pub struct Query {
    pub session: BrowserSession,
    pub frame: FrameId,
    pub query_id: QueryId,
    pub payload: String,
    /// A persistent query may defer its resolution past `on_query`.
    pub persistent: bool,
}

/// Host-side handler for one router.
///
/// `on_query` inspects the payload and returns whether it claims the query.
/// A claimed query must see exactly one of [`QueryCallback::resolve`] /
/// [`QueryCallback::reject`], unless `persistent` permits deferral — and
/// even then the resolution happens at most once.
pub trait QueryHandler: Send + Sync {
    fn on_query(&self, query: &Query, callback: QueryCallback) -> bool;

    /// The originating page-side call was aborted (navigation away, script
    /// context destroyed, or session teardown). Release anything held for
    /// `query_id`; no resolve/reject may follow.
    fn on_query_canceled(&self, _session: &BrowserSession, _frame: FrameId, _query_id: QueryId) {}
}

struct PendingQuery {
    frame: FrameId,
    completion: Arc<dyn QueryCompletion>,
}

type PendingTable = Mutex<HashMap<QueryId, PendingQuery>>;

/// Completion handle for one claimed query. Consuming `resolve`/`reject`
/// makes a second completion unrepresentable; a cancellation that raced
/// ahead turns the call into a logged no-op.
pub struct QueryCallback {
    query_id: QueryId,
    pending: Arc<PendingTable>,
}

impl QueryCallback {
    /// Deliver a successful result to the page-side caller.
    pub fn resolve(self, response: &str) {
        match self.take() {
            Some(entry) => entry.completion.succeed(self.query_id, response),
            None => debug!(
                "resolve for query {} dropped: already terminated",
                self.query_id
            ),
        }
    }

    /// Deliver a failure to the page-side caller.
    pub fn reject(self, error_code: i32, message: &str) {
        match self.take() {
            Some(entry) => entry.completion.fail(self.query_id, error_code, message),
            None => debug!(
                "reject for query {} dropped: already terminated",
                self.query_id
            ),
        }
    }

    fn take(&self) -> Option<PendingQuery> {
        self.pending.lock().unwrap().remove(&self.query_id)
    }
}

/// Routes one bridge channel pair to one handler instance.
pub struct MessageRouter {
    config: RouterConfig,
    handler: Arc<dyn QueryHandler>,
    pending: Arc<PendingTable>,
}

impl MessageRouter {
    pub fn new(config: RouterConfig, handler: Arc<dyn QueryHandler>) -> Self {
        Self {
            config,
            handler,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Number of queries currently awaiting a terminal event.
    pub fn pending_queries(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Deliver a query from the backend. Returns whether the handler
    /// claimed it; unclaimed queries leave no trace in the pending table.
    pub fn deliver_query(
        &self,
        session: &BrowserSession,
        frame: FrameId,
        query_id: QueryId,
        payload: &str,
        persistent: bool,
        completion: Arc<dyn QueryCompletion>,
    ) -> bool {
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.contains_key(&query_id) {
                warn!("query id {query_id} reused while still pending; refusing delivery");
                return false;
            }
            pending.insert(query_id, PendingQuery { frame, completion });
        }

        let query = Query {
            session: session.clone(),
            frame,
            query_id,
            payload: payload.to_string(),
            persistent,
        };
        let callback = QueryCallback {
            query_id,
            pending: self.pending.clone(),
        };

        let handled = self.handler.on_query(&query, callback);
        if !handled {
            // Declined; the entry may already be gone if the handler
            // completed the callback anyway before returning false.
            self.pending.lock().unwrap().remove(&query_id);
        }
        handled
    }

    /// Cancel one pending query. The handler's `on_query_canceled` runs only
    /// if the query had not already reached a terminal event.
    pub fn deliver_cancel(&self, session: &BrowserSession, frame: FrameId, query_id: QueryId) {
        let removed = self.pending.lock().unwrap().remove(&query_id);
        if removed.is_some() {
            self.handler.on_query_canceled(session, frame, query_id);
        } else {
            debug!("cancel for query {query_id} dropped: not pending");
        }
    }

    /// Cancel every pending query at once (navigation away or session
    /// teardown destroyed the originating script context).
    pub fn cancel_all(&self, session: &BrowserSession) {
        let drained: Vec<(QueryId, PendingQuery)> =
            self.pending.lock().unwrap().drain().collect();
        for (query_id, entry) in drained {
            self.handler.on_query_canceled(session, entry.frame, query_id);
        }
    }
}

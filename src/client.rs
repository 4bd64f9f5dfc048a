/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-session client context: the routers and load handlers serving one
//! browser session, and the dispatch fan-out between them.

use std::sync::Arc;

use log::debug;
use url::Url;

use crate::backend::{BridgeChannel, QueryCompletion};
use crate::load::LoadHandler;
use crate::router::MessageRouter;
use crate::session::BrowserSession;
use crate::types::{FrameId, QueryId};

/// Groups the message routers and load handlers attached to one session.
///
/// Built by the host before session creation, then owned by the session;
/// the event pump fans incoming backend events out through it.
#[derive(Default)]
pub struct ClientContext {
    routers: Vec<Arc<MessageRouter>>,
    load_handlers: Vec<Arc<dyn LoadHandler>>,
}

impl ClientContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a router. Each router is matched only against its own channel
    /// pair; multiple independent routers may coexist.
    pub fn add_message_router(&mut self, router: MessageRouter) {
        self.routers.push(Arc::new(router));
    }

    pub fn add_load_handler(&mut self, handler: impl LoadHandler + 'static) {
        self.load_handlers.push(Arc::new(handler));
    }

    /// Channel pairs page script must be able to call for this client.
    pub fn bridge_channels(&self) -> Vec<BridgeChannel> {
        self.routers
            .iter()
            .map(|r| BridgeChannel {
                query_function: r.config().query_function.clone(),
                cancel_function: r.config().cancel_function.clone(),
            })
            .collect()
    }

    /// Offer a query to every router registered for `channel`, in
    /// registration order, until one claims it.
    pub fn dispatch_query(
        &self,
        session: &BrowserSession,
        channel: &str,
        frame: FrameId,
        query_id: QueryId,
        payload: &str,
        persistent: bool,
        completion: Arc<dyn QueryCompletion>,
    ) -> bool {
        for router in &self.routers {
            if router.config().query_function != channel {
                continue;
            }
            if router.deliver_query(
                session,
                frame,
                query_id,
                payload,
                persistent,
                completion.clone(),
            ) {
                return true;
            }
        }
        debug!("query {query_id} on channel {channel:?} left unhandled");
        false
    }

    /// Route a page-initiated cancellation. `channel` names the pair's
    /// request function, matching the query it cancels.
    pub fn dispatch_query_canceled(
        &self,
        session: &BrowserSession,
        channel: &str,
        frame: FrameId,
        query_id: QueryId,
    ) {
        for router in &self.routers {
            if router.config().query_function == channel {
                router.deliver_cancel(session, frame, query_id);
            }
        }
    }

    /// Cancel every pending query on every router. Invoked when the script
    /// context that issued them is destroyed.
    pub fn cancel_all_queries(&self, session: &BrowserSession) {
        for router in &self.routers {
            router.cancel_all(session);
        }
    }

    pub fn notify_load_start(&self, session: &BrowserSession, frame: FrameId, url: &Url) {
        for handler in &self.load_handlers {
            handler.on_load_start(session, frame, url);
        }
    }

    pub fn notify_load_end(&self, session: &BrowserSession, frame: FrameId, url: &Url, status: i32) {
        for handler in &self.load_handlers {
            handler.on_load_end(session, frame, url, status);
        }
    }

    pub fn notify_load_error(
        &self,
        session: &BrowserSession,
        frame: FrameId,
        failed_url: &str,
        error_text: &str,
    ) {
        for handler in &self.load_handlers {
            handler.on_load_error(session, frame, failed_url, error_text);
        }
    }

    pub fn notify_loading_state_change(
        &self,
        session: &BrowserSession,
        is_loading: bool,
        can_go_back: bool,
        can_go_forward: bool,
    ) {
        for handler in &self.load_handlers {
            handler.on_loading_state_change(session, is_loading, can_go_back, can_go_forward);
        }
    }
}

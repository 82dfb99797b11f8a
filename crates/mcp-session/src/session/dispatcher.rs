//! Read loop, writer and routing for one session.
//!
//! A single read loop owns `Transport::receive` and routes every decoded
//! envelope. A single writer drains an unbounded queue into
//! `Transport::send`, so frames from concurrent handlers never interleave.
//! Inbound requests run on their own tasks; the read loop never waits on a
//! handler.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::context::RequestContext;
use super::pending::PendingRequestTable;
use super::registry::{HandlerRegistry, NotificationHandler, RequestHandler};
use super::role::Role;
use super::{Session, WeakSession};
use crate::config::{DuplicateHandlerPolicy, PreReadyPolicy};
use crate::protocol::codec;
use crate::transport::Transport;
use crate::types::{
    methods, CancelledParams, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, McpError, McpResult, RequestId,
};

pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    pending: PendingRequestTable,
    registry: HandlerRegistry,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    inflight: Mutex<HashMap<RequestId, CancellationToken>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    teardown: tokio::sync::Mutex<()>,
    started: AtomicBool,
}

impl Dispatcher {
    pub(crate) fn new(transport: Arc<dyn Transport>, policy: DuplicateHandlerPolicy) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            pending: PendingRequestTable::new(),
            registry: HandlerRegistry::new(policy),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            inflight: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            teardown: tokio::sync::Mutex::new(()),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn pending(&self) -> &PendingRequestTable {
        &self.pending
    }

    pub(crate) fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn inflight_count(&self) -> usize {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Spawn the read loop and the writer. Returns false if already started.
    ///
    /// Both loops hold the session weakly, so dropping every handle tears
    /// the session down.
    pub(crate) fn start(session: &Session) -> McpResult<bool> {
        let dispatcher = session.dispatcher();
        if dispatcher.started.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        let outbound = dispatcher
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| McpError::InvalidState("Writer queue already taken".to_string()))?;

        let span = tracing::info_span!("mcp_session", id = %session.id(), role = %session.role());
        let reader = tokio::spawn(
            read_loop(
                session.downgrade(),
                dispatcher.transport.clone(),
                dispatcher.shutdown.clone(),
            )
            .instrument(span.clone()),
        );
        let writer = tokio::spawn(
            write_loop(
                session.downgrade(),
                dispatcher.transport.clone(),
                dispatcher.shutdown.clone(),
                outbound,
            )
            .instrument(span),
        );

        dispatcher
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([reader, writer]);
        Ok(true)
    }

    /// Stop both loops, cancel in-flight handlers and fail every pending call.
    pub(crate) fn shutdown(&self, reason: &str) {
        self.shutdown.cancel();
        let failed = self.pending.fail_all(reason);
        if failed > 0 {
            tracing::debug!("Failed {failed} pending request(s): {reason}");
        }
    }

    /// Wait for both loops to finish and the transport to close.
    ///
    /// Concurrent callers queue on the same gate, so each returns only once
    /// teardown is complete.
    pub(crate) async fn await_teardown(&self) {
        let _gate = self.teardown.lock().await;
        if !self.is_started() {
            close_transport(&*self.transport).await;
        }
        while let Some(task) = self.next_task() {
            if let Err(e) = task.await {
                tracing::warn!("Session task ended abnormally: {e}");
            }
        }
    }

    fn next_task(&self) -> Option<JoinHandle<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    /// Encode one envelope and queue it for the writer.
    pub(crate) fn enqueue(&self, message: &JsonRpcMessage) -> McpResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(McpError::SessionClosed("Session is shutting down".to_string()));
        }
        let frame = codec::encode(message)?;
        self.outbound
            .send(frame)
            .map_err(|_| McpError::SessionClosed("Writer has stopped".to_string()))
    }

    pub(crate) fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.enqueue(&JsonRpcNotification::new(method, params).into())
    }

    /// Queue the single response for an inbound request.
    pub(crate) fn respond(&self, id: RequestId, outcome: McpResult<Value>) {
        let message: JsonRpcMessage = match outcome {
            Ok(result) => JsonRpcResponse::new(id.clone(), result).into(),
            Err(e) => e.to_json_rpc_error(id.clone()).into(),
        };

        match self.enqueue(&message) {
            Ok(()) => {}
            Err(McpError::Encoding(reason)) => {
                tracing::error!("Response to {id} could not be encoded: {reason}");
                let fallback = McpError::InternalError(format!("Response could not be encoded: {reason}"));
                if let Err(e) = self.enqueue(&fallback.to_json_rpc_error(id.clone()).into()) {
                    tracing::debug!("Dropping response to {id}: {e}");
                }
            }
            Err(e) => tracing::debug!("Dropping response to {id}: {e}"),
        }
    }

    /// Issue a request and wait for its outcome.
    ///
    /// The pending entry is removed on every exit path. If the caller stops
    /// waiting before an answer arrives, the peer is sent
    /// `notifications/cancelled` and any late response is discarded.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> McpResult<Value> {
        let id = self.pending.next_id();
        let completion = self.pending.register(id.clone(), method)?;
        let _guard = PendingGuard {
            dispatcher: self,
            id: id.clone(),
        };

        self.enqueue(&JsonRpcRequest::new(id.clone(), method, params).into())?;
        tracing::debug!("Sent request {id} ({method})");

        tokio::select! {
            outcome = completion => outcome.unwrap_or_else(|_| {
                Err(McpError::SessionClosed("Request was dropped".to_string()))
            }),
            _ = cancelled(cancel) => Err(McpError::Canceled),
            _ = expired(timeout) => Err(McpError::DeadlineExceeded(timeout.unwrap_or_default())),
        }
    }

    fn track_inbound(&self, id: &RequestId) -> Option<CancellationToken> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight.contains_key(id) {
            return None;
        }
        let token = self.shutdown.child_token();
        inflight.insert(id.clone(), token.clone());
        Some(token)
    }

    fn untrack_inbound(&self, id: &RequestId) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    fn cancel_inbound(&self, id: &RequestId) -> bool {
        match self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending.len())
            .field("inflight", &self.inflight_count())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.dispatcher.pending.cancel(&self.id) {
            return;
        }
        let params = CancelledParams {
            request_id: self.id.clone(),
            reason: Some("Caller stopped waiting".to_string()),
        };
        let sent = codec::to_payload(&params)
            .and_then(|payload| self.dispatcher.notify(methods::CANCELLED, payload));
        if let Err(e) = sent {
            tracing::debug!("Could not announce cancellation of {}: {e}", self.id);
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

async fn read_loop(session: WeakSession, transport: Arc<dyn Transport>, shutdown: CancellationToken) {
    tracing::debug!("Read loop started");

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = transport.receive() => received,
        };
        let Some(session) = session.upgrade() else {
            break;
        };

        match received {
            Ok(Some(frame)) => route_frame(&session, &frame),
            Ok(None) => {
                session.shutdown("Peer closed the connection");
                break;
            }
            Err(e) => {
                tracing::error!("Transport receive failed: {e}");
                session.shutdown(&format!("Transport failure: {e}"));
                break;
            }
        }
    }

    tracing::debug!("Read loop stopped");
}

async fn write_loop(
    session: WeakSession,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    loop {
        // Queued frames go out before shutdown is honoured.
        let frame = tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = shutdown.cancelled() => break,
        };

        if let Err(e) = transport.send(frame).await {
            tracing::error!("Transport send failed: {e}");
            if let Some(session) = session.upgrade() {
                session.shutdown(&format!("Transport failure: {e}"));
            }
            break;
        }
    }

    close_transport(&*transport).await;
    tracing::debug!("Writer stopped");
}

async fn close_transport(transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        tracing::debug!("Transport close failed: {e}");
    }
}

fn route_frame(session: &Session, frame: &[u8]) {
    match codec::decode(frame) {
        Ok(message) => route(session, message),
        Err(malformed) => match malformed.request_id {
            Some(id) => {
                tracing::warn!("Rejecting malformed request {id}: {}", malformed.error);
                session.dispatcher().respond(id, Err(malformed.error));
            }
            None => tracing::warn!("Dropping malformed frame: {malformed}"),
        },
    }
}

fn route(session: &Session, message: JsonRpcMessage) {
    let dispatcher = session.dispatcher();
    tracing::trace!("Routing inbound {}", message.kind());
    match message {
        JsonRpcMessage::Response(response) => {
            if !dispatcher.pending.resolve(&response.id, Ok(response.result)) {
                tracing::warn!("Discarding response {}: no request is pending", response.id);
            }
        }
        JsonRpcMessage::Error(error) => {
            if !dispatcher.pending.resolve(&error.id, Err(McpError::Rpc(error.error))) {
                tracing::warn!("Discarding error response {}: no request is pending", error.id);
            }
        }
        JsonRpcMessage::Request(request) => handle_request(session, request),
        JsonRpcMessage::Notification(notification) => handle_notification(session, notification),
    }
}

fn handle_request(session: &Session, request: JsonRpcRequest) {
    let dispatcher = session.dispatcher();
    let JsonRpcRequest { id, method, params, .. } = request;
    tracing::debug!("Received request {id} ({method})");

    match (session.role(), method.as_str()) {
        (_, methods::PING) => {
            dispatcher.respond(id, Ok(json!({})));
            return;
        }
        (Role::Server, methods::INITIALIZE) => {
            let outcome = session.accept_initialize(params);
            dispatcher.respond(id, outcome);
            return;
        }
        _ => {}
    }

    let state = session.state();
    if state.is_closed() {
        return;
    }
    let queued = !state.is_ready();
    if queued && session.config().pre_ready_policy == PreReadyPolicy::Reject {
        dispatcher.respond(
            id,
            Err(McpError::ServerNotInitialized(format!(
                "{method} received while session is {state}"
            ))),
        );
        return;
    }

    let handler = if queued {
        None
    } else {
        match dispatcher.registry.request_handler(&method) {
            Some(handler) => Some(handler),
            None => {
                dispatcher.respond(id, Err(McpError::MethodNotFound(method)));
                return;
            }
        }
    };

    let Some(token) = dispatcher.track_inbound(&id) else {
        tracing::warn!("Dropping request {id}: a request with this id is still in flight");
        return;
    };

    let session = session.clone();
    tokio::spawn(
        async move {
            let outcome = serve_request(&session, handler, id.clone(), method, params, token).await;
            let dispatcher = session.dispatcher();
            dispatcher.untrack_inbound(&id);
            if let Some(outcome) = outcome {
                dispatcher.respond(id, outcome);
            }
        }
        .in_current_span(),
    );
}

/// Run one inbound request to completion. `None` means the session closed
/// first and no response is owed.
async fn serve_request(
    session: &Session,
    handler: Option<Arc<dyn RequestHandler>>,
    id: RequestId,
    method: String,
    params: Option<Value>,
    token: CancellationToken,
) -> Option<McpResult<Value>> {
    let handler = match handler {
        Some(handler) => handler,
        None => {
            tracing::debug!("Holding request {id} ({method}) until the session is ready");
            if session.wait_until_settled().await.is_closed() {
                return None;
            }
            match session.dispatcher().registry.request_handler(&method) {
                Some(handler) => handler,
                None => return Some(Err(McpError::MethodNotFound(method))),
            }
        }
    };

    let limit = session.config().handler_timeout;
    let deadline = limit.map(|d| tokio::time::Instant::now() + d);
    let ctx = RequestContext::new(session.clone(), Some(id), method.clone(), token.clone(), deadline);

    let invocation = AssertUnwindSafe(handler.handle(ctx, params)).catch_unwind();
    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .unwrap_or_else(|_| Ok(Err(McpError::DeadlineExceeded(limit)))),
            None => invocation.await,
        }
    };

    tokio::select! {
        outcome = bounded => Some(match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!("Handler for {method} panicked: {message}");
                Err(McpError::InternalError(format!("Handler panicked: {message}")))
            }
        }),
        _ = token.cancelled() => {
            if session.dispatcher().is_shutting_down() {
                None
            } else {
                tracing::debug!("Handler for {method} cancelled by peer");
                Some(Err(McpError::Canceled))
            }
        }
    }
}

fn handle_notification(session: &Session, notification: JsonRpcNotification) {
    let dispatcher = session.dispatcher();
    let JsonRpcNotification { method, params, .. } = notification;

    match (session.role(), method.as_str()) {
        (Role::Server, methods::INITIALIZED | methods::INITIALIZED_LEGACY) => {
            session.complete_handshake();
            return;
        }
        (_, methods::CANCELLED) => {
            match params.map(serde_json::from_value::<CancelledParams>) {
                Some(Ok(cancel)) => {
                    if dispatcher.cancel_inbound(&cancel.request_id) {
                        tracing::debug!(
                            "Peer cancelled request {}: {}",
                            cancel.request_id,
                            cancel.reason.as_deref().unwrap_or("no reason given")
                        );
                    }
                }
                _ => tracing::warn!("Ignoring malformed {method} notification"),
            }
            return;
        }
        _ => {}
    }

    let Some(handler) = dispatcher.registry.notification_handler(&method) else {
        tracing::trace!("No handler for notification {method}");
        return;
    };
    spawn_notification(session, handler, method, params);
}

fn spawn_notification(
    session: &Session,
    handler: Arc<dyn NotificationHandler>,
    method: String,
    params: Option<Value>,
) {
    let token = session.dispatcher().shutdown.child_token();
    let ctx = RequestContext::new(session.clone(), None, method.clone(), token, None);
    tokio::spawn(
        async move {
            if let Err(panic) = AssertUnwindSafe(handler.handle(ctx, params)).catch_unwind().await {
                tracing::error!(
                    "Notification handler for {method} panicked: {}",
                    panic_message(&*panic)
                );
            }
        }
        .in_current_span(),
    );
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

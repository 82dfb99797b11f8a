//! Bidirectional MCP session engine.
//!
//! A [`Session`] owns one transport and runs the same dispatch engine for
//! both roles. Requests can be issued and served concurrently in either
//! direction once the handshake completes.

pub mod context;
mod dispatcher;
pub mod pending;
pub mod registry;
pub mod role;
pub mod state;

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::protocol::{codec, Negotiator};
use crate::transport::Transport;
use crate::types::{
    methods, Capabilities, ClientCapabilities, InitializeParams, InitializeResult, McpError,
    McpResult, PeerInfo, ServerCapabilities,
};

pub use context::RequestContext;
use dispatcher::Dispatcher;
pub use pending::PendingRequestTable;
pub use registry::{HandlerFn, HandlerRegistry, NotificationHandler, RequestHandler};
pub use role::Role;
use state::StateMachine;
pub use state::SessionState;

struct SessionInner {
    id: Uuid,
    role: Role,
    config: SessionConfig,
    state: StateMachine,
    capabilities: Mutex<Capabilities>,
    peer: OnceLock<PeerInfo>,
    close_reason: Mutex<Option<String>>,
    dispatcher: Dispatcher,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.state.close() {
            tracing::debug!("Session {} dropped without close", self.id);
            self.dispatcher.shutdown("Session dropped");
        }
    }
}

/// Handle to one MCP connection. Cheap to clone; all clones share the session.
///
/// Dropping the last handle closes the session as if [`Session::close`] had
/// been called, without waiting for teardown.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Non-owning reference held by the session's own background loops.
#[derive(Clone)]
pub(crate) struct WeakSession {
    inner: Weak<SessionInner>,
}

impl WeakSession {
    pub(crate) fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session { inner })
    }
}

impl Session {
    pub fn new(role: Role, transport: impl Transport, config: SessionConfig) -> Self {
        let capabilities = match role {
            Role::Client => Capabilities::Client(ClientCapabilities::default()),
            Role::Server => Capabilities::Server(ServerCapabilities::default()),
        };
        let dispatcher = Dispatcher::new(Arc::new(transport), config.duplicate_handler_policy);

        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                role,
                config,
                state: StateMachine::new(),
                capabilities: Mutex::new(capabilities),
                peer: OnceLock::new(),
                close_reason: Mutex::new(None),
                dispatcher,
            }),
        }
    }

    pub fn client(transport: impl Transport, config: SessionConfig) -> Self {
        Self::new(Role::Client, transport, config)
    }

    pub fn server(transport: impl Transport, config: SessionConfig) -> Self {
        Self::new(Role::Server, transport, config)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.current()
    }

    /// Available once the handshake has completed.
    pub fn peer_info(&self) -> Option<&PeerInfo> {
        self.inner.peer.get()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.inner
            .close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Outbound requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.inner.dispatcher.pending().len()
    }

    /// Inbound requests whose handler has not finished.
    pub fn inflight_requests(&self) -> usize {
        self.inner.dispatcher.inflight_count()
    }

    /// Request methods with a registered handler.
    pub fn request_methods(&self) -> Vec<String> {
        self.inner.dispatcher.registry().request_methods()
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Spawn the read loop and writer. Idempotent; must run inside a Tokio runtime.
    pub fn start(&self) -> McpResult<()> {
        if self.state().is_closed() {
            return Err(McpError::SessionClosed(self.close_reason().unwrap_or_default()));
        }
        if Dispatcher::start(self)? {
            tracing::info!("Session {} started as {}", self.id(), self.role());
        }
        Ok(())
    }

    /// Serve `method` with an async closure.
    pub fn register_request_handler<F, Fut>(&self, method: impl Into<String>, handler: F) -> McpResult<()>
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        self.register_request_service(method, Arc::new(HandlerFn(handler)))
    }

    pub fn register_request_service(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
    ) -> McpResult<()> {
        self.dispatcher().registry().register_request(method, handler)
    }

    pub fn register_notification_handler<F, Fut>(
        &self,
        method: impl Into<String>,
        handler: F,
    ) -> McpResult<()>
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.dispatcher()
            .registry()
            .register_notification(method, Arc::new(HandlerFn(handler)))
    }

    /// Set what this side advertises during the handshake.
    pub fn set_capabilities(&self, capabilities: impl Into<Capabilities>) -> McpResult<()> {
        let capabilities = capabilities.into();
        let matches_role = match self.role() {
            Role::Client => capabilities.as_client().is_some(),
            Role::Server => capabilities.as_server().is_some(),
        };
        if !matches_role {
            return Err(McpError::InvalidState(format!(
                "A {} session cannot advertise {} capabilities",
                self.role(),
                self.role().peer()
            )));
        }
        let state = self.state();
        if state != SessionState::Uninitialized {
            return Err(McpError::InvalidState(format!(
                "Capabilities are fixed once the session is {state}"
            )));
        }

        *self
            .inner
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = capabilities;
        Ok(())
    }

    /// Run the client side of the handshake. Starts the session if needed.
    ///
    /// Any failure closes the session.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        if self.role() != Role::Client {
            return Err(McpError::InvalidState(
                "Only a client session sends initialize".to_string(),
            ));
        }
        self.start()?;
        if !self
            .inner
            .state
            .transition(SessionState::Uninitialized, SessionState::Negotiating)
        {
            return Err(McpError::InvalidState(format!(
                "Cannot initialize a session that is {}",
                self.state()
            )));
        }

        match self.handshake().await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.shutdown(&format!("Handshake failed: {e}"));
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> McpResult<InitializeResult> {
        let config = self.config();
        let params = InitializeParams {
            protocol_version: config.protocol_version.clone(),
            capabilities: self.capabilities().as_client().cloned().unwrap_or_default(),
            client_info: config.implementation.clone(),
        };

        let raw = self
            .dispatcher()
            .call(methods::INITIALIZE, codec::to_payload(&params)?, config.request_timeout, None)
            .await?;
        let result: InitializeResult = serde_json::from_value(raw)
            .map_err(|e| McpError::Handshake(format!("Malformed initialize result: {e}")))?;

        let peer = Negotiator::new(config).accept(result.clone())?;
        self.set_peer(peer)?;
        self.dispatcher().notify(methods::INITIALIZED, None)?;

        if !self
            .inner
            .state
            .transition(SessionState::Negotiating, SessionState::Ready)
        {
            return Err(McpError::SessionClosed(
                self.close_reason().unwrap_or_else(|| "Closed during handshake".to_string()),
            ));
        }
        tracing::info!("Session {} ready", self.id());
        Ok(result)
    }

    /// Server side of `initialize`, answered inline by the read loop.
    pub(crate) fn accept_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = params
            .ok_or_else(|| McpError::InvalidParams("initialize requires params".to_string()))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| McpError::InvalidParams(e.to_string()))
            })?;

        if !self
            .inner
            .state
            .transition(SessionState::Uninitialized, SessionState::Negotiating)
        {
            return Err(McpError::InvalidRequest(format!(
                "initialize received while session is {}",
                self.state()
            )));
        }

        let capabilities = self.capabilities().as_server().cloned().unwrap_or_default();
        let (result, peer) = Negotiator::new(self.config()).respond(params, capabilities);
        self.set_peer(peer)?;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    /// Server side of `notifications/initialized`.
    pub(crate) fn complete_handshake(&self) {
        if self
            .inner
            .state
            .transition(SessionState::Negotiating, SessionState::Ready)
        {
            tracing::info!("Session {} ready", self.id());
        } else {
            tracing::warn!(
                "Ignoring initialized notification while session is {}",
                self.state()
            );
        }
    }

    fn set_peer(&self, peer: PeerInfo) -> McpResult<()> {
        self.inner
            .peer
            .set(peer)
            .map_err(|_| McpError::InvalidState("Peer already recorded".to_string()))
    }

    /// Issue a request and wait for the peer's answer, bounded by the
    /// configured request timeout.
    pub async fn call(&self, method: &str, params: impl Serialize) -> McpResult<Value> {
        self.call_inner(method, params, self.config().request_timeout, None)
            .await
    }

    /// Like [`call`](Self::call), failing with `Canceled` once `cancel` fires.
    pub async fn call_with_cancel(
        &self,
        method: &str,
        params: impl Serialize,
        cancel: &CancellationToken,
    ) -> McpResult<Value> {
        self.call_inner(method, params, self.config().request_timeout, Some(cancel))
            .await
    }

    /// Like [`call`](Self::call) with an explicit deadline.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: impl Serialize,
        timeout: Duration,
    ) -> McpResult<Value> {
        self.call_inner(method, params, Some(timeout), None).await
    }

    async fn call_inner(
        &self,
        method: &str,
        params: impl Serialize,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> McpResult<Value> {
        self.ensure_open_for(method)?;
        let params = codec::to_payload(&params)?;
        self.dispatcher().call(method, params, timeout, cancel).await
    }

    /// Fire-and-forget notification.
    pub fn notify(&self, method: &str, params: impl Serialize) -> McpResult<()> {
        self.ensure_open_for(method)?;
        self.dispatcher().notify(method, codec::to_payload(&params)?)
    }

    fn ensure_open_for(&self, method: &str) -> McpResult<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(McpError::SessionClosed(
                self.close_reason().unwrap_or_default(),
            )),
            _ if method == methods::PING => {
                self.start()?;
                Ok(())
            }
            state => Err(McpError::InvalidState(format!(
                "Cannot send {method} while session is {state}"
            ))),
        }
    }

    /// Wait until the handshake has either completed or the session closed.
    pub async fn wait_until_settled(&self) -> SessionState {
        self.inner.state.wait_for(SessionState::is_settled).await
    }

    /// Resolves once the session is closed, for whatever reason.
    pub async fn closed(&self) {
        self.inner.state.wait_for(SessionState::is_closed).await;
    }

    /// Close the session. Pending calls fail with `SessionClosed`, in-flight
    /// handlers are cancelled and the transport is closed.
    ///
    /// Idempotent. Every call, including concurrent ones, returns after the
    /// transport has been closed.
    pub async fn close(&self) -> McpResult<()> {
        self.shutdown("Session closed locally");
        self.dispatcher().await_teardown().await;
        Ok(())
    }

    /// Enter `Closed` and tear down. Only the first call has any effect.
    pub(crate) fn shutdown(&self, reason: &str) -> bool {
        if !self.inner.state.close() {
            return false;
        }
        *self
            .inner
            .close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
        tracing::info!("Session {} closed: {reason}", self.id());
        self.dispatcher().shutdown(reason);
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("state", &self.state())
            .field("dispatcher", self.dispatcher())
            .finish()
    }
}

//! Per-invocation context handed to handlers.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Session;
use crate::types::{PeerInfo, RequestId};

/// What a handler knows about the message it is serving.
#[derive(Clone)]
pub struct RequestContext {
    session: Session,
    request_id: Option<RequestId>,
    method: String,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub(crate) fn new(
        session: Session,
        request_id: Option<RequestId>,
        method: String,
        cancellation: CancellationToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            session,
            request_id,
            method,
            cancellation,
            deadline,
        }
    }

    /// The session the message arrived on. Handlers may issue their own
    /// calls and notifications through it.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    /// `None` for notifications.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Set once the peer cancels the request or the session closes.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn peer_info(&self) -> Option<&PeerInfo> {
        self.session.peer_info()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("session", &self.session.id())
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

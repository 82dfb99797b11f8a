//! Connection state machine.

use tokio::sync::watch;

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Negotiating,
    Ready,
    Closed,
}

impl SessionState {
    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }

    /// Ready or Closed: nothing more will happen to the handshake.
    pub fn is_settled(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Negotiating => "negotiating",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Watchable holder of the current state. All transitions are compare-and-set.
#[derive(Debug)]
pub(crate) struct StateMachine {
    tx: watch::Sender<SessionState>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Uninitialized);
        Self { tx }
    }

    pub(crate) fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Move `from` → `to`. Returns false, changing nothing, if the state was not `from`.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let moved = self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!("Session state {from} -> {to}");
        }
        moved
    }

    /// Enter `Closed`. Returns true only for the call that performed the transition.
    pub(crate) fn close(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        })
    }

    /// Wait until the state satisfies `done`, returning that state.
    pub(crate) async fn wait_for(&self, done: impl Fn(SessionState) -> bool) -> SessionState {
        let mut rx = self.tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if done(state) {
                return state;
            }
            if rx.changed().await.is_err() {
                return SessionState::Closed;
            }
        }
    }
}

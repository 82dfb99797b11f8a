//! Outbound requests awaiting a response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::types::{McpError, McpResult, RequestId};

pub(crate) type Completion = oneshot::Receiver<McpResult<Value>>;

#[derive(Debug)]
struct PendingRequest {
    method: String,
    issued_at: Instant,
    completion: oneshot::Sender<McpResult<Value>>,
}

#[derive(Debug, Default)]
struct Entries {
    requests: HashMap<RequestId, PendingRequest>,
    closed: Option<String>,
}

/// Maps locally issued request ids to the caller waiting on them.
///
/// Every entry is completed exactly once: by a matching response, by the
/// caller abandoning it, or by [`fail_all`](Self::fail_all) when the session
/// closes. Once failed, the table refuses new registrations.
#[derive(Debug)]
pub struct PendingRequestTable {
    next_id: AtomicI64,
    entries: Mutex<Entries>,
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh id, unique for the lifetime of the session.
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register(&self, id: RequestId, method: &str) -> McpResult<Completion> {
        let mut entries = self.lock();
        if let Some(reason) = &entries.closed {
            return Err(McpError::SessionClosed(reason.clone()));
        }
        if entries.requests.contains_key(&id) {
            return Err(McpError::InvalidRequest(format!("Request {id} is already pending")));
        }

        let (tx, rx) = oneshot::channel();
        entries.requests.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                issued_at: Instant::now(),
                completion: tx,
            },
        );
        Ok(rx)
    }

    /// Complete the entry for `id`. Returns false when no entry exists, which
    /// covers duplicate, late and unsolicited responses.
    pub fn resolve(&self, id: &RequestId, outcome: McpResult<Value>) -> bool {
        let Some(entry) = self.lock().requests.remove(id) else {
            return false;
        };

        tracing::debug!(
            "Request {id} ({}) completed in {:?}",
            entry.method,
            entry.issued_at.elapsed()
        );
        if entry.completion.send(outcome).is_err() {
            tracing::debug!("Caller for request {id} is no longer waiting");
        }
        true
    }

    /// Drop the entry for `id` without completing it.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.lock().requests.remove(id).is_some()
    }

    /// Fail every entry with `SessionClosed` and refuse further registrations.
    /// Returns the number of entries failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut entries = self.lock();
            entries.closed.get_or_insert_with(|| reason.to_string());
            entries.requests.drain().collect()
        };

        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry
                .completion
                .send(Err(McpError::SessionClosed(reason.to_string())));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.lock().requests.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_unique_and_increasing() {
        let table = PendingRequestTable::new();
        assert_eq!(table.next_id(), RequestId::Number(1));
        assert_eq!(table.next_id(), RequestId::Number(2));
    }

    #[tokio::test]
    async fn resolve_completes_exactly_once() {
        let table = PendingRequestTable::new();
        let id = table.next_id();
        let rx = table.register(id.clone(), "tools/list").unwrap();

        assert!(table.resolve(&id, Ok(json!({"ok": true}))));
        assert!(!table.resolve(&id, Ok(json!({"ok": false}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = PendingRequestTable::new();
        let _rx = table.register(RequestId::from(7), "ping").unwrap();
        assert!(table.register(RequestId::from(7), "ping").is_err());
    }

    #[test]
    fn cancelled_entry_ignores_late_response() {
        let table = PendingRequestTable::new();
        let id = table.next_id();
        let _rx = table.register(id.clone(), "slow").unwrap();
        assert!(table.contains(&id));

        assert!(table.cancel(&id));
        assert!(!table.contains(&id));
        assert!(!table.resolve(&id, Ok(Value::Null)));
    }

    #[tokio::test]
    async fn fail_all_closes_the_table() {
        let table = PendingRequestTable::new();
        let receivers: Vec<_> = (0..3)
            .map(|_| table.register(table.next_id(), "slow").unwrap())
            .collect();

        assert_eq!(table.fail_all("peer went away"), 3);
        for rx in receivers {
            let err = rx.await.unwrap().unwrap_err();
            assert!(matches!(err, McpError::SessionClosed(ref r) if r == "peer went away"));
        }

        let err = table.register(table.next_id(), "late").unwrap_err();
        assert!(matches!(err, McpError::SessionClosed(_)));
        assert_eq!(table.fail_all("again"), 0);
    }
}

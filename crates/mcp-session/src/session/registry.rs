//! Method handler registration and lookup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::context::RequestContext;
use crate::config::DuplicateHandlerPolicy;
use crate::types::{McpError, McpResult};

/// Answers inbound requests for one method.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> McpResult<Value>;
}

/// Consumes inbound notifications for one method.
#[async_trait]
pub trait NotificationHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>);
}

/// Adapts an async closure to either handler trait.
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> McpResult<Value> {
        (self.0)(ctx, params).await
    }
}

#[async_trait]
impl<F, Fut> NotificationHandler for HandlerFn<F>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) {
        (self.0)(ctx, params).await
    }
}

type Table<H> = RwLock<HashMap<String, Arc<H>>>;

/// Handlers keyed by method name. Requests and notifications live in
/// separate namespaces.
pub struct HandlerRegistry {
    policy: DuplicateHandlerPolicy,
    requests: Table<dyn RequestHandler>,
    notifications: Table<dyn NotificationHandler>,
}

impl HandlerRegistry {
    pub fn new(policy: DuplicateHandlerPolicy) -> Self {
        Self {
            policy,
            requests: RwLock::new(HashMap::new()),
            notifications: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_request(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
    ) -> McpResult<()> {
        insert(&self.requests, self.policy, method.into(), handler)
    }

    pub fn register_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) -> McpResult<()> {
        insert(&self.notifications, self.policy, method.into(), handler)
    }

    pub fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        lookup(&self.requests, method)
    }

    pub fn notification_handler(&self, method: &str) -> Option<Arc<dyn NotificationHandler>> {
        lookup(&self.notifications, method)
    }

    /// Request methods with a handler, sorted.
    pub fn request_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        methods.sort();
        methods
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("policy", &self.policy)
            .field("requests", &self.request_methods())
            .finish_non_exhaustive()
    }
}

fn insert<H: ?Sized>(
    table: &Table<H>,
    policy: DuplicateHandlerPolicy,
    method: String,
    handler: Arc<H>,
) -> McpResult<()> {
    let mut handlers = table.write().unwrap_or_else(PoisonError::into_inner);
    if handlers.contains_key(&method) {
        match policy {
            DuplicateHandlerPolicy::Reject => {
                return Err(McpError::HandlerAlreadyRegistered(method));
            }
            DuplicateHandlerPolicy::Replace => {
                tracing::debug!("Replacing handler for {method}");
            }
        }
    }
    handlers.insert(method, handler);
    Ok(())
}

// Clones the Arc so the lock is released before the handler runs.
fn lookup<H: ?Sized>(table: &Table<H>, method: &str) -> Option<Arc<H>> {
    table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(method)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler(tag: &'static str) -> Arc<dyn RequestHandler> {
        Arc::new(HandlerFn(move |_ctx: RequestContext, _params: Option<Value>| async move {
            Ok(json!(tag))
        }))
    }

    fn same(a: &Arc<dyn RequestHandler>, b: &Arc<dyn RequestHandler>) -> bool {
        std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
    }

    #[test]
    fn replace_policy_keeps_last_registration() {
        let registry = HandlerRegistry::new(DuplicateHandlerPolicy::Replace);
        let first = handler("first");
        let second = handler("second");

        registry.register_request("echo", first.clone()).unwrap();
        registry.register_request("echo", second.clone()).unwrap();

        let found = registry.request_handler("echo").unwrap();
        assert!(same(&found, &second));
        assert!(!same(&found, &first));
    }

    #[test]
    fn reject_policy_keeps_first_registration() {
        let registry = HandlerRegistry::new(DuplicateHandlerPolicy::Reject);
        let first = handler("first");

        registry.register_request("echo", first.clone()).unwrap();
        let err = registry.register_request("echo", handler("second")).unwrap_err();

        assert!(matches!(err, McpError::HandlerAlreadyRegistered(ref m) if m == "echo"));
        assert!(same(&registry.request_handler("echo").unwrap(), &first));
    }

    #[test]
    fn requests_and_notifications_are_separate() {
        let registry = HandlerRegistry::new(DuplicateHandlerPolicy::Reject);
        registry.register_request("shared", handler("req")).unwrap();
        registry
            .register_notification(
                "shared",
                Arc::new(HandlerFn(|_ctx: RequestContext, _params: Option<Value>| async {})),
            )
            .unwrap();

        assert!(registry.request_handler("shared").is_some());
        assert!(registry.notification_handler("shared").is_some());
        assert!(registry.request_handler("missing").is_none());
        assert_eq!(registry.request_methods(), vec!["shared".to_string()]);
    }
}

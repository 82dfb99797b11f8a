//! Tool registration and dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::{RequestContext, RequestHandler, Session};
use crate::types::{
    methods, McpError, McpResult, ServerCapabilities, ToolCallParams, ToolDefinition,
    ToolListResult,
};

use super::{echo, timestamp};

/// Serves `tools/call` for the built-in tool set.
pub struct ToolRegistry;

impl ToolRegistry {
    pub fn list_tools() -> Vec<ToolDefinition> {
        vec![echo::definition(), timestamp::definition()]
    }

    pub fn call(name: &str, arguments: Option<Value>) -> McpResult<Value> {
        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));

        match name {
            echo::NAME => echo::execute(args),
            timestamp::NAME => timestamp::execute(args),
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }

    /// Register `tools/list` and `tools/call` on a server session and
    /// advertise the tools capability. Call before the handshake.
    pub fn install(session: &Session) -> McpResult<()> {
        session.set_capabilities(ServerCapabilities::tools_only(true))?;

        session.register_request_handler(methods::TOOLS_LIST, |_ctx, _params| async {
            serde_json::to_value(ToolListResult {
                tools: ToolRegistry::list_tools(),
                next_cursor: None,
            })
            .map_err(|e| McpError::InternalError(e.to_string()))
        })?;
        session.register_request_service(methods::TOOLS_CALL, Arc::new(ToolRegistry))
    }
}

#[async_trait]
impl RequestHandler for ToolRegistry {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> McpResult<Value> {
        let params: ToolCallParams = params
            .ok_or_else(|| McpError::InvalidParams("tools/call requires params".to_string()))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| McpError::InvalidParams(format!("Invalid parameters: {e}")))
            })?;

        tracing::debug!("Calling tool {} for session {}", params.name, ctx.session_id());
        ToolRegistry::call(&params.name, params.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use serde_json::json;

    #[test]
    fn lists_both_tools() {
        let names: Vec<_> = ToolRegistry::list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "timestamp"]);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let result = ToolRegistry::call("timestamp", None).unwrap();
        let raw = result["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(raw).is_ok());
    }

    #[test]
    fn unknown_tool_maps_to_method_not_found() {
        let err = ToolRegistry::call("nope", Some(json!({}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotFound);
    }
}

//! Typed convenience wrapper over a client session.

use serde_json::{json, Value};

use crate::config::SessionConfig;
use crate::session::Session;
use crate::transport::Transport;
use crate::types::{
    methods, InitializeResult, McpError, McpResult, ToolCallParams, ToolDefinition,
    ToolListParams, ToolListResult,
};

/// Client for servers exposing the `tools/*` surface.
#[derive(Debug, Clone)]
pub struct McpClient {
    session: Session,
}

impl McpClient {
    pub fn new(transport: impl Transport, config: SessionConfig) -> Self {
        Self {
            session: Session::client(transport, config),
        }
    }

    #[cfg(feature = "tcp")]
    pub async fn connect_tcp(addr: &str, config: SessionConfig) -> McpResult<Self> {
        let transport = crate::transport::TcpTransport::connect(addr).await?;
        tracing::info!("Connected to {addr}");
        Ok(Self::new(transport, config))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        self.session.initialize().await
    }

    pub async fn list_tools(&self) -> McpResult<Vec<ToolDefinition>> {
        let raw = self
            .session
            .call(methods::TOOLS_LIST, ToolListParams::default())
            .await?;
        let result: ToolListResult = serde_json::from_value(raw)
            .map_err(|e| McpError::InternalError(format!("Malformed tools/list result: {e}")))?;
        Ok(result.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.session.call(methods::TOOLS_CALL, params).await
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.session.call(methods::PING, json!({})).await.map(|_| ())
    }

    pub async fn close(&self) -> McpResult<()> {
        self.session.close().await
    }
}

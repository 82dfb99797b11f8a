//! MCP capability and initialization types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Protocol revision this crate prefers when nothing else is configured.
pub const MCP_VERSION: &str = "2024-11-05";
/// Protocol revisions accepted by default, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];
pub const CRATE_NAME: &str = "mcp-session";
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for Implementation {
    fn default() -> Self {
        Self::new(CRATE_NAME, CRATE_VERSION)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// Flags this crate does not model, carried through untouched.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingCapability {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    #[serde(default)]
    pub subscribe: bool,
    #[serde(default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Capabilities advertised by one side of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Capabilities {
    Client(ClientCapabilities),
    Server(ServerCapabilities),
}

impl From<ClientCapabilities> for Capabilities {
    fn from(c: ClientCapabilities) -> Self {
        Capabilities::Client(c)
    }
}

impl From<ServerCapabilities> for Capabilities {
    fn from(c: ServerCapabilities) -> Self {
        Capabilities::Server(c)
    }
}

impl Capabilities {
    pub fn as_client(&self) -> Option<&ClientCapabilities> {
        match self {
            Capabilities::Client(c) => Some(c),
            Capabilities::Server(_) => None,
        }
    }

    pub fn as_server(&self) -> Option<&ServerCapabilities> {
        match self {
            Capabilities::Server(c) => Some(c),
            Capabilities::Client(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// What a session learned about its peer during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub protocol_version: String,
    pub capabilities: Capabilities,
    pub implementation: Implementation,
    pub instructions: Option<String>,
}

impl ServerCapabilities {
    /// Capabilities of a server that only exposes tools.
    pub fn tools_only(list_changed: bool) -> Self {
        Self {
            tools: Some(ToolsCapability { list_changed }),
            ..Self::default()
        }
    }
}

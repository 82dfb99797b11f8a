//! MCP session engine: bidirectional JSON-RPC 2.0 sessions for the Model
//! Context Protocol, with pluggable transports.

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::SessionConfig;
pub use session::{RequestContext, Role, Session, SessionState};
pub use transport::{ChannelTransport, Transport};
pub use types::{McpError, McpResult};

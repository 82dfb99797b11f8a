//! Error types and JSON-RPC error codes for MCP sessions.

use std::time::Duration;

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Bounds of the range JSON-RPC reserves for itself.
    pub const RESERVED_MIN: i32 = -32768;
    pub const RESERVED_MAX: i32 = -32000;
}

/// Session-level error codes, taken from the implementation-defined server
/// error range (-32099..=-32000) plus the MCP cancellation code.
pub mod mcp_error_codes {
    pub const CONNECTION_CLOSED: i32 = -32000;
    pub const REQUEST_TIMEOUT: i32 = -32001;
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;
    pub const REQUEST_CANCELLED: i32 = -32800;

    pub const SERVER_ERROR_MIN: i32 = -32099;
    pub const SERVER_ERROR_MAX: i32 = -32000;
}

/// Closed classification of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ConnectionClosed,
    RequestTimeout,
    ServerNotInitialized,
    RequestCancelled,
    /// Other codes in -32099..=-32000.
    ServerDefined,
    /// Reserved by JSON-RPC but not assigned.
    Reserved,
    /// Anything outside the reserved range.
    Application,
}

impl ErrorKind {
    pub fn from_code(code: i32) -> Self {
        use error_codes::*;
        use mcp_error_codes::*;
        match code {
            PARSE_ERROR => ErrorKind::ParseError,
            INVALID_REQUEST => ErrorKind::InvalidRequest,
            METHOD_NOT_FOUND => ErrorKind::MethodNotFound,
            INVALID_PARAMS => ErrorKind::InvalidParams,
            INTERNAL_ERROR => ErrorKind::InternalError,
            CONNECTION_CLOSED => ErrorKind::ConnectionClosed,
            REQUEST_TIMEOUT => ErrorKind::RequestTimeout,
            SERVER_NOT_INITIALIZED => ErrorKind::ServerNotInitialized,
            REQUEST_CANCELLED => ErrorKind::RequestCancelled,
            SERVER_ERROR_MIN..=SERVER_ERROR_MAX => ErrorKind::ServerDefined,
            RESERVED_MIN..=RESERVED_MAX => ErrorKind::Reserved,
            _ => ErrorKind::Application,
        }
    }
}

/// Whether `code` is free for application-defined errors.
pub fn is_application_code(code: i32) -> bool {
    ErrorKind::from_code(code) == ErrorKind::Application
}

/// All errors that can occur in an MCP session.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Frame shape is neither a request, a response, nor a notification.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Server not initialized: {0}")]
    ServerNotInitialized(String),

    #[error("Request cancelled")]
    Canceled,

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Unsupported protocol version {requested}; supported: {supported}")]
    UnsupportedProtocolVersion { requested: String, supported: String },

    #[error("Handler already registered for method: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// An error response returned by the remote peer.
    #[error("{} (code {})", .0.message, .0.code)]
    Rpc(JsonRpcErrorObject),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) | McpError::Json(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) | McpError::InvalidEnvelope(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_)
            | McpError::Encoding(_)
            | McpError::InvalidState(_)
            | McpError::Handshake(_)
            | McpError::UnsupportedProtocolVersion { .. }
            | McpError::HandlerAlreadyRegistered(_)
            | McpError::Transport(_)
            | McpError::Io(_) => INTERNAL_ERROR,
            McpError::ServerNotInitialized(_) => SERVER_NOT_INITIALIZED,
            McpError::Canceled => REQUEST_CANCELLED,
            McpError::DeadlineExceeded(_) => REQUEST_TIMEOUT,
            McpError::SessionClosed(_) => CONNECTION_CLOSED,
            McpError::Rpc(obj) => obj.code,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code())
    }

    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            McpError::Rpc(obj) => obj.clone(),
            other => JsonRpcErrorObject {
                code: other.code(),
                message: other.to_string(),
                data: None,
            },
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError::from_object(id, self.to_error_object())
    }

    /// Build an application-defined error to return from a handler.
    pub fn application(code: i32, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        McpError::Rpc(JsonRpcErrorObject {
            code,
            message: message.into(),
            data,
        })
    }
}

impl From<JsonRpcErrorObject> for McpError {
    fn from(obj: JsonRpcErrorObject) -> Self {
        McpError::Rpc(obj)
    }
}

pub type McpResult<T> = Result<T, McpError>;

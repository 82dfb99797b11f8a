//! JSON-RPC envelope validation.

use serde_json::Value;

use crate::types::{McpError, McpResult, JSONRPC_VERSION};

/// Validate the `jsonrpc` member of an inbound frame.
pub fn validate_version(version: Option<&Value>) -> McpResult<()> {
    match version {
        Some(Value::String(v)) if v == JSONRPC_VERSION => Ok(()),
        Some(other) => Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got {other}"
        ))),
        None => Err(McpError::InvalidRequest(
            "Missing jsonrpc version".to_string(),
        )),
    }
}

/// Method names must be non-empty.
pub fn validate_method(method: &str) -> McpResult<()> {
    if method.is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Params, when present, must be structured. A literal `null` counts as absent.
pub fn validate_params(params: Option<Value>) -> McpResult<Option<Value>> {
    match params {
        None | Some(Value::Null) => Ok(None),
        Some(v @ (Value::Object(_) | Value::Array(_))) => Ok(Some(v)),
        Some(other) => Err(McpError::InvalidRequest(format!(
            "Params must be an object or array, got {other}"
        ))),
    }
}

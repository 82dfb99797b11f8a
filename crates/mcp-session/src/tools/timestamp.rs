//! Tool: timestamp. Current server time.

use serde_json::{json, Value};

use crate::types::{McpResult, ToolDefinition};

pub const NAME: &str = "timestamp";

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: NAME.to_string(),
        description: Some("Returns the current server timestamp".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {}
        }),
    }
}

/// Arguments are ignored.
pub fn execute(_args: Value) -> McpResult<Value> {
    Ok(json!({ "timestamp": chrono::Utc::now().to_rfc3339() }))
}

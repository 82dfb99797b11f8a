//! Tool: echo. Returns the given message unchanged.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::{McpError, McpResult, ToolDefinition};

pub const NAME: &str = "echo";

#[derive(Debug, Deserialize)]
struct EchoParams {
    message: String,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: NAME.to_string(),
        description: Some("Echoes back the input message".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "The message to echo back" }
            },
            "required": ["message"]
        }),
    }
}

pub fn execute(args: Value) -> McpResult<Value> {
    let params: EchoParams = serde_json::from_value(args)
        .map_err(|_| McpError::InvalidParams("Missing or invalid 'message' parameter".to_string()))?;

    Ok(json!({ "message": params.message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_message() {
        assert_eq!(execute(json!({"message": "hi"})).unwrap(), json!({"message": "hi"}));
    }

    #[test]
    fn non_string_message_is_invalid() {
        let err = execute(json!({"message": 42})).unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
        assert!(execute(json!({})).is_err());
    }
}

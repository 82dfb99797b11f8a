//! Wire codec. Turns transport frames into envelopes and back.
//!
//! Classification is purely by shape: a `method` member makes a request (with
//! `id`) or a notification (without), otherwise exactly one of `result` and
//! `error` makes a response. The codec holds no state and is safe to call from
//! any number of tasks at once.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{
    JsonRpcError, JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, McpError, McpResult, RequestId,
};

use super::validator;

/// A frame that could not be decoded into an envelope.
#[derive(Debug)]
pub struct MalformedFrame {
    /// Present when the frame looked like a request and carried a usable id,
    /// meaning an error response can still be correlated.
    pub request_id: Option<RequestId>,
    pub error: McpError,
}

impl MalformedFrame {
    fn new(request_id: Option<RequestId>, error: McpError) -> Self {
        Self { request_id, error }
    }
}

impl std::fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.request_id {
            Some(id) => write!(f, "{} (request id {id})", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Serialize an envelope into one frame.
pub fn encode(message: &JsonRpcMessage) -> McpResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| McpError::Encoding(e.to_string()))
}

/// Convert caller-supplied params or results into a wire payload.
///
/// `null` maps to `None` so unit params are omitted from the envelope.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> McpResult<Option<Value>> {
    match serde_json::to_value(value).map_err(|e| McpError::Encoding(e.to_string()))? {
        Value::Null => Ok(None),
        v => Ok(Some(v)),
    }
}

/// Parse one frame into an envelope.
pub fn decode(frame: &[u8]) -> Result<JsonRpcMessage, MalformedFrame> {
    let value: Value = serde_json::from_slice(frame)
        .map_err(|e| MalformedFrame::new(None, McpError::ParseError(e.to_string())))?;

    match value {
        Value::Object(obj) => classify(obj),
        Value::Array(_) => Err(MalformedFrame::new(
            None,
            McpError::InvalidRequest("Batch frames are not supported".to_string()),
        )),
        other => Err(MalformedFrame::new(
            None,
            McpError::InvalidEnvelope(format!("Frame is not a JSON object: {other}")),
        )),
    }
}

fn classify(mut obj: Map<String, Value>) -> Result<JsonRpcMessage, MalformedFrame> {
    let is_call = obj.contains_key("method");

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => match serde_json::from_value::<RequestId>(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                return Err(MalformedFrame::new(
                    None,
                    McpError::InvalidRequest(format!("Unusable id: {e}")),
                ))
            }
        },
    };

    // Only request-shaped frames get an error reply; answering a response would
    // start a loop between the peers.
    let reply_to = if is_call { id.clone() } else { None };
    let malformed = |error: McpError| MalformedFrame::new(reply_to.clone(), error);

    validator::validate_version(obj.get("jsonrpc")).map_err(malformed)?;

    let result = obj.remove("result");
    let error = obj.remove("error");

    if is_call {
        if result.is_some() || error.is_some() {
            return Err(malformed(McpError::InvalidEnvelope(
                "Frame carries a method together with a result or error".to_string(),
            )));
        }

        let method = match obj.remove("method") {
            Some(Value::String(m)) => m,
            _ => {
                return Err(malformed(McpError::InvalidRequest(
                    "Method must be a string".to_string(),
                )))
            }
        };
        validator::validate_method(&method).map_err(malformed)?;
        let params = validator::validate_params(obj.remove("params")).map_err(malformed)?;

        return Ok(match id {
            Some(id) => JsonRpcMessage::Request(JsonRpcRequest::new(id, method, params)),
            None => JsonRpcMessage::Notification(JsonRpcNotification::new(method, params)),
        });
    }

    let id = id.ok_or_else(|| {
        MalformedFrame::new(
            None,
            McpError::InvalidEnvelope("Response without an id".to_string()),
        )
    })?;

    match (result, error) {
        (Some(_), Some(_)) => Err(MalformedFrame::new(
            None,
            McpError::InvalidEnvelope(format!(
                "Response {id} carries both a result and an error"
            )),
        )),
        (None, None) => Err(MalformedFrame::new(
            None,
            McpError::InvalidEnvelope(format!(
                "Frame {id} has neither a method, a result, nor an error"
            )),
        )),
        (Some(result), None) => Ok(JsonRpcMessage::Response(JsonRpcResponse::new(id, result))),
        (None, Some(error)) => serde_json::from_value::<JsonRpcErrorObject>(error)
            .map(|error| JsonRpcMessage::Error(JsonRpcError::from_object(id, error)))
            .map_err(|e| {
                MalformedFrame::new(
                    None,
                    McpError::InvalidEnvelope(format!("Malformed error object: {e}")),
                )
            }),
    }
}

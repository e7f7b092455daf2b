//! JSON-RPC 2.0 frames exchanged with tool servers.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtocolError;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcResponse {
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// What a decoded inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Response(JsonRpcResponse),
    /// A request or notification initiated by the server.
    ServerMessage { method: String },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, deserialize_with = "present")]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// Keeps `"result": null` distinct from a missing `result`.
fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<serde_json::Value>, D::Error> {
    serde_json::Value::deserialize(d).map(Some)
}

/// Decode one inbound frame.
///
/// Ids may be numbers or strings holding a decimal number.
pub fn decode_frame(text: &str) -> Result<InboundFrame, ProtocolError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if let Some(method) = raw.method {
        return Ok(InboundFrame::ServerMessage { method });
    }

    let id = match raw.id {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ProtocolError::Malformed("response has no usable id".into()))?;

    if raw.result.is_none() && raw.error.is_none() {
        return Err(ProtocolError::Malformed(format!(
            "response {id} has neither result nor error"
        )));
    }

    Ok(InboundFrame::Response(JsonRpcResponse {
        id,
        result: raw.result,
        error: raw.error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request_with_params() {
        let req = JsonRpcRequest::new(
            1,
            "tools/call",
            Some(serde_json::json!({"name": "read", "arguments": {}})),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["method"], "tools/call");
        assert!(json["params"].is_object());
    }

    #[test]
    fn serialize_request_without_params() {
        let req = JsonRpcRequest::new(2, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 2);
        assert!(json.get("params").is_none());
    }

    #[test]
    fn serialized_request_is_single_line() {
        let req = JsonRpcRequest::new(3, "x", Some(serde_json::json!({"text": "a\nb"})));
        let line = serde_json::to_string(&req).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"id\":3"));
    }

    #[test]
    fn decode_response_with_result() {
        let frame = decode_frame(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        match frame {
            InboundFrame::Response(resp) => {
                assert_eq!(resp.id, 1);
                assert!(resp.result.is_some());
                assert!(resp.error.is_none());
            }
            other => panic!("Expected response, got: {other:?}"),
        }
    }

    #[test]
    fn decode_response_with_error() {
        let frame = decode_frame(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("Expected response");
        };
        let err = resp.error.unwrap();
        assert_eq!(err.code, Some(-32601));
        assert_eq!(err.message, "Method not found");
        assert!(err.data.is_none());
    }

    #[test]
    fn decode_error_without_code() {
        let frame = decode_frame(r#"{"id":9,"error":{"message":"boom"}}"#).unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("Expected response");
        };
        assert_eq!(resp.error.unwrap().code, None);
    }

    #[test]
    fn decode_string_id() {
        let frame = decode_frame(r#"{"id":"42","result":true}"#).unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("Expected response");
        };
        assert_eq!(resp.id, 42);
    }

    #[test]
    fn decode_null_result() {
        let frame = decode_frame(r#"{"id":5,"result":null}"#).unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("Expected response");
        };
        assert_eq!(resp.result, Some(serde_json::Value::Null));
    }

    #[test]
    fn decode_server_notification() {
        let frame =
            decode_frame(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#)
                .unwrap();
        assert_eq!(
            frame,
            InboundFrame::ServerMessage {
                method: "notifications/tools/list_changed".into()
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_frame("not json at all").is_err());
        assert!(decode_frame(r#"{"result":1}"#).is_err());
        assert!(decode_frame(r#"{"id":"abc","result":1}"#).is_err());
        assert!(decode_frame(r#"{"id":3}"#).is_err());
    }

    #[test]
    fn serialize_notification() {
        let notif =
            JsonRpcNotification::new("notifications/initialized", Some(serde_json::json!({})));
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
    }
}

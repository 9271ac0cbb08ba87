//! JSON-RPC 2.0 message types.
//!
//! One request or response per message; the transports only differ in
//! framing (lines on stdio, bodies over HTTP, events over SSE).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request or notification (no `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Returns true for notifications, which get no response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request id.
    pub id: Option<Value>,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a success response.
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error codes used by the tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed JSON.
    ParseError,
    /// Unknown method.
    MethodNotFound,
    /// Validation failure on parameters.
    InvalidParams,
    /// Serialization or other internal failure.
    InternalError,
    /// Tool-level failure (unknown tool, missing row, transient backend).
    ToolError,
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::ParseError => -32700,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ToolError => -32000,
        }
    }
}

/// A JSON-RPC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Builds an error with a code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Standard parse-error payload.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError, "Parse error")
    }

    /// Standard method-not-found payload.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }
}

/// Maps a core error onto the wire code space.
impl From<crate::Error> for JsonRpcError {
    fn from(error: crate::Error) -> Self {
        let code = match &error {
            crate::Error::BadRequest(_) => ErrorCode::InvalidParams,
            crate::Error::NotFound(_) | crate::Error::Transient { .. } => ErrorCode::ToolError,
            crate::Error::Fatal(_) => ErrorCode::InternalError,
        };
        Self::new(code, error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_detection() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notify"}"#).unwrap();
        assert!(request.is_notification());

        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        assert!(!request.is_notification());
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(i32::from(ErrorCode::ParseError), -32700);
        assert_eq!(i32::from(ErrorCode::MethodNotFound), -32601);
        assert_eq!(i32::from(ErrorCode::InvalidParams), -32602);
        assert_eq!(i32::from(ErrorCode::ToolError), -32000);
    }

    #[test]
    fn test_core_error_mapping() {
        let err: JsonRpcError = crate::Error::BadRequest("boost out of range".into()).into();
        assert_eq!(err.code, -32602);
        let err: JsonRpcError = crate::Error::NotFound("observation 9".into()).into();
        assert_eq!(err.code, -32000);
    }

    #[test]
    fn test_response_serialization_omits_empty_sides() {
        let response = JsonRpcResponse::success(Some(1.into()), serde_json::json!({"ok": true}));
        let wire = serde_json::to_string(&response).unwrap();
        assert!(!wire.contains("error"));
        let response = JsonRpcResponse::error(Some(1.into()), JsonRpcError::parse_error());
        let wire = serde_json::to_string(&response).unwrap();
        assert!(!wire.contains("result"));
    }
}

/// JSON-RPC 2.0 Message Types
///
/// Wire structures shared by every transport: the request object received from
/// clients, the response object sent back, and the method table that the
/// dispatcher branches on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol identifier carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Error code used for every failure raised while processing a request.
pub const INTERNAL_ERROR: i32 = -32603;

/// Error code for a line that is not valid JSON (STDIO transport only).
pub const PARSE_ERROR: i32 = -32700;

/// JSON-RPC 2.0 request structure.
///
/// `id` is `None` for notifications; a JSON `null` id is folded into `None`
/// by serde and treated the same way.
#[derive(Deserialize, Debug, Clone)]
pub struct MCPRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
///
/// Exactly one of `result` and `error` is present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MCPResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

impl MCPResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP methods understood by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Capability negotiation
    Initialize,
    /// Client acknowledgement after `initialize`; never answered
    Initialized,
    ListTools,
    CallTool,
    Ping,
    Unknown(String),
}

impl Method {
    pub fn from_name(name: &str) -> Self {
        match name {
            "initialize" => Method::Initialize,
            "notifications/initialized" => Method::Initialized,
            "tools/list" => Method::ListTools,
            "tools/call" => Method::CallTool,
            "ping" => Method::Ping,
            other => Method::Unknown(other.to_string()),
        }
    }
}

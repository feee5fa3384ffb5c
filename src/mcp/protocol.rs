//! MCP Protocol Types and Messages
//!
//! This module defines the JSON-RPC 2.0 envelopes the harness writes to a
//! target server and the shapes it expects to read back, plus the MCP
//! handshake payloads used by the probe catalogue.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// MCP protocol version announced by the handshake probes by default
pub const MCP_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 version identifier
pub const JSONRPC_VERSION: &str = "2.0";

/// Unique identifier for JSON-RPC messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for RequestId {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// JSON-RPC 2.0 Request message
///
/// A request without an `id` is a notification and expects no response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 Response as read back from a target
///
/// Both `result` and `error` are optional here so that malformed responses
/// still decode and can be reported as protocol violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    /// `Some(Value::Null)` for an explicit `"result": null`, `None` when the key is absent
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// The payload carried by a response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponsePayload<'a> {
    Result(&'a Value),
    Error(&'a JsonRpcError),
    /// Neither or both of `result` and `error` were present
    Malformed,
}

/// A single line written to the target's stdin
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Message(JsonRpcRequest),
    /// Sent verbatim, used to deliver deliberately invalid input
    Raw(String),
}

/// Implementation information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;

    /// Human-readable name for a reserved code
    #[inline]
    pub fn describe(code: i64) -> &'static str {
        match code {
            PARSE_ERROR => "parse error",
            INVALID_REQUEST => "invalid request",
            METHOD_NOT_FOUND => "method not found",
            INVALID_PARAMS => "invalid params",
            -32603 => "internal error",
            -32099..=-32000 => "server error",
            _ => "non-reserved code",
        }
    }
}

/// MCP method names used by the probes
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request
    #[inline]
    pub fn new(method: &str, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: Some(id),
        }
    }

    /// Create a new JSON-RPC notification
    #[inline]
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: None,
        }
    }

    /// Create an MCP `initialize` request
    #[inline]
    pub fn initialize(id: RequestId, protocol_version: &str, client_info: Implementation) -> Self {
        let params = json!({
            "protocolVersion": protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version,
            },
        });
        Self::new(methods::INITIALIZE, Some(params), id)
    }
}

impl JsonRpcResponse {
    /// Classify the payload of this response
    #[inline]
    pub fn payload(&self) -> ResponsePayload<'_> {
        match (&self.result, &self.error) {
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => ResponsePayload::Error(error),
            _ => ResponsePayload::Malformed,
        }
    }

    #[inline]
    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|error| error.code)
    }

    /// Compact one-line rendering for diagnostics
    #[inline]
    pub fn snippet(&self) -> String {
        let text = serde_json::to_string(self).unwrap_or_default();
        truncate(&text, 200)
    }
}

impl Outgoing {
    /// The id this line expects a response for, if any
    #[inline]
    pub fn expected_id(&self) -> Option<&RequestId> {
        match self {
            Self::Message(request) => request.id.as_ref(),
            Self::Raw(_) => None,
        }
    }

    /// Serialize to a single line without the trailing newline
    #[inline]
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Message(request) => serde_json::to_string(request),
            Self::Raw(text) => Ok(text.clone()),
        }
    }
}

impl From<JsonRpcRequest> for Outgoing {
    #[inline]
    fn from(request: JsonRpcRequest) -> Self {
        Self::Message(request)
    }
}

/// Truncate a string on a char boundary, appending an ellipsis when shortened
#[inline]
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars).collect();
    shortened.push('…');
    shortened
}

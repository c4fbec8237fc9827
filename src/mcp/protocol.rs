//! MCP Protocol Types (JSON-RPC 2.0)
//!
//! This module defines the message shapes exchanged with an MCP server.
//! MCP is built on top of JSON-RPC 2.0, which is a simple stateless RPC protocol.
//!
//! # Protocol Specification
//!
//! - JSON-RPC 2.0: <https://www.jsonrpc.org/specification>
//! - MCP Spec: <https://modelcontextprotocol.io/specification/2025-06-18>
//!
//! # Architecture
//!
//! The protocol layer is responsible only for serialization/deserialization of MCP messages.
//! Session state and HTTP concerns live in [`crate::mcp::client`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version offered in the initialize handshake
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Client name reported in `clientInfo`
pub const CLIENT_NAME: &str = "mcp-wireview";

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// A JSON-RPC request identifier
///
/// The protocol allows both strings and numbers. Fresh ids generated by the
/// client are UUID v4 strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id
    Number(i64),

    /// String id
    String(String),
}

impl RequestId {
    /// Generate a fresh, unique id
    pub fn generate() -> Self {
        Self::String(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Drop `params` that carry nothing.
///
/// `None` and an empty JSON object are both sent as "no params field".
pub fn normalize_params(params: Option<Value>) -> Option<Value> {
    match params {
        Some(Value::Object(map)) if map.is_empty() => None,
        other => other,
    }
}

/// A JSON-RPC 2.0 request message
///
/// # Example
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": "5c6f0b0e-3f7e-4a8c-9a57-0f1d7a0d6a11",
///   "method": "tools/list"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier
    pub id: RequestId,

    /// Method name to invoke
    pub method: String,

    /// Method parameters (omitted when empty)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    /// Create a new MCP request
    ///
    /// # Arguments
    ///
    /// * `id` - Request identifier
    /// * `method` - Method name to invoke
    /// * `params` - Optional method parameters; an empty object is dropped
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: id.into(),
            method: method.into(),
            params: normalize_params(params),
        }
    }
}

/// A JSON-RPC 2.0 notification (a request without `id`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Notification method
    pub method: String,

    /// Notification parameters (omitted when empty)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            method: method.into(),
            params: normalize_params(params),
        }
    }
}

/// A JSON-RPC 2.0 message received from the server
///
/// Wraps the message exactly as decoded: any valid JSON is kept, whether or
/// not it follows the JSON-RPC shape, and serializes back to the same value.
/// The accessors below are read-only views and never fail.
///
/// # Example (Success)
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 1,
///   "result": {"tools": []}
/// }
/// ```
///
/// # Example (Error)
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 1,
///   "error": {"code": -32601, "message": "Method not found"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct McpResponse(Value);

impl From<Value> for McpResponse {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl McpResponse {
    /// The message as received
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Raw `id` member; `Some(&Value::Null)` for `"id": null`
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// Raw `result` member; `Some(&Value::Null)` for `"result": null`
    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    /// The `error` member, when it signals a failure
    ///
    /// `null`, `false`, `0` and `""` do not count as an error.
    pub fn error(&self) -> Option<&Value> {
        self.0.get("error").filter(|e| is_truthy(e))
    }

    /// `method` of a server-initiated message (notification or request)
    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    /// Check if the response is successful
    ///
    /// `error` is authoritative: a response carrying one is a failure even if
    /// a `result` is present too.
    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }

    /// Typed view of the error, when it is a well-formed error object
    pub fn typed_error(&self) -> Option<McpError> {
        self.error()
            .and_then(|e| serde_json::from_value(e.clone()).ok())
    }

    /// `result.protocolVersion`, if the result carries a non-empty one
    pub fn protocol_version(&self) -> Option<&str> {
        self.result()
            .and_then(|r| r.get("protocolVersion"))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Typed view of an initialize result, when it is well-formed
    pub fn initialize_result(&self) -> Option<InitializeResult> {
        self.result()
            .and_then(|r| serde_json::from_value(r.clone()).ok())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// One observable step of a request exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The exact request, emitted right before it is transmitted
    RequestSent(McpRequest),

    /// A message from the server: one per SSE data line, or the single JSON body
    Message(McpResponse),
}

/// A JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpError {
    /// Error code (JSON-RPC defined or MCP-specific)
    pub code: i64,

    /// Human-readable error message
    pub message: String,

    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Error {}] {}", self.code, self.message)
    }
}

impl std::error::Error for McpError {}

/// MCP method identifiers used by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpMethod {
    /// Initialize the session (must be called first)
    Initialize,

    /// Sent by the client once initialize succeeded
    Initialized,

    /// List available tools
    ToolsList,

    /// Call a specific tool
    ToolsCall,

    /// List available resources
    ResourcesList,

    /// List available prompts
    PromptsList,
}

impl McpMethod {
    /// Convert to string for JSON-RPC method field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "notifications/initialized",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ResourcesList => "resources/list",
            Self::PromptsList => "prompts/list",
        }
    }
}

/// Initialization parameters
///
/// Sent during the initialize handshake to negotiate capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializeParams {
    /// Client protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// Client capabilities
    pub capabilities: ClientCapabilities,

    /// Client information
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

impl Default for InitializeParams {
    fn default() -> Self {
        let empty = || Some(Value::Object(Map::new()));
        Self {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                roots: empty(),
                sampling: empty(),
                elicitation: empty(),
                experimental: None,
            },
            client_info: Implementation {
                name: CLIENT_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Client capabilities advertised during initialization
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<Value>,

    /// Experimental features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

/// Client or server identification (`clientInfo` / `serverInfo`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// The `result` of a successful initialize call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitializeResult {
    /// Protocol version chosen by the server
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// Server capabilities
    #[serde(default)]
    pub capabilities: Value,

    /// Server information
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
}

/// Tool call parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallParams {
    /// Name of the tool to call
    pub name: String,

    /// Tool arguments (must match the tool's input schema)
    pub arguments: Value,
}

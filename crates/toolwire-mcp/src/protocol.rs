//! MCP protocol types and the JSON-RPC 2.0 codec.
//!
//! Outgoing traffic is encoded from typed requests. Incoming traffic is
//! classified by [`decode`] into responses, notifications, or noise, since
//! servers are free to interleave notifications and log output with replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpError;

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID, unique per connection.
    pub id: i64,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<P> JsonRpcRequest<P> {
    /// Create a new JSON-RPC request.
    pub fn new(id: i64, method: impl Into<String>, params: Option<P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification (no ID, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification<P> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<P> JsonRpcNotification<P> {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Optional additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Standard JSON-RPC error codes.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl From<JsonRpcError> for McpError {
    fn from(error: JsonRpcError) -> Self {
        McpError::server_error(error.code, error.message)
    }
}

/// Encode a request as a single JSON object (no trailing newline).
pub fn encode_request<P: Serialize>(id: i64, method: &str, params: Option<P>) -> Result<String, McpError> {
    Ok(serde_json::to_string(&JsonRpcRequest::new(id, method, params))?)
}

/// Encode a notification as a single JSON object (no trailing newline).
pub fn encode_notification<P: Serialize>(method: &str, params: Option<P>) -> Result<String, McpError> {
    Ok(serde_json::to_string(&JsonRpcNotification::new(method, params))?)
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A reply carrying `result` or `error`.
    Response {
        /// Numeric id, if the message had one.
        id: Option<i64>,
        /// The result value or the error object.
        outcome: Result<Value, JsonRpcError>,
    },
    /// An object with neither `result` nor `error`.
    Notification {
        /// Method name, when present.
        method: Option<String>,
    },
    /// Anything that is not a JSON object.
    Unparseable,
}

impl Incoming {
    /// The response outcome if this is the reply to request `id`.
    pub fn into_reply_for(self, id: i64) -> Option<Result<Value, McpError>> {
        match self {
            Incoming::Response { id: Some(got), outcome } if got == id => {
                Some(outcome.map_err(McpError::from))
            }
            _ => None,
        }
    }
}

/// Classify one line or body received from a server.
pub fn decode(raw: &str) -> Incoming {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return Incoming::Unparseable;
    }

    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(trimmed) else {
        return Incoming::Unparseable;
    };

    let id = object.get("id").and_then(Value::as_i64);

    // `"error": null` is the same as no error member.
    if let Some(error) = object.remove("error").filter(|e| !e.is_null()) {
        let error = serde_json::from_value::<JsonRpcError>(error.clone()).unwrap_or(JsonRpcError {
            code: JsonRpcError::INTERNAL_ERROR,
            message: error.to_string(),
            data: None,
        });
        return Incoming::Response { id, outcome: Err(error) };
    }

    if let Some(result) = object.remove("result") {
        return Incoming::Response { id, outcome: Ok(result) };
    }

    Incoming::Notification {
        method: object.get("method").and_then(Value::as_str).map(str::to_string),
    }
}

// ============================================================================
// MCP Protocol Types
// ============================================================================

/// Client information sent during initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl ClientInfo {
    /// Create client information.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new("toolwire", env!("CARGO_PKG_VERSION"))
    }
}

/// Server information returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Server version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// MCP protocol version.
    pub protocol_version: String,
    /// Client capabilities; this client advertises none.
    pub capabilities: Value,
    /// Client information.
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Handshake parameters identifying this client.
    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(Default::default()),
            client_info,
        }
    }
}

/// Result of the initialize request. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeResult {
    /// MCP protocol version chosen by the server.
    pub protocol_version: String,
    /// Server capabilities, kept opaque.
    pub capabilities: Value,
    /// Server information.
    pub server_info: ServerInfo,
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// List of available tools.
    #[serde(default)]
    pub tools: Vec<McpTool>,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// MCP tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

impl McpTool {
    /// Create a tool definition with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: empty_schema(),
        }
    }

    /// Set the input schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub arguments: Value,
}

/// Result of the tools/call request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Whether the tool execution resulted in an error.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// All `text` blocks concatenated in order; other block types are skipped.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(ContentBlock::as_text).collect()
    }

    /// Turn the result into the caller-facing output or a tool failure.
    pub fn into_output(self) -> Result<String, McpError> {
        let text = self.text();
        if self.is_error {
            Err(McpError::ToolFailed(text))
        } else {
            Ok(text)
        }
    }
}

/// One typed block of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Block type: `text`, `image`, `resource`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload for `text` blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    /// Create a text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }

    /// Get the text if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        if self.kind == "text" {
            self.text.as_deref()
        } else {
            None
        }
    }
}

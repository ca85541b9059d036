//! MCP-specific error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(std::io::Error),

    /// Failed to write to the transport.
    #[error("write error: {0}")]
    WriteError(std::io::Error),

    /// Failed to read from the transport.
    #[error("read error: {0}")]
    ReadError(std::io::Error),

    /// The peer closed its end of the stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// Failed to terminate the process.
    #[error("failed to terminate process: {0}")]
    TerminateFailed(std::io::Error),
}

impl TransportError {
    /// Whether the peer is gone: closed stream, or a write into a dead pipe.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::NotConnected => true,
            Self::WriteError(e) => e.kind() == std::io::ErrorKind::BrokenPipe,
            _ => false,
        }
    }
}

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server list could not be read.
    #[error("failed to read MCP config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server list is not valid JSON.
    #[error("failed to parse MCP config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A single server entry cannot be turned into a connection.
    #[error("invalid config for server '{server}': {reason}")]
    InvalidServerConfig { server: String, reason: String },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level error (malformed messages, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The `initialize` handshake failed.
    #[error("initialize failed: {0}")]
    InitializationFailed(String),

    /// The `tools/list` request failed.
    #[error("tools/list failed: {0}")]
    DiscoveryFailed(String),

    /// Server returned an error response.
    #[error("RPC error {code}: {message}")]
    ServerError { code: i32, message: String },

    /// No response with the awaited id arrived within the read budget.
    #[error("no response to request {id} after {attempts} attempts")]
    CorrelationExhausted { id: i64, attempts: usize },

    /// Tool name is not in the routing table.
    #[error("unknown MCP tool: {0}")]
    UnknownTool(String),

    /// The tool ran and reported failure (`isError`).
    #[error("tool error: {0}")]
    ToolFailed(String),

    /// HTTP endpoint answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// HTTP request could not be completed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection is not in the correct state.
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an initialization failed error.
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a discovery failed error.
    pub fn discovery_failed(msg: impl Into<String>) -> Self {
        Self::DiscoveryFailed(msg.into())
    }

    /// Create a server error from JSON-RPC error.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid server config error.
    pub fn invalid_config(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidServerConfig {
            server: server.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether the peer has gone away and the connection cannot be used again.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_disconnect(),
            _ => false,
        }
    }
}

impl From<McpError> for toolwire_core::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::UnknownTool(name) => toolwire_core::Error::NotFound(format!("unknown MCP tool: {}", name)),
            other => toolwire_core::Error::Mcp(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::ConnectionClosed;
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::UnknownTool("search".to_string());
        assert_eq!(err.to_string(), "unknown MCP tool: search");

        let err = McpError::server_error(-32600, "Invalid request");
        assert_eq!(err.to_string(), "RPC error -32600: Invalid request");

        let err = McpError::CorrelationExhausted { id: 4, attempts: 50 };
        assert_eq!(err.to_string(), "no response to request 4 after 50 attempts");

        let err = McpError::HttpStatus {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: busy");
    }

    #[test]
    fn test_is_disconnect() {
        assert!(McpError::from(TransportError::ConnectionClosed).is_disconnect());
        assert!(!McpError::protocol("bad frame").is_disconnect());

        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        assert!(McpError::from(TransportError::WriteError(broken)).is_disconnect());

        let other = std::io::Error::other("disk full");
        assert!(!McpError::from(TransportError::WriteError(other)).is_disconnect());
    }

    #[test]
    fn test_mcp_error_to_core_error() {
        let core_err: toolwire_core::Error = McpError::protocol("test error").into();
        assert!(matches!(core_err, toolwire_core::Error::Mcp(_)));

        let core_err: toolwire_core::Error = McpError::UnknownTool("x".to_string()).into();
        assert!(matches!(core_err, toolwire_core::Error::NotFound(_)));
    }
}

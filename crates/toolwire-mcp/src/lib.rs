//! # toolwire-mcp
//!
//! MCP (Model Context Protocol) client for Toolwire.
//!
//! This crate provides:
//! - JSON-RPC 2.0 encoding and request/response correlation
//! - stdio (child process) and HTTP/SSE connections
//! - The `mcp.json` server list
//! - A manager that starts servers, tolerates per-server failures and
//!   routes tool calls by tool name

pub mod client;
pub mod config;
pub mod correlator;
pub mod discovery;
pub mod error;
pub mod http;
pub mod protocol;
pub mod stdio;
pub mod tools;
pub mod transport;

pub use client::{Connection, ConnectionState, McpConnection, RpcChannel};
pub use config::{default_config_path, load_config, ServerConfig, TransportConfig, TransportKind};
pub use discovery::{Connector, McpManager, ServerSummary, TransportConnector};
pub use error::{McpError, TransportError};
pub use http::{HttpChannel, HttpConnection};
pub use stdio::{ProcessConnection, StdioChannel};
pub use tools::FunctionTool;

//! MCP connections.
//!
//! A [`Connection`] is the transport-agnostic handle the manager works with.
//! [`McpConnection`] implements it once on top of any [`RpcChannel`], so the
//! stdio and HTTP variants share the same lifecycle and result handling:
//!
//! ```text
//! Starting -> Initialized -> Ready -> Closed
//!     \____________\____________\---> Failed
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::config::TransportKind;
use crate::error::McpError;
use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeParams, InitializeResult, ListToolsResult, McpTool,
    ServerInfo,
};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is up, handshake not yet done.
    Starting,
    /// `initialize` succeeded.
    Initialized,
    /// Tools are listed and the connection can serve calls.
    Ready,
    /// Shut down, or the server went away.
    Closed,
    /// A setup step failed; terminal.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Initialized => write!(f, "initialized"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Transport-agnostic capability surface of one MCP server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Server name from the configuration.
    fn name(&self) -> &str;

    /// Which transport this connection uses.
    fn transport(&self) -> TransportKind;

    /// Current lifecycle state.
    async fn state(&self) -> ConnectionState;

    /// Tools cached by the last successful `list_tools`.
    async fn tools(&self) -> Vec<McpTool>;

    /// Perform the `initialize` handshake.
    async fn initialize(&self) -> Result<(), McpError>;

    /// Fetch and cache the server's tools.
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError>;

    /// Invoke a tool and return its text output.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError>;

    /// Release the transport. Closing twice is a no-op.
    async fn close(&self) -> Result<(), McpError>;
}

/// A request/response channel to one server.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Which transport carries the traffic.
    fn kind(&self) -> TransportKind;

    /// Send a request and wait for its result.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification; no reply is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Release transport resources. Must be idempotent.
    async fn shutdown(&self) -> Result<(), McpError>;
}

/// A connection to a single MCP server over channel `C`.
pub struct McpConnection<C> {
    /// Server name.
    name: String,
    /// Channel carrying the JSON-RPC traffic.
    channel: C,
    /// Identity sent in `initialize`.
    client_info: ClientInfo,
    /// Current lifecycle state.
    state: RwLock<ConnectionState>,
    /// Server identity reported by `initialize`.
    server_info: RwLock<Option<ServerInfo>>,
    /// Cached tools from the server.
    cached_tools: RwLock<Vec<McpTool>>,
    /// Set once the channel has been shut down.
    released: AtomicBool,
    /// Log context for everything this connection does.
    span: Span,
}

impl<C: RpcChannel> McpConnection<C> {
    /// Wrap a freshly opened channel; the connection starts in `Starting`.
    pub fn new(name: impl Into<String>, channel: C, client_info: ClientInfo) -> Self {
        let name = name.into();
        let span = info_span!("mcp_server", server = %name, transport = %channel.kind());
        Self {
            name,
            channel,
            client_info,
            state: RwLock::new(ConnectionState::Starting),
            server_info: RwLock::new(None),
            cached_tools: RwLock::new(Vec::new()),
            released: AtomicBool::new(false),
            span,
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Server identity, available after `initialize`.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn handshake(&self) -> Result<(), McpError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Starting {
            return Err(McpError::invalid_state("starting", state.to_string()));
        }

        debug!("Initializing MCP connection");

        let params = serde_json::to_value(InitializeParams::new(self.client_info.clone()))?;
        let outcome = async {
            let result = self.channel.request("initialize", Some(params)).await?;
            self.channel.notify("notifications/initialized", None).await?;
            Ok::<_, McpError>(result)
        }
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.set_state(ConnectionState::Failed).await;
                return Err(McpError::init_failed(e.to_string()));
            }
        };

        let result: InitializeResult = serde_json::from_value(result).unwrap_or_else(|e| {
            debug!(error = %e, "Unrecognized initialize result, continuing");
            InitializeResult::default()
        });

        info!(
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP connection initialized"
        );

        *self.server_info.write().await = Some(result.server_info);
        self.set_state(ConnectionState::Initialized).await;

        Ok(())
    }

    async fn discover(&self) -> Result<Vec<McpTool>, McpError> {
        let state = *self.state.read().await;
        if !matches!(state, ConnectionState::Initialized | ConnectionState::Ready) {
            return Err(McpError::invalid_state("initialized", state.to_string()));
        }

        debug!("Listing tools");

        let outcome = match self.channel.request("tools/list", None).await {
            Ok(value) => serde_json::from_value::<ListToolsResult>(value).map_err(McpError::from),
            Err(e) => Err(e),
        };

        let listed = match outcome {
            Ok(listed) => listed,
            Err(e) => {
                // A failed refresh leaves a Ready connection usable.
                if state == ConnectionState::Initialized {
                    self.set_state(ConnectionState::Failed).await;
                }
                return Err(McpError::discovery_failed(e.to_string()));
            }
        };

        let mut tools: Vec<McpTool> = Vec::with_capacity(listed.tools.len());
        for tool in listed.tools {
            if tools.iter().any(|t| t.name == tool.name) {
                warn!(tool = %tool.name, "Server listed a tool twice, keeping the first");
                continue;
            }
            tools.push(tool);
        }

        *self.cached_tools.write().await = tools.clone();
        self.set_state(ConnectionState::Ready).await;

        debug!(tool_count = tools.len(), "Listed tools");

        Ok(tools)
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Ready {
            return Err(McpError::invalid_state("ready", state.to_string()));
        }

        debug!(tool = name, "Calling tool");

        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;

        let value = match self.channel.request("tools/call", Some(params)).await {
            Ok(value) => value,
            Err(e) => {
                if e.is_disconnect() {
                    warn!(error = %e, "MCP server went away");
                    self.set_state(ConnectionState::Closed).await;
                }
                return Err(e);
            }
        };

        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| McpError::protocol(format!("failed to parse tool result: {}", e)))?;

        if result.is_error {
            warn!(tool = name, "Tool returned error");
        }

        result.into_output()
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        // A disconnect marks the connection Closed but leaves the process
        // behind, so the channel is released regardless of state.
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!("Closing MCP connection");

        let result = self.channel.shutdown().await;

        let state = *self.state.read().await;
        if !matches!(state, ConnectionState::Failed | ConnectionState::Closed) {
            self.set_state(ConnectionState::Closed).await;
        }

        info!("MCP connection closed");
        result
    }
}

#[async_trait]
impl<C: RpcChannel> Connection for McpConnection<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> TransportKind {
        self.channel.kind()
    }

    async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn tools(&self) -> Vec<McpTool> {
        self.cached_tools.read().await.clone()
    }

    async fn initialize(&self) -> Result<(), McpError> {
        self.handshake().instrument(self.span.clone()).await
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        self.discover().instrument(self.span.clone()).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        self.invoke(name, arguments).instrument(self.span.clone()).await
    }

    async fn close(&self) -> Result<(), McpError> {
        self.shutdown().instrument(self.span.clone()).await
    }
}

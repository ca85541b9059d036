//! JSON-RPC over a child process's stdin/stdout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::client::{McpConnection, RpcChannel};
use crate::config::TransportKind;
use crate::correlator::RequestCorrelator;
use crate::error::McpError;
use crate::protocol::{encode_notification, encode_request};
use crate::transport::{StdioTransport, Transport};

/// A connection to a locally spawned MCP server.
pub type ProcessConnection = McpConnection<StdioChannel>;

/// Request/response channel over a line transport.
///
/// The transport lock is held from writing a request until its reply has been
/// read, so exchanges on one channel never interleave.
pub struct StdioChannel {
    transport: Mutex<Box<dyn Transport>>,
    correlator: RequestCorrelator,
    timeout: Duration,
    pid: Option<u32>,
}

impl StdioChannel {
    /// Wrap an already open transport.
    pub fn new(transport: Box<dyn Transport>, correlator: RequestCorrelator, timeout: Duration) -> Self {
        Self {
            transport: Mutex::new(transport),
            correlator,
            timeout,
            pid: None,
        }
    }

    /// Spawn `command` and speak JSON-RPC over its standard streams.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        correlator: RequestCorrelator,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let transport = StdioTransport::spawn(command, args, env)?;
        let pid = transport.pid();
        let mut channel = Self::new(Box::new(transport), correlator, timeout);
        channel.pid = pid;
        Ok(channel)
    }

    /// Process id of the spawned server, if this channel owns one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn timed_out(&self) -> McpError {
        McpError::Timeout(self.timeout.as_secs())
    }
}

#[async_trait]
impl RpcChannel for StdioChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.correlator.next_id();
        let message = encode_request(id, method, params)?;

        let exchange = async {
            let mut transport = self.transport.lock().await;
            transport.send(&message).await?;
            self.correlator.await_reply(&mut **transport, id).await
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .unwrap_or_else(|_| Err(self.timed_out()))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let message = encode_notification(method, params)?;

        let send = async {
            let mut transport = self.transport.lock().await;
            transport.send(&message).await.map_err(McpError::from)
        };

        tokio::time::timeout(self.timeout, send)
            .await
            .unwrap_or_else(|_| Err(self.timed_out()))
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        let mut transport = self.transport.lock().await;
        transport.close().await?;
        Ok(())
    }
}

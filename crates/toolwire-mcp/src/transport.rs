//! MCP transport implementations.
//!
//! A [`Transport`] moves newline-delimited messages. The stdio transport spawns
//! a child process and talks over its stdin/stdout; stderr is inherited so
//! server diagnostics reach the user's terminal.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

use crate::error::TransportError;

/// Trait for line-oriented MCP transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message; the transport appends the line terminator.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next line, without its terminator.
    async fn receive(&mut self) -> Result<String, TransportError>;

    /// Close the transport. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Standard I/O transport for MCP servers.
pub struct StdioTransport {
    /// The child process; `None` once reaped.
    child: Option<Child>,
    /// Stdin writer; dropped on close to signal end of input.
    stdin: Option<ChildStdin>,
    /// Buffered stdout reader for receiving messages.
    stdout: BufReader<ChildStdout>,
    /// Process id captured at spawn time.
    pid: Option<u32>,
    /// Whether the transport is connected.
    connected: bool,
}

impl StdioTransport {
    /// Spawn a new stdio transport.
    ///
    /// # Arguments
    ///
    /// * `command` - The command to execute (e.g., "npx" or "/path/to/server")
    /// * `args` - Command arguments
    /// * `env` - Variables overlaid on the inherited environment
    pub fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self, TransportError> {
        debug!(command = command, args = ?args, "Spawning MCP server process");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(TransportError::SpawnFailed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdin")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::SpawnFailed(std::io::Error::other("Failed to capture stdout")))?;

        let pid = child.id();
        debug!(pid = ?pid, "MCP server process spawned");

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            pid,
            connected: true,
        })
    }

    /// Get the process ID of the child process.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let stdin = self.stdin.as_mut().ok_or(TransportError::NotConnected)?;

        trace!(message = message, "Sending message to MCP server");

        let mut frame = Vec::with_capacity(message.len() + 1);
        frame.extend_from_slice(message.as_bytes());
        frame.push(b'\n');

        let written = match stdin.write_all(&frame).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // The server closed its end of stdin; nothing further will get through.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                self.connected = false;
            }
            return Err(TransportError::WriteError(e));
        }

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let mut line = String::new();
        let bytes_read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(TransportError::ReadError)?;

        if bytes_read == 0 {
            self.connected = false;
            return Err(TransportError::ConnectionClosed);
        }

        let message = line.trim_end_matches(&['\r', '\n'][..]).to_string();
        trace!(message = message, "Received message from MCP server");

        Ok(message)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.connected = false;

        // End of input first, so well-behaved servers can start shutting down.
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        debug!(pid = ?self.pid, "Terminating MCP server process");

        if let Err(e) = child.start_kill() {
            // InvalidInput means the process already exited; it still needs reaping.
            if e.kind() != std::io::ErrorKind::InvalidInput {
                warn!(pid = ?self.pid, error = %e, "Failed to kill MCP server process");
            }
        }

        let status = child.wait().await.map_err(TransportError::TerminateFailed)?;
        debug!(pid = ?self.pid, status = %status, "MCP server process exited");

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdio_transport_echo() {
        // `cat` echoes every line back, which is all a line transport needs.
        let transport = StdioTransport::spawn("cat", &[], &HashMap::new());

        if let Ok(mut transport) = transport {
            assert!(transport.is_connected());
            assert!(transport.pid().is_some());

            transport.send(r#"{"test": "hello"}"#).await.unwrap();
            let response = transport.receive().await.unwrap();
            assert_eq!(response, r#"{"test": "hello"}"#);

            transport.close().await.unwrap();
            assert!(!transport.is_connected());
        }
    }

    #[tokio::test]
    async fn test_transport_not_connected_after_close() {
        let transport = StdioTransport::spawn("cat", &[], &HashMap::new());

        if let Ok(mut transport) = transport {
            transport.close().await.unwrap();
            transport.close().await.unwrap();

            let result = transport.send("test").await;
            assert!(matches!(result, Err(TransportError::NotConnected)));

            let result = transport.receive().await;
            assert!(matches!(result, Err(TransportError::NotConnected)));
        }
    }

    #[tokio::test]
    async fn test_write_to_exited_child_disconnects() {
        let transport = StdioTransport::spawn("true", &[], &HashMap::new());

        if let Ok(mut transport) = transport {
            // Let the child exit so its stdin has no reader.
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;

            let err = transport.send(r#"{"jsonrpc":"2.0","method":"ping"}"#).await.unwrap_err();
            assert!(matches!(err, TransportError::WriteError(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));
            assert!(err.is_disconnect());
            assert!(!transport.is_connected());

            transport.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_env_overlay_reaches_child() {
        let mut env = HashMap::new();
        env.insert("TOOLWIRE_TRANSPORT_TEST".to_string(), "overlay-value".to_string());
        let args = vec!["-c".to_string(), "echo $TOOLWIRE_TRANSPORT_TEST".to_string()];

        if let Ok(mut transport) = StdioTransport::spawn("sh", &args, &env) {
            assert_eq!(transport.receive().await.unwrap(), "overlay-value");
            let eof = transport.receive().await;
            assert!(matches!(eof, Err(TransportError::ConnectionClosed)));
            assert!(!transport.is_connected());
            transport.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let result = StdioTransport::spawn("/definitely/not/a/real/binary", &[], &HashMap::new());
        assert!(matches!(result, Err(TransportError::SpawnFailed(_))));
    }
}

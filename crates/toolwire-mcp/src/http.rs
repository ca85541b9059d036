//! JSON-RPC over HTTP POST.
//!
//! Every request is one POST of the encoded message. The reply body is
//! either a single JSON-RPC message or an SSE stream whose `data:` payloads
//! are JSON-RPC messages; in both cases the message answering the request id
//! wins and everything else is skipped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};

use crate::client::{McpConnection, RpcChannel};
use crate::config::TransportKind;
use crate::correlator::RequestCorrelator;
use crate::error::McpError;
use crate::protocol::{encode_notification, encode_request};

/// A connection to a remote MCP server.
pub type HttpConnection = McpConnection<HttpChannel>;

const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Request/response channel over HTTP.
pub struct HttpChannel {
    client: Client,
    endpoint: String,
    kind: TransportKind,
    correlator: RequestCorrelator,
    timeout: Duration,
}

impl HttpChannel {
    /// Create a channel for a server at `url`.
    ///
    /// Servers of the `sse` kind receive their messages at `<url>/message`.
    pub fn new(
        client: Client,
        url: &str,
        kind: TransportKind,
        correlator: RequestCorrelator,
        timeout: Duration,
    ) -> Self {
        let endpoint = match kind {
            TransportKind::Sse => format!("{}/message", url.trim_end_matches('/')),
            _ => url.to_string(),
        };

        Self {
            client,
            endpoint,
            kind,
            correlator,
            timeout,
        }
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: String) -> Result<reqwest::Response, McpError> {
        trace!(endpoint = %self.endpoint, body = %body, "Posting MCP message");

        self.client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_VALUE)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))
    }

    fn map_reqwest(&self, e: reqwest::Error) -> McpError {
        if e.is_timeout() {
            McpError::Timeout(self.timeout.as_secs())
        } else {
            McpError::Http(e)
        }
    }

    /// Find the reply to `id` in a response body.
    fn extract_reply(&self, body: &str, id: i64) -> Result<Value, McpError> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('{') {
            if let Some(reply) = self.correlator.accept(trimmed, id) {
                return reply;
            }
        } else {
            for payload in sse_payloads(body) {
                if let Some(reply) = self.correlator.accept(&payload, id) {
                    return reply;
                }
            }
        }

        Err(McpError::protocol(format!("response body holds no reply to request {}", id)))
    }
}

/// Collect the `data:` payloads of an SSE body, one entry per event.
pub(crate) fn sse_payloads(body: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut data: Vec<&str> = Vec::new();

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                payloads.push(data.join("\n"));
                data.clear();
            }
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if !data.is_empty() {
        payloads.push(data.join("\n"));
    }

    payloads
}

#[async_trait]
impl RpcChannel for HttpChannel {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.correlator.next_id();
        let message = encode_request(id, method, params)?;

        let response = self.post(message).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_reqwest(e))?;

        if status != StatusCode::OK {
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!(method = method, id = id, "Received HTTP reply");
        self.extract_reply(&body, id)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let message = encode_notification(method, params)?;

        let response = self.post(message).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        // Requests are independent; there is nothing to release.
        Ok(())
    }
}

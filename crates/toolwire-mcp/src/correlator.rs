//! Request/response correlation.
//!
//! Each connection owns one [`RequestCorrelator`]. It hands out strictly
//! increasing request ids and, for line transports, scans inbound lines for
//! the reply to the request in flight. Blank lines, non-JSON output,
//! notifications and replies to other ids are skipped; each line read counts
//! against a fixed attempt budget.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::McpError;
use crate::protocol::{decode, Incoming};
use crate::transport::Transport;

/// Default number of lines read while waiting for one reply.
pub const DEFAULT_MAX_ATTEMPTS: usize = 50;

/// Issues request ids and matches replies to them.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: AtomicI64,
    max_attempts: usize,
}

impl RequestCorrelator {
    /// Create a correlator whose first id is 1.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reserve the next request id. Ids are never reused, even when the
    /// request carrying one fails.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// The attempt budget for one reply.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Check a single message against the awaited id.
    ///
    /// Returns `None` when the message is not the reply and should be skipped.
    pub fn accept(&self, raw: &str, id: i64) -> Option<Result<Value, McpError>> {
        match decode(raw) {
            Incoming::Unparseable => {
                if !raw.trim().is_empty() {
                    trace!(line = raw, "Skipping non-JSON output");
                }
                None
            }
            Incoming::Notification { method } => {
                debug!(method = ?method, "Skipping notification");
                None
            }
            incoming @ Incoming::Response { .. } => {
                let reply = incoming.clone().into_reply_for(id);
                if reply.is_none() {
                    debug!(awaited = id, message = ?incoming, "Skipping reply to another request");
                }
                reply
            }
        }
    }

    /// Read lines from `transport` until the reply to `id` arrives or the
    /// attempt budget runs out.
    pub async fn await_reply(&self, transport: &mut dyn Transport, id: i64) -> Result<Value, McpError> {
        for _ in 0..self.max_attempts {
            let line = transport.receive().await?;
            if let Some(reply) = self.accept(&line, id) {
                return reply;
            }
        }

        Err(McpError::CorrelationExhausted {
            id,
            attempts: self.max_attempts,
        })
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

//! Request/response correlation.
//!
//! Every outbound command that expects a reply gets a fresh UUID and a
//! oneshot channel. The reader task resolves the channel when a result
//! with the matching `messageId` arrives. Callers wait on their own
//! receiver, never on the reader, so a blocked caller cannot stall the
//! frame that would unblock it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::codec::ResultMessage;
use crate::error::Error;

/// Identifier -> waiter map shared by the reader and all callers.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    pending: DashMap<String, oneshot::Sender<ResultMessage>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new request identifier and register a waiter for it.
    pub fn begin_request(self: &Arc<Self>) -> PendingRequest {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        tracing::trace!(message_id = %id, "request registered");

        PendingRequest {
            id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Hand `result` to the waiter registered under `message_id`.
    ///
    /// Returns `false` for unknown, already-resolved, or abandoned
    /// identifiers. Such results are dropped.
    pub fn resolve(&self, message_id: &str, result: ResultMessage) -> bool {
        let Some((_, tx)) = self.pending.remove(message_id) else {
            tracing::debug!(message_id, "result for unknown request, discarding");
            return false;
        };

        if tx.send(result).is_err() {
            tracing::debug!(message_id, "waiter gone before result arrived");
            return false;
        }
        true
    }

    /// Number of requests still waiting for a result.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every outstanding waiter. Each one observes
    /// [`Error::ConnectionClosed`]. Returns how many were failed.
    pub fn clear(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    fn forget(&self, message_id: &str) {
        self.pending.remove(message_id);
    }
}

// ── PendingRequest ───────────────────────────────────────────────────

/// Caller-side handle for one in-flight request.
///
/// Dropping it without waiting (or after a timeout) removes the
/// registry entry, so abandoned requests never leak.
#[derive(Debug)]
pub struct PendingRequest {
    id: String,
    rx: oneshot::Receiver<ResultMessage>,
    registry: Arc<CorrelationRegistry>,
}

impl PendingRequest {
    /// The `messageId` to put on the outbound frame.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Suspend until the result arrives.
    ///
    /// With `Some(limit)`, gives up after `limit` and returns
    /// [`Error::Timeout`]; the entry is removed so a late reply is
    /// discarded. `None` waits until the result arrives or the
    /// connection closes.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<ResultMessage, Error> {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::debug!(message_id = %self.id, "request timed out");
                    return Err(Error::Timeout {
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => (&mut self.rx).await,
        };

        received.map_err(|_| Error::ConnectionClosed)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.registry.forget(&self.id);
    }
}

// ── Tests ────────────────────────────────────────────────────────────

use thiserror::Error;

use crate::client::ConnectionState;

/// Top-level error type for the `zwjs-api` crate.
///
/// Business-level failures (a command the controller refused) are not
/// errors: the command façade reports them as `false`. These variants cover
/// the transport and correlation machinery only.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// WebSocket handshake or TCP connect failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// `connect` called on a client that already left `Disconnected`.
    #[error("Connection already started (connection is {state})")]
    AlreadyStarted { state: ConnectionState },

    /// Outbound send attempted while the connection is not open.
    #[error("Not connected (connection is {state})")]
    NotConnected { state: ConnectionState },

    /// The connection closed before a reply arrived.
    #[error("Connection closed before a result was received")]
    ConnectionClosed,

    // ── Correlation ─────────────────────────────────────────────────
    /// No result arrived within the configured request timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// Outbound command could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

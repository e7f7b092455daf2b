//! Error types for connections, calls, and inbound frames.

use thiserror::Error;

/// Why a server could not be brought to the Connected state.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Failed to spawn server '{server}': {source}")]
    SpawnFailed {
        server: String,
        source: std::io::Error,
    },

    #[error("Server '{server}' did not connect within {timeout_ms}ms")]
    Timeout { server: String, timeout_ms: u64 },

    #[error("Server '{server}' refused the connection: {reason}")]
    Refused { server: String, reason: String },

    #[error("Server '{server}' failed the initialize handshake: {source}")]
    Handshake {
        server: String,
        #[source]
        source: Box<CallError>,
    },

    #[error("Unknown server '{server}'")]
    UnknownServer { server: String },
}

/// Failure of one call, surfaced to the caller as-is.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("Call '{method}' on '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("Connection to '{server}' closed: {reason}")]
    ConnectionClosed { server: String, reason: String },

    #[error("Error from '{server}'{}: {message}", code_suffix(.code))]
    Remote {
        server: String,
        code: Option<i64>,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Server '{server}' is unavailable")]
    ServerUnavailable { server: String },

    #[error("Transport error on '{server}': {reason}")]
    Transport { server: String, reason: String },

    #[error("Protocol error on '{server}': {reason}")]
    Protocol { server: String, reason: String },

    #[error("Call '{method}' on '{server}' was cancelled")]
    Cancelled { server: String, method: String },
}

impl CallError {
    /// Whether the call ended without any answer from the server.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(" (code {c})")).unwrap_or_default()
}

/// A malformed inbound frame. The frame is dropped; the connection stays up.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
}

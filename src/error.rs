//! Error types for presence-ipc.

use thiserror::Error;

/// Disconnect code used when the transport fails or the peer hangs up.
pub const PIPE_CLOSED: i32 = 1;

/// Disconnect code used when the peer sends a frame we cannot interpret.
pub const READ_CORRUPT: i32 = 2;

/// Main error type for all presence-ipc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error outside the non-blocking transport (thread spawn, registration).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error on an inbound payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport refused a read or write and closed the connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer sent an invalid frame (bad opcode, length, or payload).
    #[error("Protocol error ({code}): {message}")]
    Protocol {
        /// Disconnect code reported to the errored handler.
        code: i32,
        /// Human-readable description.
        message: String,
    },

    /// A command or frame did not fit in the bounded buffer.
    #[error("Serialization overflow: output exceeds buffer capacity")]
    Overflow,

    /// The outbound queue is saturated; the command was dropped.
    #[error("Outbound queue full")]
    QueueFull,

    /// The operation needs an established connection.
    #[error("Not connected")]
    NotConnected,

    /// No transport is available for this platform.
    #[error("No transport available on this platform")]
    NoTransport,
}

impl RpcError {
    /// Build a protocol error carrying the read-corrupt code.
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        RpcError::Protocol {
            code: READ_CORRUPT,
            message: message.into(),
        }
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

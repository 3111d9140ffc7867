//! Error types for the telemetry core

use thiserror::Error;

/// Errors returned by the monitor handle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// The monitor actor has stopped and no longer accepts commands
    #[error("monitor actor has shut down")]
    ActorGone,
}

/// Transport-level failures on the detection feed
///
/// All variants are recoverable and drive the bounded reconnect policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("connection failed: {0}")]
    Connect(String),

    /// Handshake did not complete in time
    #[error("handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    /// Remote closed the stream with an error status
    #[error("connection closed abnormally (code {code}): {reason}")]
    AbnormalClose {
        /// Close code reported by the remote
        code: u16,
        /// Close reason reported by the remote
        reason: String,
    },

    /// Read or write failure on an established stream
    #[error("stream error: {0}")]
    Stream(String),
}

//! Error types for the SkyLink transport layer.

use thiserror::Error;

/// Errors that can occur on either telemetry channel.
///
/// None of these ever propagate into the flight engine; the links recover
/// locally (reconnect, queue for retry, or drop and log).
#[derive(Debug, Error)]
pub enum LinkError {
    /// Opening the persistent connection failed
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Sending on an open connection failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The backend answered with a non-success status
    #[error("HTTP status {0}")]
    Http(u16),

    /// Payload serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// The connection was closed mid-operation
    #[error("Connection closed")]
    Closed,
}

impl LinkError {
    /// Creates a connect error.
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Creates a send error.
    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }
}

//! Transport abstractions for the two telemetry channels.

use async_trait::async_trait;
use crate::error::LinkError;

/// An event surfaced by the persistent stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text frame arrived from the backend.
    Message(String),

    /// The peer closed the connection.
    Closed,

    /// The connection failed with a transport error.
    Error(String),
}

/// Abstraction over the persistent, bidirectional stream connection.
///
/// # Implementations
///
/// - **Production**: `WsTransport` - a WebSocket client
/// - **Simulation**: `SimStream` - in-memory with scriptable faults
///
/// The transport is connection-oriented but carries no reconnection policy
/// of its own: `StreamLink` owns the state machine and calls `connect()`
/// again after a close or error.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Attempts to open (or re-open) the connection.
    ///
    /// # Returns
    /// * `Ok(())` - the connection is established
    /// * `Err(LinkError)` - the attempt failed; the caller decides whether
    ///   to retry
    async fn connect(&self) -> Result<(), LinkError>;

    /// Sends one text frame over the open connection.
    ///
    /// Fails with `LinkError::NotConnected` if no connection is open.
    /// Success means the frame was handed to the transport, not that the
    /// peer received it.
    async fn send(&self, frame: String) -> Result<(), LinkError>;

    /// Waits for the next event on the connection.
    ///
    /// # Returns
    /// * `Some(event)` - a message, close, or error occurred
    /// * `None` - the transport was shut down by its owner
    async fn next_event(&self) -> Option<StreamEvent>;

    /// Closes the connection, if open.
    async fn close(&self);
}

/// Target endpoint for a discrete batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEndpoint {
    /// Periodic telemetry reports.
    Telemetry,

    /// Anomaly reports.
    Anomaly,
}

/// Abstraction over the discrete request/response channel.
///
/// # Implementations
///
/// - **Production**: `HttpTransport` - POST with a bearer credential
/// - **Simulation**: `SimBatch` - records bodies, toggleable failure
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Performs one request carrying a JSON body.
    ///
    /// # Returns
    /// * `Ok(())` - the backend accepted the report (2xx)
    /// * `Err(LinkError)` - transport failure or non-success response;
    ///   the caller decides whether the body is queued for retry
    async fn post(&self, endpoint: BatchEndpoint, body: String) -> Result<(), LinkError>;
}

//! Persistent stream link: connection state machine, linear-backoff
//! reconnection, telemetry push, and inbound command dispatch.
//!
//! The link owns the policy; the wire itself lives behind a
//! `StreamTransport` so production (WebSocket) and simulation (in-memory)
//! share this exact state machine.

use crate::config::StreamConfig;
use crate::engine::AnomalyEvent;
use crate::telemetry::{
    AnomalyAlertFrame, ConnectionFrame, DroneCommand, InboundFrame, PongFrame, TelemetryFrame,
    TelemetrySnapshot,
};
use skylink_env::{DroneId, LinkError, SessionId, StreamEvent, StreamTransport};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Connection lifecycle of the persistent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    /// Display label for the read surface.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
            Self::Reconnecting => "RECONNECTING",
            Self::Error => "ERROR",
        }
    }
}

/// Outcome of processing one transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDisposition {
    /// Nothing for the caller to do
    Idle,
    /// A backend command to re-enter the engine's public operations
    Command(DroneCommand),
    /// The connection dropped; the caller should run the reconnect loop
    ConnectionLost,
}

/// The persistent stream link.
pub struct StreamLink<T: StreamTransport> {
    transport: Arc<T>,
    config: StreamConfig,
    drone_id: DroneId,
    session: SessionId,
    state: ConnectionState,
    reconnect_attempts: u32,
}

impl<T: StreamTransport> StreamLink<T> {
    pub fn new(transport: Arc<T>, config: StreamConfig, drone_id: DroneId, session: SessionId) -> Self {
        Self {
            transport,
            config,
            drone_id,
            session,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status_label(&self) -> &'static str {
        self.state.label()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Shared handle to the underlying transport, for event polling.
    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    /// Attempts to open the connection.
    ///
    /// On success the attempt counter resets and the one-time session
    /// announcement goes out.
    pub async fn connect(&mut self, now: SystemTime) -> Result<(), LinkError> {
        match self.transport.connect().await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.reconnect_attempts = 0;
                info!(session = %self.session, "stream connected");
                self.send_announcement(now).await;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Error;
                warn!(error = %e, "stream connect failed");
                Err(e)
            }
        }
    }

    /// Schedules the next reconnect attempt.
    ///
    /// Increments the attempt counter first, then returns the linear
    /// backoff delay (`backoff x attempt`). Returns None once the budget
    /// is exhausted; the link then stays Disconnected for the rest of the
    /// process lifetime.
    pub fn schedule_reconnect(&mut self) -> Option<Duration> {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            self.state = ConnectionState::Disconnected;
            return None;
        }
        self.reconnect_attempts += 1;
        self.state = ConnectionState::Reconnecting;
        Some(self.config.reconnect_backoff * self.reconnect_attempts)
    }

    /// Processes one transport event.
    pub async fn handle_event(&mut self, event: StreamEvent, now: SystemTime) -> StreamDisposition {
        match event {
            StreamEvent::Message(raw) => match self.handle_frame(&raw, now).await {
                Some(command) => StreamDisposition::Command(command),
                None => StreamDisposition::Idle,
            },
            StreamEvent::Closed => {
                info!("stream closed by peer");
                self.state = ConnectionState::Disconnected;
                StreamDisposition::ConnectionLost
            }
            StreamEvent::Error(e) => {
                warn!(error = %e, "stream transport error");
                self.state = ConnectionState::Error;
                StreamDisposition::ConnectionLost
            }
        }
    }

    /// Sends the periodic telemetry frame.
    ///
    /// A no-op failure while not connected; the caller just skips the push.
    pub async fn send_telemetry(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let frame = TelemetryFrame::stream(snapshot, self.session, &self.drone_id);
        self.send_json(&frame).await
    }

    /// Sends an anomaly alert. No-op failure while not connected.
    pub async fn send_anomaly_alert(
        &mut self,
        event: AnomalyEvent,
        snapshot: &TelemetrySnapshot,
        now: SystemTime,
    ) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let frame = AnomalyAlertFrame::new(event.kind, event.severity, snapshot, &self.drone_id, now);
        self.send_json(&frame).await
    }

    async fn send_announcement(&mut self, now: SystemTime) {
        let frame = ConnectionFrame::announce(&self.drone_id, self.session, now);
        if let Err(e) = self.send_json(&frame).await {
            warn!(error = %e, "session announcement failed");
        }
    }

    async fn send_pong(&mut self, now: SystemTime) {
        if let Err(e) = self.send_json(&PongFrame::new(now)).await {
            debug!(error = %e, "pong reply failed");
        }
    }

    async fn send_json<P: serde::Serialize>(&mut self, payload: &P) -> Result<(), LinkError> {
        let body = serde_json::to_string(payload).map_err(LinkError::serialization)?;
        self.transport.send(body).await
    }

    /// Parses and dispatches one inbound frame.
    ///
    /// Protocol errors are logged and dropped; they never affect the
    /// connection state.
    async fn handle_frame(&mut self, raw: &str, now: SystemTime) -> Option<DroneCommand> {
        let frame: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "malformed inbound frame dropped");
                return None;
            }
        };

        match frame {
            InboundFrame::Command { command } => Some(command),
            InboundFrame::ConfigUpdate => {
                debug!("config update accepted");
                None
            }
            InboundFrame::Ping => {
                self.send_pong(now).await;
                None
            }
            InboundFrame::Unknown => {
                debug!("unknown inbound message type ignored");
                None
            }
        }
    }
}

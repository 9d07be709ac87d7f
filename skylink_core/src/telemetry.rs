//! Telemetry snapshots and the JSON wire model for both channels.
//!
//! A `TelemetrySnapshot` keeps raw f64 state; rounding is a wire concern.
//! The stream frame rounds coordinates to one decimal and the telemetry
//! figures to integers, while the batch body carries the raw values. Both
//! embed derived geo coordinates from the canvas mapping.

use crate::anomaly::{AnomalyKind, FlightMode, Severity};
use crate::geo;
use serde::{Deserialize, Serialize};
use skylink_env::{DroneId, SessionId};
use std::time::SystemTime;

/// Immutable point-in-time telemetry record, produced once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: SystemTime,
    pub x: f64,
    pub y: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub battery: f64,
    pub status: String,
    pub active: bool,
    pub mode: FlightMode,
    pub target_x: f64,
    pub target_y: f64,
}

/// Formats a wall-clock instant as an RFC 3339 timestamp for the wire.
pub fn wire_timestamp(t: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Canvas position plus its derived geo coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Raw canvas coordinates with the geo mapping applied.
    pub fn raw(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            latitude: geo::latitude_for_y(y),
            longitude: geo::longitude_for_x(x),
        }
    }

    /// Canvas coordinates rounded to one decimal, geo mapping unrounded.
    pub fn rounded(x: f64, y: f64) -> Self {
        Self {
            x: round1(x),
            y: round1(y),
            latitude: geo::latitude_for_y(y),
            longitude: geo::longitude_for_x(x),
        }
    }
}

/// The four telemetry figures common to both channels.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReadings {
    pub altitude: f64,
    pub speed: f64,
    pub direction: f64,
    pub battery: f64,
}

impl TelemetryReadings {
    fn raw(s: &TelemetrySnapshot) -> Self {
        Self {
            altitude: s.altitude,
            speed: s.speed,
            direction: s.heading,
            battery: s.battery,
        }
    }

    fn rounded(s: &TelemetrySnapshot) -> Self {
        Self {
            altitude: s.altitude.round(),
            speed: s.speed.round(),
            direction: s.heading.round(),
            battery: s.battery.round(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSection {
    pub mode: FlightMode,
    pub status_text: String,
    pub is_active: bool,
    pub has_anomaly: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetSection {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub source: &'static str,
    pub version: &'static str,
    pub data_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneSection {
    pub id: String,
    pub coordinates: Coordinates,
    pub telemetry: TelemetryReadings,
    pub status: StatusSection,
    pub target: TargetSection,
}

/// The stream channel's periodic `drone` telemetry frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryFrame {
    pub timestamp: String,
    pub session_id: String,
    pub drone: DroneSection,
    pub metadata: Metadata,
}

impl TelemetryFrame {
    /// Builds the rounded stream frame from a snapshot.
    pub fn stream(snapshot: &TelemetrySnapshot, session: SessionId, drone_id: &DroneId) -> Self {
        Self {
            timestamp: wire_timestamp(snapshot.timestamp),
            session_id: session.to_string(),
            drone: DroneSection {
                id: drone_id.to_string(),
                coordinates: Coordinates::rounded(snapshot.x, snapshot.y),
                telemetry: TelemetryReadings::rounded(snapshot),
                status: StatusSection {
                    mode: snapshot.mode,
                    status_text: snapshot.status.clone(),
                    is_active: snapshot.active,
                    has_anomaly: !snapshot.mode.is_normal(),
                },
                target: TargetSection {
                    x: snapshot.target_x.round(),
                    y: snapshot.target_y.round(),
                },
            },
            metadata: Metadata {
                source: "drone-simulator",
                version: "1.0.0",
                data_type: "real-time",
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSection {
    pub id: String,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub firmware: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSection {
    pub id: String,
    pub start_time: String,
    pub simulator: bool,
}

/// One-time session announcement sent on every successful stream open.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub drone: DeviceSection,
    pub session: SessionSection,
}

impl ConnectionFrame {
    pub fn announce(drone_id: &DroneId, session: SessionId, now: SystemTime) -> Self {
        let timestamp = wire_timestamp(now);
        Self {
            kind: "connection",
            timestamp: timestamp.clone(),
            drone: DeviceSection {
                id: drone_id.to_string(),
                name: "Simulation Drone",
                kind: "quadcopter",
                firmware: "2.1.4",
            },
            session: SessionSection {
                id: session.to_string(),
                start_time: timestamp,
                simulator: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySection {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub drone_id: String,
}

/// Stream-channel anomaly alert.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyAlertFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub anomaly: AnomalySection,
    pub coordinates: Coordinates,
}

impl AnomalyAlertFrame {
    pub fn new(
        anomaly: AnomalyKind,
        severity: Severity,
        snapshot: &TelemetrySnapshot,
        drone_id: &DroneId,
        now: SystemTime,
    ) -> Self {
        Self {
            kind: "anomaly_alert",
            timestamp: wire_timestamp(now),
            anomaly: AnomalySection {
                kind: anomaly,
                severity,
                description: snapshot.status.clone(),
                drone_id: drone_id.to_string(),
            },
            coordinates: Coordinates::raw(snapshot.x, snapshot.y),
        }
    }
}

/// Reply to an inbound `ping`.
#[derive(Debug, Clone, Serialize)]
pub struct PongFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
}

impl PongFrame {
    pub fn new(now: SystemTime) -> Self {
        Self {
            kind: "pong",
            timestamp: wire_timestamp(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub mode: FlightMode,
    pub status_text: String,
    pub is_active: bool,
}

/// Batch-channel telemetry body: the raw, unrounded equivalent of the
/// stream frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTelemetry {
    pub timestamp: String,
    pub drone_id: String,
    pub coordinates: Coordinates,
    pub telemetry: TelemetryReadings,
    pub status: BatchStatus,
}

impl BatchTelemetry {
    pub fn from_snapshot(snapshot: &TelemetrySnapshot, drone_id: &DroneId) -> Self {
        Self {
            timestamp: wire_timestamp(snapshot.timestamp),
            drone_id: drone_id.to_string(),
            coordinates: Coordinates::raw(snapshot.x, snapshot.y),
            telemetry: TelemetryReadings::raw(snapshot),
            status: BatchStatus {
                mode: snapshot.mode,
                status_text: snapshot.status.clone(),
                is_active: snapshot.active,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnomalySection {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
}

/// Batch-channel anomaly report body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnomaly {
    pub timestamp: String,
    pub drone_id: String,
    pub anomaly: BatchAnomalySection,
    pub coordinates: Coordinates,
}

impl BatchAnomaly {
    pub fn new(
        anomaly: AnomalyKind,
        snapshot: &TelemetrySnapshot,
        drone_id: &DroneId,
        now: SystemTime,
    ) -> Self {
        Self {
            timestamp: wire_timestamp(now),
            drone_id: drone_id.to_string(),
            anomaly: BatchAnomalySection {
                kind: anomaly,
                severity: anomaly.severity(),
                description: snapshot.status.clone(),
            },
            coordinates: Coordinates::raw(snapshot.x, snapshot.y),
        }
    }
}

/// Target coordinates carried by a `set_target` command.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TargetPoint {
    pub x: f64,
    pub y: f64,
}

/// A backend command re-entering the engine's public operations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DroneCommand {
    Start,
    Stop,
    Reset,
    TriggerAnomaly { anomaly_type: AnomalyKind },
    SetTarget { target: TargetPoint },
}

/// Inbound stream frames, discriminated by their `type` field.
///
/// Unknown types deserialize to `Unknown` so the dispatcher can log and
/// drop them without treating the payload as malformed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Command { command: DroneCommand },
    ConfigUpdate,
    Ping,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp: SystemTime::UNIX_EPOCH,
            x: 56.04,
            y: 200.49,
            altitude: 99.6,
            speed: 60.4,
            heading: 12.5,
            battery: 99.95,
            status: "Airborne".to_string(),
            active: true,
            mode: FlightMode::Normal,
            target_x: 550.2,
            target_y: 200.0,
        }
    }

    #[test]
    fn test_stream_frame_shape_and_rounding() {
        let frame = TelemetryFrame::stream(&snapshot(), SessionId::from_seed(1), &DroneId::default());
        let value: Value = serde_json::to_value(&frame).unwrap();

        assert!(value["sessionId"].as_str().unwrap().starts_with("session_"));
        assert_eq!(value["drone"]["id"], "DRONE_001");
        assert_eq!(value["drone"]["coordinates"]["x"], 56.0);
        assert_eq!(value["drone"]["coordinates"]["y"], 200.5);
        assert_eq!(value["drone"]["telemetry"]["altitude"], 100.0);
        assert_eq!(value["drone"]["telemetry"]["direction"], 13.0);
        assert_eq!(value["drone"]["status"]["mode"], "normal");
        assert_eq!(value["drone"]["status"]["hasAnomaly"], false);
        assert_eq!(value["drone"]["target"]["x"], 550.0);
        assert_eq!(value["metadata"]["dataType"], "real-time");
        // Geo mapping stays unrounded
        assert!(value["drone"]["coordinates"]["latitude"].as_f64().unwrap() > 40.9);
    }

    #[test]
    fn test_batch_body_keeps_raw_values() {
        let body = BatchTelemetry::from_snapshot(&snapshot(), &DroneId::default());
        let value: Value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["droneId"], "DRONE_001");
        assert_eq!(value["coordinates"]["x"], 56.04);
        assert_eq!(value["telemetry"]["battery"], 99.95);
        assert_eq!(value["status"]["statusText"], "Airborne");
        assert!(value["status"].get("hasAnomaly").is_none());
    }

    #[test]
    fn test_anomaly_alert_shape() {
        let frame = AnomalyAlertFrame::new(
            AnomalyKind::Altitude,
            AnomalyKind::Altitude.severity(),
            &snapshot(),
            &DroneId::default(),
            SystemTime::UNIX_EPOCH,
        );
        let value: Value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["type"], "anomaly_alert");
        assert_eq!(value["anomaly"]["type"], "altitude");
        assert_eq!(value["anomaly"]["severity"], "high");
        assert_eq!(value["anomaly"]["droneId"], "DRONE_001");
    }

    #[test]
    fn test_connection_frame_shape() {
        let frame =
            ConnectionFrame::announce(&DroneId::default(), SessionId::from_seed(1), SystemTime::UNIX_EPOCH);
        let value: Value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["type"], "connection");
        assert_eq!(value["drone"]["type"], "quadcopter");
        assert_eq!(value["session"]["simulator"], true);
        assert_eq!(value["session"]["startTime"], value["timestamp"]);
    }

    #[test]
    fn test_inbound_command_parsing() {
        let raw = r#"{"type":"command","command":{"action":"trigger_anomaly","anomaly_type":"route"}}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        match frame {
            InboundFrame::Command { command } => assert_eq!(
                command,
                DroneCommand::TriggerAnomaly {
                    anomaly_type: AnomalyKind::Route
                }
            ),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_inbound_set_target_parsing() {
        let raw = r#"{"type":"command","command":{"action":"set_target","target":{"x":120.0,"y":80.0}}}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        match frame {
            InboundFrame::Command { command } => assert_eq!(
                command,
                DroneCommand::SetTarget {
                    target: TargetPoint { x: 120.0, y: 80.0 }
                }
            ),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_inbound_ping_and_config_update() {
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"type":"ping"}"#).unwrap(),
            InboundFrame::Ping
        ));
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"type":"config_update","config":{"rate":2}}"#)
                .unwrap(),
            InboundFrame::ConfigUpdate
        ));
    }

    #[test]
    fn test_inbound_unknown_type_tolerated() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"firmware_update","url":"http://x"}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Unknown));
    }

    #[test]
    fn test_malformed_inbound_is_error() {
        assert!(serde_json::from_str::<InboundFrame>("not json").is_err());
        assert!(serde_json::from_str::<InboundFrame>(r#"{"no_type":1}"#).is_err());
    }
}

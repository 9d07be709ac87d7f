//! Scenario catalog for the deterministic harness.

use std::str::FromStr;

/// Available test scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Plain flight: cadences, history, and both channels healthy
    NominalFlight,
    /// Route diversion and waypoint recovery
    RouteAnomaly,
    /// Altitude decay, floor, and recovery nudge
    AltitudeAnomaly,
    /// Speed decay, battery drain, and floor
    SpeedAnomaly,
    /// Stream drop, linear-backoff reconnects, exhaustion
    StreamOutage,
    /// Batch outage filling the retry queue past capacity, then recovery
    BatchBackpressure,
}

impl ScenarioId {
    pub fn name(self) -> &'static str {
        match self {
            Self::NominalFlight => "nominal_flight",
            Self::RouteAnomaly => "route_anomaly",
            Self::AltitudeAnomaly => "altitude_anomaly",
            Self::SpeedAnomaly => "speed_anomaly",
            Self::StreamOutage => "stream_outage",
            Self::BatchBackpressure => "batch_backpressure",
        }
    }

    pub fn all() -> Vec<ScenarioId> {
        vec![
            Self::NominalFlight,
            Self::RouteAnomaly,
            Self::AltitudeAnomaly,
            Self::SpeedAnomaly,
            Self::StreamOutage,
            Self::BatchBackpressure,
        ]
    }
}

impl FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nominal_flight" => Ok(Self::NominalFlight),
            "route_anomaly" => Ok(Self::RouteAnomaly),
            "altitude_anomaly" => Ok(Self::AltitudeAnomaly),
            "speed_anomaly" => Ok(Self::SpeedAnomaly),
            "stream_outage" => Ok(Self::StreamOutage),
            "batch_backpressure" => Ok(Self::BatchBackpressure),
            other => Err(format!("unknown scenario: {}", other)),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

//! Anomaly kinds and the timed anomaly state machine.
//!
//! An anomaly is a temporary, timed deviation from nominal flight: each
//! kind carries a fixed tick budget and a per-tick effect. The state
//! machine decrements the budget once per tick and reports expiry so the
//! engine can run its return-to-normal transition.

use crate::drone::DroneState;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Speed never drops below this during a speed anomaly.
pub const SPEED_FLOOR: f64 = 10.0;

/// Extra battery drain per tick while a speed anomaly is active.
pub const SPEED_ANOMALY_BATTERY_DRAIN: f64 = 0.2;

/// Altitude lost per tick during an altitude anomaly.
pub const ALTITUDE_DROP_PER_TICK: f64 = 2.0;

/// The three operator-triggerable anomaly kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    /// Divert routing to a random point anywhere on the canvas
    Route,
    /// Steady altitude loss
    Altitude,
    /// Speed decay with accelerated battery drain
    Speed,
}

impl AnomalyKind {
    /// Fixed duration budget in ticks.
    pub fn duration_ticks(self) -> u32 {
        match self {
            Self::Route => 100,
            Self::Altitude => 50,
            Self::Speed => 80,
        }
    }

    /// Fixed severity lookup used by both telemetry channels.
    pub fn severity(self) -> Severity {
        match self {
            Self::Altitude => Severity::High,
            Self::Route => Severity::Medium,
            Self::Speed => Severity::Low,
        }
    }

    /// Status label shown while this anomaly is active.
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Route => "ANOMALY: Route deviation",
            Self::Altitude => "ANOMALY: Altitude loss",
            Self::Speed => "ANOMALY: Speed loss",
        }
    }

    /// Wire name used in payloads and commands.
    pub fn name(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Altitude => "altitude",
            Self::Speed => "speed",
        }
    }

    /// All kinds, for scenario enumeration.
    pub fn all() -> [AnomalyKind; 3] {
        [Self::Route, Self::Altitude, Self::Speed]
    }
}

impl FromStr for AnomalyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "route" => Ok(Self::Route),
            "altitude" => Ok(Self::Altitude),
            "speed" => Ok(Self::Speed),
            other => Err(format!("unknown anomaly kind: {}", other)),
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Alert severity, fixed per anomaly kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// The drone's current flight mode as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightMode {
    Normal,
    Route,
    Altitude,
    Speed,
}

impl FlightMode {
    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Route => "route",
            Self::Altitude => "altitude",
            Self::Speed => "speed",
        }
    }
}

impl From<Option<AnomalyKind>> for FlightMode {
    fn from(kind: Option<AnomalyKind>) -> Self {
        match kind {
            None => Self::Normal,
            Some(AnomalyKind::Route) => Self::Route,
            Some(AnomalyKind::Altitude) => Self::Altitude,
            Some(AnomalyKind::Speed) => Self::Speed,
        }
    }
}

/// The timed anomaly state machine.
///
/// Invariant: the mode is Normal exactly when no tick budget remains. A
/// non-zero budget decrements exactly once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyState {
    /// Active anomaly and its remaining tick budget
    active: Option<(AnomalyKind, u32)>,

    /// Waypoint restored when routing returns to normal
    recovery_target: (f64, f64),
}

impl AnomalyState {
    /// Creates a normal-mode state remembering the given recovery waypoint.
    pub fn new(recovery_target: (f64, f64)) -> Self {
        Self {
            active: None,
            recovery_target,
        }
    }

    /// Returns the active anomaly kind, if any.
    pub fn kind(&self) -> Option<AnomalyKind> {
        self.active.map(|(kind, _)| kind)
    }

    /// Returns the current flight mode.
    pub fn mode(&self) -> FlightMode {
        FlightMode::from(self.kind())
    }

    pub fn is_normal(&self) -> bool {
        self.active.is_none()
    }

    /// Remaining tick budget (0 in normal mode).
    pub fn remaining_ticks(&self) -> u32 {
        self.active.map_or(0, |(_, remaining)| remaining)
    }

    /// The waypoint to restore on recovery.
    pub fn recovery_target(&self) -> (f64, f64) {
        self.recovery_target
    }

    /// Arms the given anomaly with its full duration budget.
    ///
    /// Triggering while another anomaly is active replaces it.
    pub fn trigger(&mut self, kind: AnomalyKind) {
        self.active = Some((kind, kind.duration_ticks()));
    }

    /// Returns to normal mode, zeroing the budget. Idempotent.
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Applies one tick of the active anomaly to the drone.
    ///
    /// Decrements the budget and applies the mode-specific effect. Returns
    /// true when the budget just expired; the caller is expected to run the
    /// return-to-normal transition.
    pub fn step(&mut self, drone: &mut DroneState) -> bool {
        let Some((kind, remaining)) = self.active.as_mut() else {
            return false;
        };

        *remaining -= 1;

        match kind {
            // The diverted target set at trigger time does the work
            AnomalyKind::Route => {}
            AnomalyKind::Altitude => {
                drone.altitude = (drone.altitude - ALTITUDE_DROP_PER_TICK).max(0.0);
            }
            AnomalyKind::Speed => {
                drone.speed = (drone.speed - 1.0).max(SPEED_FLOOR);
                drone.battery = (drone.battery - SPEED_ANOMALY_BATTERY_DRAIN).max(0.0);
            }
        }

        if *remaining == 0 {
            self.active = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_duration_budgets() {
        assert_eq!(AnomalyKind::Route.duration_ticks(), 100);
        assert_eq!(AnomalyKind::Altitude.duration_ticks(), 50);
        assert_eq!(AnomalyKind::Speed.duration_ticks(), 80);
    }

    #[test]
    fn test_severity_lookup() {
        assert_eq!(AnomalyKind::Altitude.severity(), Severity::High);
        assert_eq!(AnomalyKind::Route.severity(), Severity::Medium);
        assert_eq!(AnomalyKind::Speed.severity(), Severity::Low);
    }

    #[test]
    fn test_mode_matches_budget() {
        let mut state = AnomalyState::new((550.0, 200.0));
        assert!(state.is_normal());
        assert_eq!(state.remaining_ticks(), 0);

        state.trigger(AnomalyKind::Altitude);
        assert_eq!(state.mode(), FlightMode::Altitude);
        assert_eq!(state.remaining_ticks(), 50);
    }

    #[test]
    fn test_altitude_step_effect() {
        let mut state = AnomalyState::new((550.0, 200.0));
        let mut drone = DroneState::new();
        state.trigger(AnomalyKind::Altitude);

        assert!(!state.step(&mut drone));
        assert_eq!(drone.altitude, 98.0);
        assert_eq!(state.remaining_ticks(), 49);
    }

    #[test]
    fn test_altitude_floors_at_zero() {
        let mut state = AnomalyState::new((550.0, 200.0));
        let mut drone = DroneState::new();
        drone.altitude = 1.0;
        state.trigger(AnomalyKind::Altitude);

        state.step(&mut drone);
        assert_eq!(drone.altitude, 0.0);
        state.step(&mut drone);
        assert_eq!(drone.altitude, 0.0);
    }

    #[test]
    fn test_speed_step_effect() {
        let mut state = AnomalyState::new((550.0, 200.0));
        let mut drone = DroneState::new();
        state.trigger(AnomalyKind::Speed);

        state.step(&mut drone);
        assert_eq!(drone.speed, 59.0);
        assert_relative_eq!(drone.battery, 99.8, max_relative = 1e-12);
    }

    #[test]
    fn test_speed_floors_at_ten() {
        let mut state = AnomalyState::new((550.0, 200.0));
        let mut drone = DroneState::new();
        drone.speed = 10.5;
        state.trigger(AnomalyKind::Speed);

        state.step(&mut drone);
        assert_eq!(drone.speed, SPEED_FLOOR);
        state.step(&mut drone);
        assert_eq!(drone.speed, SPEED_FLOOR);
    }

    #[test]
    fn test_expiry_after_full_budget() {
        let mut state = AnomalyState::new((550.0, 200.0));
        let mut drone = DroneState::new();
        state.trigger(AnomalyKind::Altitude);

        for tick in 1..=50 {
            let expired = state.step(&mut drone);
            assert_eq!(expired, tick == 50);
        }
        assert!(state.is_normal());
        assert_eq!(state.remaining_ticks(), 0);
    }

    #[test]
    fn test_retrigger_replaces_budget() {
        let mut state = AnomalyState::new((550.0, 200.0));
        let mut drone = DroneState::new();
        state.trigger(AnomalyKind::Speed);
        for _ in 0..30 {
            state.step(&mut drone);
        }

        state.trigger(AnomalyKind::Route);
        assert_eq!(state.mode(), FlightMode::Route);
        assert_eq!(state.remaining_ticks(), 100);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in AnomalyKind::all() {
            assert_eq!(kind.name().parse::<AnomalyKind>().unwrap(), kind);
        }
        assert!("hover".parse::<AnomalyKind>().is_err());
    }
}

//! The flight engine: kinematic update plus the anomaly state machine.
//!
//! The engine exclusively owns the drone and anomaly state. Every numeric
//! update is saturating (clamped), so no operation here can fail. Each
//! tick runs strictly in order: anomaly step, motion step, position clamp,
//! battery step, snapshot emit.

use crate::anomaly::{AnomalyKind, AnomalyState, FlightMode, Severity};
use crate::config::{EngineConfig, CANVAS_HEIGHT, CANVAS_WIDTH, TARGET_MARGIN};
use crate::drone::{
    DroneState, NOMINAL_ALTITUDE, NOMINAL_SPEED, STATUS_AIRBORNE, STATUS_LOW_BATTERY,
    STATUS_STANDBY, STATUS_STOPPED,
};
use crate::history::HistoryBuffer;
use crate::telemetry::TelemetrySnapshot;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::SystemTime;
use tracing::{info, warn};

/// The drone counts as arrived within this distance of its waypoint.
pub const ARRIVAL_RADIUS: f64 = 5.0;

/// Battery cost per tick of actual movement.
pub const MOVE_BATTERY_DRAIN: f64 = 0.05;

/// Speed is divided by this to get the per-tick step in pixels.
pub const SPEED_SCALE: f64 = 10.0;

/// Battery percentage below which the low-battery warning overrides the
/// recovered status label.
pub const LOW_BATTERY_THRESHOLD: f64 = 20.0;

/// An anomaly trigger, reported to both telemetry channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    pub severity: Severity,
}

/// Owns and advances the simulated drone.
pub struct FlightEngine {
    config: EngineConfig,
    drone: DroneState,
    anomaly: AnomalyState,
    history: HistoryBuffer,
    rng: ChaCha8Rng,
    tick_count: u64,
}

impl FlightEngine {
    /// Creates an engine in its construction-default state.
    pub fn new(config: EngineConfig) -> Self {
        let drone = DroneState::new();
        let anomaly = AnomalyState::new((drone.target_x, drone.target_y));
        let history = HistoryBuffer::new(config.history_capacity);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Self {
            config,
            drone,
            anomaly,
            history,
            rng,
            tick_count: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn drone(&self) -> &DroneState {
        &self.drone
    }

    pub fn mode(&self) -> FlightMode {
        self.anomaly.mode()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn is_running(&self) -> bool {
        self.drone.active
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Begins the flight. Idempotent while already running.
    pub fn start(&mut self) {
        if self.drone.active {
            return;
        }
        self.drone.active = true;
        self.drone.status = STATUS_AIRBORNE.to_string();
        info!(drone = %self.config.drone_id, "simulation started");
    }

    /// Halts the tick loop. The persistent connection is left alone.
    pub fn stop(&mut self) {
        self.drone.active = false;
        self.drone.status = STATUS_STOPPED.to_string();
        info!(drone = %self.config.drone_id, "simulation stopped");
    }

    /// Stops and reinitializes all state to construction defaults.
    pub fn reset(&mut self) {
        self.stop();
        self.drone = DroneState::new();
        self.anomaly = AnomalyState::new((self.drone.target_x, self.drone.target_y));
        self.history.clear();
        self.tick_count = 0;
        info!(drone = %self.config.drone_id, "simulation reset");
    }

    /// Arms an anomaly and returns the event for channel reporting.
    ///
    /// A route anomaly immediately diverts the waypoint to a uniformly
    /// random point over the full canvas, not the normal-mode window.
    pub fn trigger_anomaly(&mut self, kind: AnomalyKind) -> AnomalyEvent {
        self.anomaly.trigger(kind);
        self.drone.status = kind.status_label().to_string();

        if kind == AnomalyKind::Route {
            self.drone.target_x = self.rng.gen::<f64>() * CANVAS_WIDTH;
            self.drone.target_y = self.rng.gen::<f64>() * CANVAS_HEIGHT;
        }

        warn!(
            drone = %self.config.drone_id,
            kind = %kind,
            severity = kind.severity().as_str(),
            "anomaly triggered"
        );

        AnomalyEvent {
            kind,
            severity: kind.severity(),
        }
    }

    /// Returns to normal mode: restores the recovery waypoint and nudges
    /// altitude and speed partway back toward nominal.
    pub fn return_to_normal(&mut self) {
        self.anomaly.clear();

        let (tx, ty) = self.anomaly.recovery_target();
        self.drone.target_x = tx;
        self.drone.target_y = ty;

        self.drone.altitude = (self.drone.altitude + 5.0).min(NOMINAL_ALTITUDE);
        self.drone.speed = (self.drone.speed + 5.0).min(NOMINAL_SPEED);

        self.drone.status = if self.drone.active {
            STATUS_AIRBORNE
        } else {
            STATUS_STANDBY
        }
        .to_string();
        if self.drone.battery < LOW_BATTERY_THRESHOLD {
            self.drone.status = STATUS_LOW_BATTERY.to_string();
        }

        info!(drone = %self.config.drone_id, "returned to normal flight");
    }

    /// Reassigns the waypoint (backend `set_target` command).
    pub fn set_target(&mut self, x: f64, y: f64) {
        self.drone.target_x = x;
        self.drone.target_y = y;
    }

    /// Advances the simulation by one tick.
    ///
    /// Returns the emitted snapshot, or None while the engine is stopped.
    pub fn tick(&mut self, now: SystemTime) -> Option<TelemetrySnapshot> {
        if !self.drone.active {
            return None;
        }

        // 1. Anomaly step
        if self.anomaly.step(&mut self.drone) {
            self.return_to_normal();
        }

        // 2. Motion step. The distance measured here also decides the
        // battery cost below.
        let dx = self.drone.target_x - self.drone.x;
        let dy = self.drone.target_y - self.drone.y;
        let distance = (dx * dx + dy * dy).sqrt();

        if distance > ARRIVAL_RADIUS {
            self.drone.heading = dy.atan2(dx).to_degrees();
            let step = self.drone.speed / SPEED_SCALE;
            self.drone.x += (dx / distance) * step;
            self.drone.y += (dy / distance) * step;
        } else if self.anomaly.is_normal() {
            // During an anomaly the diverted target owns the routing
            self.pick_normal_target();
        }

        // 3. Clamp into the canvas
        self.drone.clamp_to_canvas();

        // 4. Battery step
        if distance > ARRIVAL_RADIUS {
            self.drone.battery = (self.drone.battery - MOVE_BATTERY_DRAIN).max(0.0);
        }

        // 5. Snapshot emit
        self.tick_count += 1;
        let snapshot = self.snapshot(now);
        self.history.record(snapshot.clone());
        Some(snapshot)
    }

    /// Builds a snapshot of the current state without advancing it.
    pub fn snapshot(&self, now: SystemTime) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp: now,
            x: self.drone.x,
            y: self.drone.y,
            altitude: self.drone.altitude,
            speed: self.drone.speed,
            heading: self.drone.heading,
            battery: self.drone.battery,
            status: self.drone.status.clone(),
            active: self.drone.active,
            mode: self.anomaly.mode(),
            target_x: self.drone.target_x,
            target_y: self.drone.target_y,
        }
    }

    fn pick_normal_target(&mut self) {
        self.drone.target_x = TARGET_MARGIN + self.rng.gen::<f64>() * (CANVAS_WIDTH - 2.0 * TARGET_MARGIN);
        self.drone.target_y = TARGET_MARGIN + self.rng.gen::<f64>() * (CANVAS_HEIGHT - 2.0 * TARGET_MARGIN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::POSITION_MARGIN;
    use approx::assert_relative_eq;

    fn engine() -> FlightEngine {
        FlightEngine::new(EngineConfig::default())
    }

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut engine = engine();
        engine.start();
        engine.start();
        assert!(engine.is_running());
        assert_eq!(engine.drone().status, STATUS_AIRBORNE);
    }

    #[test]
    fn test_tick_noop_while_stopped() {
        let mut engine = engine();
        assert!(engine.tick(now()).is_none());
        assert_eq!(engine.history().len(), 0);
    }

    #[test]
    fn test_single_tick_motion() {
        // target=(550,200), start=(50,200), speed=60: one tick moves
        // exactly speed/10 = 6 units straight east.
        let mut engine = engine();
        engine.start();

        let snapshot = engine.tick(now()).unwrap();
        assert_relative_eq!(snapshot.x, 56.0, max_relative = 1e-12);
        assert_relative_eq!(snapshot.y, 200.0, max_relative = 1e-12);
        assert_eq!(snapshot.heading, 0.0);
        assert_relative_eq!(snapshot.battery, 99.95, max_relative = 1e-12);
    }

    #[test]
    fn test_position_and_battery_invariants() {
        let mut engine = engine();
        engine.start();

        let mut previous_battery = engine.drone().battery;
        for i in 0..2000 {
            if i % 400 == 100 {
                engine.trigger_anomaly(AnomalyKind::Route);
            }
            let moved = engine.drone().distance_to_target() > ARRIVAL_RADIUS;
            let snapshot = engine.tick(now()).unwrap();

            assert!(snapshot.x >= POSITION_MARGIN && snapshot.x <= CANVAS_WIDTH - POSITION_MARGIN);
            assert!(snapshot.y >= POSITION_MARGIN && snapshot.y <= CANVAS_HEIGHT - POSITION_MARGIN);
            assert!(snapshot.battery >= 0.0 && snapshot.battery <= 100.0);
            if moved {
                assert!(snapshot.battery <= previous_battery);
            }
            previous_battery = snapshot.battery;
        }
    }

    #[test]
    fn test_altitude_anomaly_full_cycle() {
        let mut engine = engine();
        engine.start();
        engine.trigger_anomaly(AnomalyKind::Altitude);
        assert_eq!(engine.mode(), FlightMode::Altitude);

        for tick in 1..=50 {
            engine.tick(now());
            if tick < 50 {
                assert_eq!(engine.mode(), FlightMode::Altitude);
                assert_relative_eq!(
                    engine.drone().altitude,
                    100.0 - 2.0 * tick as f64,
                    max_relative = 1e-12
                );
            }
        }

        // Budget spent: back to normal, altitude nudged +5 from its floor
        assert_eq!(engine.mode(), FlightMode::Normal);
        assert_relative_eq!(engine.drone().altitude, 5.0, max_relative = 1e-12);
        assert_eq!(engine.drone().status, STATUS_AIRBORNE);
    }

    #[test]
    fn test_speed_anomaly_floors_and_drains() {
        let mut engine = engine();
        engine.start();
        engine.trigger_anomaly(AnomalyKind::Speed);

        let mut previous_speed = engine.drone().speed;
        for _ in 0..80 {
            engine.tick(now());
            let speed = engine.drone().speed;
            assert!(speed <= previous_speed || engine.mode() == FlightMode::Normal);
            assert!(speed >= crate::anomaly::SPEED_FLOOR || engine.mode() == FlightMode::Normal);
            previous_speed = speed;
        }
        assert_eq!(engine.mode(), FlightMode::Normal);
        // 60 decays to the floor of 10 after 50 ticks, then +5 on recovery
        assert_relative_eq!(engine.drone().speed, 15.0, max_relative = 1e-12);

        // Anomaly ticks cost 0.2 extra battery on top of movement
        let expected = 100.0 - 80.0 * 0.2 - 80.0 * MOVE_BATTERY_DRAIN;
        assert_relative_eq!(engine.drone().battery, expected, max_relative = 1e-9);
    }

    #[test]
    fn test_route_anomaly_samples_full_canvas() {
        // The normal-mode window is 50..550 x 50..350; the route diversion
        // must be able to land outside it.
        let mut escaped_window = false;
        for seed in 0..64 {
            let mut engine = FlightEngine::new(EngineConfig {
                seed,
                ..EngineConfig::default()
            });
            engine.start();
            engine.trigger_anomaly(AnomalyKind::Route);

            let (tx, ty) = (engine.drone().target_x, engine.drone().target_y);
            assert!((0.0..=CANVAS_WIDTH).contains(&tx));
            assert!((0.0..=CANVAS_HEIGHT).contains(&ty));
            if !(TARGET_MARGIN..=CANVAS_WIDTH - TARGET_MARGIN).contains(&tx)
                || !(TARGET_MARGIN..=CANVAS_HEIGHT - TARGET_MARGIN).contains(&ty)
            {
                escaped_window = true;
            }
        }
        assert!(escaped_window);
    }

    #[test]
    fn test_route_expiry_restores_recovery_target() {
        let mut engine = engine();
        engine.start();
        engine.trigger_anomaly(AnomalyKind::Route);

        for _ in 0..100 {
            engine.tick(now());
        }

        assert_eq!(engine.mode(), FlightMode::Normal);
        assert_eq!(engine.drone().target_x, 550.0);
        assert_eq!(engine.drone().target_y, 200.0);
    }

    #[test]
    fn test_arrival_picks_new_target_only_in_normal_mode() {
        let mut engine = engine();
        engine.start();
        engine.trigger_anomaly(AnomalyKind::Altitude);

        // Park the drone on its waypoint
        engine.set_target(engine.drone().x, engine.drone().y);
        let target = (engine.drone().target_x, engine.drone().target_y);
        engine.tick(now());
        // Anomaly active: arrival must not re-roll the waypoint
        assert_eq!((engine.drone().target_x, engine.drone().target_y), target);
    }

    #[test]
    fn test_low_battery_status_after_recovery() {
        let mut engine = engine();
        engine.start();
        engine.trigger_anomaly(AnomalyKind::Speed);

        // Drain the battery below the warning threshold, then recover
        for _ in 0..80 {
            engine.drone.battery = 10.0;
            engine.tick(now());
        }
        assert_eq!(engine.mode(), FlightMode::Normal);
        assert_eq!(engine.drone().status, STATUS_LOW_BATTERY);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut engine = engine();
        engine.start();
        engine.trigger_anomaly(AnomalyKind::Speed);
        for _ in 0..25 {
            engine.tick(now());
        }

        engine.reset();
        assert!(!engine.is_running());
        assert_eq!(engine.drone().x, 50.0);
        assert_eq!(engine.drone().battery, 100.0);
        assert_eq!(engine.drone().status, STATUS_STANDBY);
        assert_eq!(engine.mode(), FlightMode::Normal);
        assert!(engine.history().is_empty());
        assert_eq!(engine.tick_count(), 0);
    }

    #[test]
    fn test_history_records_every_tick() {
        let mut engine = engine();
        engine.start();
        for _ in 0..30 {
            engine.tick(now());
        }
        assert_eq!(engine.history().len(), 20);
        assert_eq!(engine.tick_count(), 30);
    }
}

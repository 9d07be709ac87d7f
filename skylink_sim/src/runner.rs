//! Scenario runner: drives the engine and both links tick-by-tick on the
//! virtual clock and checks the system's invariants along the way.
//!
//! The runner owns the exact phase relationship of the real runtime: one
//! engine tick per 100 ms, a stream push every 5th tick, a batch send
//! every 10th tick with an opportunistic retry drain after each success.

use crate::context::SimContext;
use crate::scenarios::ScenarioId;
use crate::transport::{SimBatch, SimStream};

use skylink_core::config::{
    BatchConfig, EngineConfig, StreamConfig, CANVAS_HEIGHT, CANVAS_WIDTH, POSITION_MARGIN,
};
use skylink_core::engine::ARRIVAL_RADIUS;
use skylink_core::stream::StreamDisposition;
use skylink_core::{
    AnomalyKind, BatchLink, ConnectionState, FlightEngine, FlightMode, StreamLink,
    StreamingMethod, TelemetrySnapshot,
};
use skylink_env::{DroneId, SessionId, SkyContext, StreamEvent, StreamTransport};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,
    pub passed: bool,
    pub total_ticks: u64,
    pub failure_reason: Option<String>,
}

/// Runs scenarios deterministically from a master seed.
pub struct ScenarioRunner {
    seed: u64,
    nominal_ticks: u64,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            nominal_ticks: 600,
        }
    }

    /// Overrides the nominal-flight duration in ticks.
    pub fn with_duration(mut self, ticks: u64) -> Self {
        self.nominal_ticks = ticks;
        self
    }

    /// Runs one scenario to completion.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let mut harness = Harness::new(self.seed);

        let outcome = match scenario {
            ScenarioId::NominalFlight => harness.nominal_flight(self.nominal_ticks).await,
            ScenarioId::RouteAnomaly => harness.route_anomaly().await,
            ScenarioId::AltitudeAnomaly => harness.altitude_anomaly().await,
            ScenarioId::SpeedAnomaly => harness.speed_anomaly().await,
            ScenarioId::StreamOutage => harness.stream_outage().await,
            ScenarioId::BatchBackpressure => harness.batch_backpressure().await,
        };

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            total_ticks: harness.tick_index,
            failure_reason: outcome.err(),
        }
    }
}

fn ensure(condition: bool, message: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}

fn close_to(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// One wired-up system under test.
struct Harness {
    ctx: Arc<SimContext>,
    engine: FlightEngine,
    stream_transport: Arc<SimStream>,
    batch_transport: Arc<SimBatch>,
    stream: StreamLink<SimStream>,
    batch: BatchLink<SimBatch>,
    method: StreamingMethod,
    tick_index: u64,
    previous_battery: f64,
}

impl Harness {
    fn new(seed: u64) -> Self {
        let ctx = SimContext::shared(seed);

        // Engine targets draw from their own seed stream, as the physics
        // oracle does, so network scripting never shifts the trajectory
        let engine_seed = seed.wrapping_mul(0x9e3779b97f4a7c15);
        let engine = FlightEngine::new(EngineConfig {
            seed: engine_seed,
            ..EngineConfig::default()
        });

        let stream_transport = Arc::new(SimStream::new());
        let batch_transport = Arc::new(SimBatch::new());

        let stream = StreamLink::new(
            stream_transport.clone(),
            StreamConfig::default(),
            DroneId::default(),
            SessionId::from_seed(seed),
        );
        let batch = BatchLink::new(
            batch_transport.clone(),
            BatchConfig::default(),
            DroneId::default(),
        );

        let previous_battery = engine.drone().battery;

        Self {
            ctx,
            engine,
            stream_transport,
            batch_transport,
            stream,
            batch,
            method: StreamingMethod::Both,
            tick_index: 0,
            previous_battery,
        }
    }

    /// Starts the engine and opens the stream.
    async fn launch(&mut self) -> Result<(), String> {
        self.engine.start();
        self.stream
            .connect(self.ctx.system_time())
            .await
            .map_err(|e| format!("initial connect failed: {}", e))
    }

    /// Advances one tick with the runtime's cadences, checking invariants.
    async fn step(&mut self) -> Result<TelemetrySnapshot, String> {
        self.tick_index += 1;
        self.ctx.sleep(Duration::from_millis(100)).await;

        let moved = self.engine.drone().distance_to_target() > ARRIVAL_RADIUS;
        let snapshot = self
            .engine
            .tick(self.ctx.system_time())
            .ok_or("engine stopped unexpectedly")?;

        self.check_invariants(&snapshot, moved)?;

        if self.tick_index % 5 == 0 && self.method.uses_stream() {
            // Failure while disconnected is a deliberate no-op
            let _ = self.stream.send_telemetry(&snapshot).await;
        }

        if self.tick_index % 10 == 0 && self.method.uses_batch() {
            if self.batch.send_telemetry(&snapshot).await.is_ok() {
                let drained = self.batch.retry_failed().await;
                if drained > 0 {
                    debug!(drained, "retry queue drained");
                }
            }
        }

        Ok(snapshot)
    }

    async fn step_n(&mut self, ticks: u64) -> Result<(), String> {
        for _ in 0..ticks {
            self.step().await?;
        }
        Ok(())
    }

    fn check_invariants(&mut self, snapshot: &TelemetrySnapshot, moved: bool) -> Result<(), String> {
        ensure(
            (POSITION_MARGIN..=CANVAS_WIDTH - POSITION_MARGIN).contains(&snapshot.x)
                && (POSITION_MARGIN..=CANVAS_HEIGHT - POSITION_MARGIN).contains(&snapshot.y),
            format!(
                "tick {}: position ({:.2}, {:.2}) outside canvas",
                self.tick_index, snapshot.x, snapshot.y
            ),
        )?;
        ensure(
            (0.0..=100.0).contains(&snapshot.battery),
            format!("tick {}: battery {:.2} out of range", self.tick_index, snapshot.battery),
        )?;
        if moved {
            ensure(
                snapshot.battery <= self.previous_battery + 1e-9,
                format!("tick {}: battery increased while moving", self.tick_index),
            )?;
        }
        self.previous_battery = snapshot.battery;

        ensure(snapshot.altitude >= 0.0, "altitude went negative")?;
        ensure(
            self.engine.history().len() <= self.engine.history().capacity(),
            "history exceeded capacity",
        )?;
        ensure(
            self.batch.queue_len() <= 100,
            format!("tick {}: retry queue exceeded capacity", self.tick_index),
        )?;
        Ok(())
    }

    /// Triggers an anomaly and reports it on both channels, the way the
    /// runtime does.
    async fn trigger_and_report(&mut self, kind: AnomalyKind) -> Result<(), String> {
        let event = self.engine.trigger_anomaly(kind);
        let snapshot = self.engine.snapshot(self.ctx.system_time());

        if self.method.uses_stream() {
            let _ = self
                .stream
                .send_anomaly_alert(event, &snapshot, self.ctx.system_time())
                .await;
        }
        if self.method.uses_batch() {
            self.batch
                .send_anomaly_report(kind, &snapshot, self.ctx.system_time())
                .await;
        }
        Ok(())
    }

    async fn nominal_flight(&mut self, ticks: u64) -> Result<(), String> {
        self.launch().await?;
        self.step_n(ticks).await?;

        ensure(
            self.engine.history().len() == self.engine.history().capacity().min(ticks as usize),
            "history did not fill to capacity",
        )?;
        ensure(
            self.stream_transport.frames_of_type("connection").len() == 1,
            "expected exactly one session announcement",
        )?;
        let pushes = self.stream_transport.frames_of_type("drone").len() as u64;
        ensure(
            pushes == ticks / 5,
            format!("expected {} stream pushes, saw {}", ticks / 5, pushes),
        )?;
        let posts = self.batch_transport.telemetry_bodies().len() as u64;
        ensure(
            posts == ticks / 10,
            format!("expected {} batch posts, saw {}", ticks / 10, posts),
        )?;
        ensure(self.batch.queue_len() == 0, "retry queue should stay empty")?;
        Ok(())
    }

    async fn route_anomaly(&mut self) -> Result<(), String> {
        self.launch().await?;
        self.step_n(50).await?;

        self.trigger_and_report(AnomalyKind::Route).await?;
        ensure(self.engine.mode() == FlightMode::Route, "mode should be route")?;
        let (tx, ty) = (self.engine.drone().target_x, self.engine.drone().target_y);
        ensure(
            (0.0..=CANVAS_WIDTH).contains(&tx) && (0.0..=CANVAS_HEIGHT).contains(&ty),
            "diverted target outside full canvas",
        )?;

        // The full 100-tick budget runs out, then routing recovers
        self.step_n(100).await?;
        ensure(self.engine.mode() == FlightMode::Normal, "route anomaly did not expire")?;
        ensure(
            self.engine.drone().target_x == 550.0 && self.engine.drone().target_y == 200.0,
            "recovery waypoint not restored",
        )?;

        let alerts = self.stream_transport.frames_of_type("anomaly_alert");
        ensure(alerts.len() == 1, "expected one stream anomaly alert")?;
        ensure(
            alerts[0]["anomaly"]["severity"].as_str() == Some("medium"),
            "route severity should be medium",
        )?;
        ensure(
            self.batch_transport.anomaly_bodies().len() == 1,
            "expected one batch anomaly report",
        )?;
        Ok(())
    }

    async fn altitude_anomaly(&mut self) -> Result<(), String> {
        self.launch().await?;
        self.trigger_and_report(AnomalyKind::Altitude).await?;

        for tick in 1..=50u64 {
            self.step().await?;
            if tick < 50 {
                let expected = (100.0 - 2.0 * tick as f64).max(0.0);
                ensure(
                    close_to(self.engine.drone().altitude, expected),
                    format!("tick {}: altitude should be {}", tick, expected),
                )?;
                ensure(
                    self.engine.mode() == FlightMode::Altitude,
                    "anomaly ended early",
                )?;
            }
        }

        ensure(self.engine.mode() == FlightMode::Normal, "altitude anomaly did not expire")?;
        // Hit the floor at tick 50, then the +5 recovery nudge
        ensure(
            close_to(self.engine.drone().altitude, 5.0),
            "recovery nudge should leave altitude at 5",
        )?;

        let alerts = self.stream_transport.frames_of_type("anomaly_alert");
        ensure(
            alerts[0]["anomaly"]["severity"].as_str() == Some("high"),
            "altitude severity should be high",
        )?;
        Ok(())
    }

    async fn speed_anomaly(&mut self) -> Result<(), String> {
        self.launch().await?;
        self.trigger_and_report(AnomalyKind::Speed).await?;

        let mut previous_speed = self.engine.drone().speed;
        for tick in 1..=80u64 {
            self.step().await?;
            let speed = self.engine.drone().speed;
            if tick < 80 {
                ensure(speed <= previous_speed, "speed increased mid-anomaly")?;
                ensure(speed >= 10.0, "speed fell below its floor")?;
            }
            previous_speed = speed;
        }

        ensure(self.engine.mode() == FlightMode::Normal, "speed anomaly did not expire")?;
        // 60 decays to the floor of 10, then the +5 recovery nudge
        ensure(close_to(self.engine.drone().speed, 15.0), "recovery speed should be 15")?;

        // 0.2 anomaly drain plus 0.05 movement drain, every tick
        let expected_battery = 100.0 - 80.0 * 0.25;
        ensure(
            close_to(self.engine.drone().battery, expected_battery),
            format!(
                "battery should be {:.2}, is {:.2}",
                expected_battery,
                self.engine.drone().battery
            ),
        )?;
        Ok(())
    }

    async fn stream_outage(&mut self) -> Result<(), String> {
        self.launch().await?;
        self.step_n(20).await?;

        // Peer drops the connection
        self.stream_transport.inject_close();
        let event = self
            .stream
            .transport()
            .next_event()
            .await
            .ok_or("expected a close event")?;
        ensure(event == StreamEvent::Closed, "expected a close event")?;
        let disposition = self.stream.handle_event(event, self.ctx.system_time()).await;
        ensure(
            disposition == StreamDisposition::ConnectionLost,
            "close should drop the connection",
        )?;

        // Every reconnect attempt fails; the backoff must be linear and
        // the budget must cap at five attempts
        self.stream_transport.fail_next_connects(u32::MAX);
        let mut delays = Vec::new();
        while let Some(delay) = self.stream.schedule_reconnect() {
            ensure(
                self.stream.state() == ConnectionState::Reconnecting,
                "link should report reconnecting",
            )?;
            self.ctx.sleep(delay).await;
            delays.push(delay);
            let _ = self.stream.connect(self.ctx.system_time()).await;
        }

        let expected: Vec<Duration> = (1..=5u32).map(|n| Duration::from_millis(3000) * n).collect();
        ensure(delays == expected, format!("unexpected backoff schedule: {:?}", delays))?;
        ensure(
            self.stream.state() == ConnectionState::Disconnected,
            "exhausted link should be disconnected",
        )?;
        // 1 initial success + 5 failed retries
        ensure(
            self.stream_transport.connect_attempts() == 6,
            "unexpected connect attempt count",
        )?;

        // The simulation itself never notices
        let before = self.engine.tick_count();
        self.step_n(10).await?;
        ensure(
            self.engine.tick_count() == before + 10,
            "engine stalled during outage",
        )?;
        Ok(())
    }

    async fn batch_backpressure(&mut self) -> Result<(), String> {
        self.launch().await?;
        self.batch_transport.set_failing(true);

        // 150 failed sends: the queue caps at 100, dropping oldest
        self.step_n(1500).await?;
        ensure(
            self.batch.queue_len() == 100,
            format!("queue should cap at 100, is {}", self.batch.queue_len()),
        )?;
        ensure(
            self.batch_transport.posts().is_empty(),
            "no post should get through an outage",
        )?;

        // First healthy send flushes the whole backlog in order
        self.batch_transport.set_failing(false);
        self.step_n(10).await?;
        ensure(self.batch.queue_len() == 0, "queue should drain after recovery")?;

        let bodies = self.batch_transport.telemetry_bodies();
        // 1 live send + 100 retried bodies
        ensure(
            bodies.len() == 101,
            format!("expected 101 delivered bodies, saw {}", bodies.len()),
        )?;
        Ok(())
    }
}

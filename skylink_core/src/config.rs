//! Configuration for the flight engine and both telemetry links.

use skylink_env::DroneId;
use std::time::Duration;

/// Canvas width in pixels.
pub const CANVAS_WIDTH: f64 = 600.0;

/// Canvas height in pixels.
pub const CANVAS_HEIGHT: f64 = 400.0;

/// Positions are clamped this far inside the canvas edge.
pub const POSITION_MARGIN: f64 = 10.0;

/// Margin of the normal-mode target sampling window.
///
/// Route anomalies ignore this and sample the full canvas.
pub const TARGET_MARGIN: f64 = 50.0;

/// Configuration for the flight engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Drone identity carried on every payload
    pub drone_id: DroneId,

    /// Simulation tick period (default: 100 ms)
    pub tick_interval: Duration,

    /// History buffer capacity (default: 20)
    pub history_capacity: usize,

    /// Seed for target selection; the agent binary seeds from OS entropy
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drone_id: DroneId::default(),
            tick_interval: Duration::from_millis(100),
            history_capacity: 20,
            seed: 42,
        }
    }
}

/// Configuration for the persistent stream link.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Backend WebSocket URL
    pub url: String,

    /// Telemetry push cadence (default: 500 ms, one push per five ticks)
    pub push_interval: Duration,

    /// Consecutive failed reconnects tolerated before going terminal
    pub max_reconnect_attempts: u32,

    /// Linear backoff unit; attempt N waits N times this
    pub reconnect_backoff: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/drone-data".to_string(),
            push_interval: Duration::from_millis(500),
            max_reconnect_attempts: 5,
            reconnect_backoff: Duration::from_millis(3000),
        }
    }
}

/// Configuration for the periodic batch link.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Backend REST API base URL
    pub base_url: String,

    /// Bearer credential attached to every request
    pub bearer_token: String,

    /// Timer cadence for discrete sends (default: 1000 ms)
    pub send_interval: Duration,

    /// Retry queue capacity; oldest entries are dropped beyond this
    pub retry_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            bearer_token: "YOUR_API_TOKEN".to_string(),
            send_interval: Duration::from_millis(1000),
            retry_capacity: 100,
        }
    }
}

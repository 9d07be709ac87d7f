//! SkyLink Core - Single-Drone Flight Simulation with Dual-Channel Telemetry
//!
//! This library simulates one drone over discrete 100 ms ticks and relays
//! its telemetry to a backend over two transports with different
//! reliability characteristics:
//! 1. **Flight Engine**: kinematic update + timed anomaly state machine,
//!    all numerics saturating, no failure modes
//! 2. **Stream Link**: persistent low-latency push with linear-backoff
//!    reconnection and inbound command dispatch
//! 3. **Batch Link**: periodic discrete reports with a bounded, lossy
//!    retry queue
//!
//! All I/O goes through the `skylink_env` traits, so the whole stack runs
//! unchanged in production (tokio + sockets) and in the deterministic
//! simulation harness.

pub mod anomaly;
pub mod batch;
pub mod config;
pub mod drone;
pub mod engine;
pub mod geo;
pub mod history;
pub mod net;
pub mod runtime;
pub mod stream;
pub mod telemetry;

// Re-export key types for convenience
pub use anomaly::{AnomalyKind, AnomalyState, FlightMode, Severity};
pub use batch::BatchLink;
pub use config::{BatchConfig, EngineConfig, StreamConfig};
pub use drone::DroneState;
pub use engine::{AnomalyEvent, FlightEngine};
pub use history::HistoryBuffer;
pub use net::{HttpTransport, WsTransport};
pub use runtime::{DroneRuntime, EngineCommand, RuntimeHandle, RuntimeView, StreamingMethod};
pub use stream::{ConnectionState, StreamDisposition, StreamLink};
pub use telemetry::{DroneCommand, TelemetrySnapshot};

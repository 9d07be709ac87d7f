//! SkyLink Deterministic Simulation Harness
//!
//! Runs the full SkyLink stack - flight engine, stream link, batch link -
//! in a controlled environment where every source of non-determinism is
//! intercepted:
//! - **Time**: a virtual clock advanced by the runner, never the OS
//! - **Stream**: an in-memory transport with scriptable connects, closes,
//!   and inbound frames
//! - **Batch**: an in-memory transport with a failure toggle
//! - **Randomness**: engine targets derive from the master seed
//!
//! A failing scenario is reproducible from its seed alone.
//!
//! # Usage
//!
//! ```ignore
//! use skylink_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::StreamOutage).await;
//! assert!(result.passed);
//! ```

mod context;
mod runner;
mod transport;
pub mod scenarios;

pub use context::SimContext;
pub use runner::{ScenarioResult, ScenarioRunner};
pub use transport::{SimBatch, SimStream};

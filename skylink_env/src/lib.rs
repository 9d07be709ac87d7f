//! SkyLink Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the SkyLink
//! engines to run in both **Production** (tokio + real sockets) and
//! **Simulation** (virtual clock + in-memory transports) environments.
//!
//! # Core Concept: Intercept the Edges
//!
//! Everything the flight engine and the telemetry links touch that is
//! non-deterministic goes through a trait here:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - The persistent stream connection (`StreamTransport`)
//! - The discrete batch requests (`BatchTransport`)
//!
//! The simulation harness swaps all three for deterministic versions, so a
//! failing run is reproducible from its seed alone.
//!
//! # Example
//!
//! ```ignore
//! use skylink_env::{SkyContext, StreamTransport};
//!
//! async fn push_loop<Ctx: SkyContext, S: StreamTransport>(ctx: &Ctx, stream: &S) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(500)).await;
//!         let _ = stream.send(latest_frame()).await;
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::SkyContext;
pub use transport::{BatchEndpoint, BatchTransport, StreamEvent, StreamTransport};
pub use types::{DroneId, SessionId};
pub use error::LinkError;
pub use tokio_impl::TokioContext;

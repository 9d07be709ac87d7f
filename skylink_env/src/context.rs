//! Core environment context trait for SkyLink components.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for environment interaction.
///
/// This trait abstracts time and task scheduling so that the flight engine
/// and both telemetry links can run in production (tokio) and simulation
/// (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and the OS clock
/// - **Simulation**: `SimContext` (skylink_sim) - manually advanced clock
///
/// # Determinism
///
/// All wall-clock timestamps that end up on the wire flow through
/// `system_time()`, so simulated runs produce identical payloads for a
/// given seed.
#[async_trait]
pub trait SkyContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for internal timers and duration measurements.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for telemetry timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}

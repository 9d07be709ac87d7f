//! Periodic batch link: discrete telemetry posts with a bounded, lossy
//! retry queue.

use crate::config::BatchConfig;
use crate::telemetry::{BatchAnomaly, BatchTelemetry, TelemetrySnapshot};
use skylink_env::{BatchEndpoint, BatchTransport, DroneId, LinkError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::anomaly::AnomalyKind;

/// The periodic batch link.
///
/// Each timer fire is a single request/response exchange. A failed
/// telemetry send is queued for retry; a failed anomaly report is only
/// logged. The queue is capacity-bounded with drop-oldest backpressure:
/// telemetry is a continuous low-value-per-sample stream, so losing the
/// oldest entries is tolerated by design of the protocol, not an error.
pub struct BatchLink<T: BatchTransport> {
    transport: Arc<T>,
    config: BatchConfig,
    drone_id: DroneId,
    queue: VecDeque<String>,
}

impl<T: BatchTransport> BatchLink<T> {
    pub fn new(transport: Arc<T>, config: BatchConfig, drone_id: DroneId) -> Self {
        Self {
            transport,
            config,
            drone_id,
            queue: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Number of bodies waiting for retry.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Sends one telemetry report.
    ///
    /// On transport failure or a non-success response the serialized body
    /// is queued for a later `retry_failed` pass and the error returned.
    pub async fn send_telemetry(&mut self, snapshot: &TelemetrySnapshot) -> Result<(), LinkError> {
        let payload = BatchTelemetry::from_snapshot(snapshot, &self.drone_id);
        let body = serde_json::to_string(&payload).map_err(LinkError::serialization)?;

        match self.transport.post(BatchEndpoint::Telemetry, body.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, queued = self.queue.len() + 1, "telemetry send failed, queued for retry");
                self.enqueue(body);
                Err(e)
            }
        }
    }

    /// Drains the retry queue front-to-back.
    ///
    /// Stops at the first failure, re-inserting that entry at the front so
    /// order is preserved and a persistent outage cannot busy-loop.
    /// Returns the number of bodies delivered.
    pub async fn retry_failed(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(body) = self.queue.pop_front() {
            if let Err(e) = self.transport.post(BatchEndpoint::Telemetry, body.clone()).await {
                debug!(error = %e, remaining = self.queue.len() + 1, "retry still failing");
                self.queue.push_front(body);
                break;
            }
            delivered += 1;
        }
        delivered
    }

    /// Fire-and-forget anomaly report; failures are logged, never queued.
    pub async fn send_anomaly_report(
        &mut self,
        kind: AnomalyKind,
        snapshot: &TelemetrySnapshot,
        now: SystemTime,
    ) {
        let payload = BatchAnomaly::new(kind, snapshot, &self.drone_id, now);
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "anomaly report serialization failed");
                return;
            }
        };

        if let Err(e) = self.transport.post(BatchEndpoint::Anomaly, body).await {
            warn!(error = %e, kind = %kind, "anomaly report failed");
        }
    }

    fn enqueue(&mut self, body: String) {
        if self.queue.len() >= self.config.retry_capacity {
            self.queue.pop_front();
        }
        self.queue.push_back(body);
    }
}

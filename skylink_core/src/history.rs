//! Fixed-capacity, newest-first log of telemetry snapshots.

use crate::telemetry::TelemetrySnapshot;
use std::collections::VecDeque;

/// Newest-first ring of the most recent telemetry snapshots.
///
/// Entries beyond capacity are silently evicted oldest-first. Read-only to
/// everything except the engine that records into it.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<TelemetrySnapshot>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Creates an empty buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepends a snapshot, evicting the oldest entry past capacity.
    pub fn record(&mut self, snapshot: TelemetrySnapshot) {
        self.entries.push_front(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Iterates over up to `n` entries, newest first.
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &TelemetrySnapshot> {
        self.entries.iter().take(n)
    }

    /// The most recent snapshot, if any.
    pub fn newest(&self) -> Option<&TelemetrySnapshot> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::FlightMode;
    use std::time::SystemTime;

    fn snapshot_at(x: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            timestamp: SystemTime::UNIX_EPOCH,
            x,
            y: 200.0,
            altitude: 100.0,
            speed: 60.0,
            heading: 0.0,
            battery: 100.0,
            status: "Airborne".to_string(),
            active: true,
            mode: FlightMode::Normal,
            target_x: 550.0,
            target_y: 200.0,
        }
    }

    #[test]
    fn test_newest_first_ordering() {
        let mut history = HistoryBuffer::new(20);
        history.record(snapshot_at(1.0));
        history.record(snapshot_at(2.0));
        history.record(snapshot_at(3.0));

        let xs: Vec<f64> = history.latest(10).map(|s| s.x).collect();
        assert_eq!(xs, vec![3.0, 2.0, 1.0]);
        assert_eq!(history.newest().unwrap().x, 3.0);
    }

    #[test]
    fn test_capacity_eviction() {
        let mut history = HistoryBuffer::new(20);
        for i in 0..30 {
            history.record(snapshot_at(i as f64));
        }

        assert_eq!(history.len(), 20);
        // Oldest ten were evicted; entry 29 is newest
        assert_eq!(history.newest().unwrap().x, 29.0);
        let oldest = history.latest(20).last().unwrap().x;
        assert_eq!(oldest, 10.0);
    }

    #[test]
    fn test_latest_does_not_mutate() {
        let mut history = HistoryBuffer::new(20);
        history.record(snapshot_at(1.0));
        let _ = history.latest(5).count();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut history = HistoryBuffer::new(20);
        history.record(snapshot_at(1.0));
        history.clear();
        assert!(history.is_empty());
    }
}

//! Scriptable in-memory transports with fault injection.

use async_trait::async_trait;
use skylink_env::{BatchEndpoint, BatchTransport, LinkError, StreamEvent, StreamTransport};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Simulated stream transport.
///
/// Records every outbound frame and lets scenarios script connect
/// failures and inject inbound events.
pub struct SimStream {
    /// Next N connect attempts fail before one succeeds
    fail_connects: Mutex<u32>,

    /// Total connect attempts observed
    connect_attempts: Mutex<u32>,

    connected: Mutex<bool>,
    sent: Mutex<Vec<String>>,

    events_tx: mpsc::Sender<StreamEvent>,
    events_rx: tokio::sync::Mutex<mpsc::Receiver<StreamEvent>>,
}

impl SimStream {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            fail_connects: Mutex::new(0),
            connect_attempts: Mutex::new(0),
            connected: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
        }
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        *self.fail_connects.lock().unwrap() = n;
    }

    /// Total connect attempts seen so far.
    pub fn connect_attempts(&self) -> u32 {
        *self.connect_attempts.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    /// Queues an inbound text frame for the link's event loop.
    pub fn inject_message(&self, frame: impl Into<String>) {
        let _ = self.events_tx.try_send(StreamEvent::Message(frame.into()));
    }

    /// Queues an unsolicited close.
    pub fn inject_close(&self) {
        *self.connected.lock().unwrap() = false;
        let _ = self.events_tx.try_send(StreamEvent::Closed);
    }

    /// Queues a transport error.
    pub fn inject_error(&self, message: impl Into<String>) {
        *self.connected.lock().unwrap() = false;
        let _ = self.events_tx.try_send(StreamEvent::Error(message.into()));
    }

    /// All frames sent so far.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames whose `type` field matches, parsed as JSON.
    ///
    /// Telemetry frames carry no `type` field; ask for `"drone"` to get
    /// them.
    pub fn frames_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent_frames()
            .iter()
            .filter_map(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .filter(|value| match value.get("type") {
                Some(t) => t.as_str() == Some(kind),
                None => kind == "drone",
            })
            .collect()
    }
}

impl Default for SimStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamTransport for SimStream {
    async fn connect(&self) -> Result<(), LinkError> {
        *self.connect_attempts.lock().unwrap() += 1;

        let mut fail = self.fail_connects.lock().unwrap();
        if *fail > 0 {
            *fail -= 1;
            return Err(LinkError::connect("simulated refusal"));
        }
        drop(fail);

        *self.connected.lock().unwrap() = true;
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn next_event(&self) -> Option<StreamEvent> {
        let mut rx = self.events_rx.lock().await;
        rx.recv().await
    }

    async fn close(&self) {
        *self.connected.lock().unwrap() = false;
    }
}

/// Simulated batch transport with a failure toggle.
pub struct SimBatch {
    failing: Mutex<bool>,
    posts: Mutex<Vec<(BatchEndpoint, String)>>,
    attempts: Mutex<u32>,
}

impl SimBatch {
    pub fn new() -> Self {
        Self {
            failing: Mutex::new(false),
            posts: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        }
    }

    /// Makes every request fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Total requests attempted, including failures.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }

    /// Accepted requests in arrival order.
    pub fn posts(&self) -> Vec<(BatchEndpoint, String)> {
        self.posts.lock().unwrap().clone()
    }

    /// Accepted telemetry bodies, parsed as JSON.
    pub fn telemetry_bodies(&self) -> Vec<serde_json::Value> {
        self.bodies_for(BatchEndpoint::Telemetry)
    }

    /// Accepted anomaly bodies, parsed as JSON.
    pub fn anomaly_bodies(&self) -> Vec<serde_json::Value> {
        self.bodies_for(BatchEndpoint::Anomaly)
    }

    fn bodies_for(&self, endpoint: BatchEndpoint) -> Vec<serde_json::Value> {
        self.posts()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .filter_map(|(_, body)| serde_json::from_str(body).ok())
            .collect()
    }
}

impl Default for SimBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchTransport for SimBatch {
    async fn post(&self, endpoint: BatchEndpoint, body: String) -> Result<(), LinkError> {
        *self.attempts.lock().unwrap() += 1;

        if *self.failing.lock().unwrap() {
            return Err(LinkError::Http(503));
        }
        self.posts.lock().unwrap().push((endpoint, body));
        Ok(())
    }
}

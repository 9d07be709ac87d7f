//! Runtime orchestration: one engine task and two independent link tasks
//! on a single cooperative scheduler.
//!
//! The engine exclusively owns the mutable state. Both links read it only
//! through a watch-published immutable view and feed back only through the
//! command channel, which re-enters the engine's public operations. A slow
//! or dead link never stalls the tick loop: view publication is a watch
//! send and anomaly fanout uses try_send.

use crate::batch::BatchLink;
use crate::engine::{AnomalyEvent, FlightEngine};
use crate::stream::{ConnectionState, StreamDisposition, StreamLink};
use crate::telemetry::{DroneCommand, TelemetrySnapshot};
use skylink_env::{BatchTransport, SkyContext, StreamTransport};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::anomaly::AnomalyKind;
use tokio::sync::{mpsc, watch};

/// Which channel(s) carry telemetry outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMethod {
    Persistent,
    Batch,
    Both,
}

impl StreamingMethod {
    pub fn uses_stream(self) -> bool {
        matches!(self, Self::Persistent | Self::Both)
    }

    pub fn uses_batch(self) -> bool {
        matches!(self, Self::Batch | Self::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Batch => "batch",
            Self::Both => "both",
        }
    }
}

impl Default for StreamingMethod {
    fn default() -> Self {
        Self::Persistent
    }
}

impl FromStr for StreamingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persistent" | "websocket" => Ok(Self::Persistent),
            "batch" | "http" => Ok(Self::Batch),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown streaming method: {}", other)),
        }
    }
}

/// Control-surface commands injected into the engine task.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Start,
    Stop,
    Reset,
    TriggerAnomaly(AnomalyKind),
    ReturnToNormal,
    SetTarget { x: f64, y: f64 },
    SetStreamingMethod(StreamingMethod),
}

impl From<DroneCommand> for EngineCommand {
    fn from(command: DroneCommand) -> Self {
        match command {
            DroneCommand::Start => Self::Start,
            DroneCommand::Stop => Self::Stop,
            DroneCommand::Reset => Self::Reset,
            DroneCommand::TriggerAnomaly { anomaly_type } => Self::TriggerAnomaly(anomaly_type),
            DroneCommand::SetTarget { target } => Self::SetTarget {
                x: target.x,
                y: target.y,
            },
        }
    }
}

/// Immutable view of the simulation, republished after every tick and
/// every applied command.
#[derive(Debug, Clone)]
pub struct RuntimeView {
    /// Latest state snapshot (also carries mode and the active flag)
    pub snapshot: TelemetrySnapshot,

    /// Current streaming method
    pub method: StreamingMethod,

    /// Up to the ten most recent history entries, newest first, for the
    /// renderer's trailing path
    pub trail: Vec<TelemetrySnapshot>,
}

/// Length of the trail published to the read surface.
const TRAIL_LENGTH: usize = 10;

/// Control and read surface handed to the embedding application.
#[derive(Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    view_rx: watch::Receiver<RuntimeView>,
    conn_rx: watch::Receiver<ConnectionState>,
}

impl RuntimeHandle {
    pub async fn start(&self) {
        self.send(EngineCommand::Start).await;
    }

    pub async fn stop(&self) {
        self.send(EngineCommand::Stop).await;
    }

    pub async fn reset(&self) {
        self.send(EngineCommand::Reset).await;
    }

    pub async fn trigger_anomaly(&self, kind: AnomalyKind) {
        self.send(EngineCommand::TriggerAnomaly(kind)).await;
    }

    pub async fn return_to_normal(&self) {
        self.send(EngineCommand::ReturnToNormal).await;
    }

    pub async fn set_target(&self, x: f64, y: f64) {
        self.send(EngineCommand::SetTarget { x, y }).await;
    }

    pub async fn set_streaming_method(&self, method: StreamingMethod) {
        self.send(EngineCommand::SetStreamingMethod(method)).await;
    }

    /// Latest published view.
    pub fn view(&self) -> RuntimeView {
        self.view_rx.borrow().clone()
    }

    /// Current stream connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.conn_rx.borrow()
    }

    /// Display label for the stream connection.
    pub fn connection_label(&self) -> &'static str {
        self.connection_state().label()
    }

    async fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).await.is_err() {
            warn!("runtime is gone, command dropped");
        }
    }
}

/// Spawns the engine and link tasks and returns the control handle.
pub struct DroneRuntime;

impl DroneRuntime {
    pub fn spawn<Ctx, S, B>(
        ctx: Arc<Ctx>,
        engine: FlightEngine,
        stream: StreamLink<S>,
        batch: BatchLink<B>,
    ) -> RuntimeHandle
    where
        Ctx: SkyContext,
        S: StreamTransport,
        B: BatchTransport,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (stream_alert_tx, stream_alert_rx) = mpsc::channel(16);
        let (batch_alert_tx, batch_alert_rx) = mpsc::channel(16);

        let initial = RuntimeView {
            snapshot: engine.snapshot(ctx.system_time()),
            method: StreamingMethod::default(),
            trail: Vec::new(),
        };
        let (view_tx, view_rx) = watch::channel(initial);
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Disconnected);

        ctx.spawn(
            "skylink-engine",
            engine_task(
                ctx.clone(),
                engine,
                cmd_rx,
                view_tx,
                stream_alert_tx,
                batch_alert_tx,
            ),
        );
        ctx.spawn(
            "skylink-stream",
            stream_task(
                ctx.clone(),
                stream,
                view_rx.clone(),
                stream_alert_rx,
                cmd_tx.clone(),
                conn_tx,
            ),
        );
        ctx.spawn(
            "skylink-batch",
            batch_task(ctx.clone(), batch, view_rx.clone(), batch_alert_rx),
        );

        RuntimeHandle {
            cmd_tx,
            view_rx,
            conn_rx,
        }
    }
}

async fn engine_task<Ctx: SkyContext>(
    ctx: Arc<Ctx>,
    mut engine: FlightEngine,
    mut cmd_rx: mpsc::Receiver<EngineCommand>,
    view_tx: watch::Sender<RuntimeView>,
    stream_alerts: mpsc::Sender<AnomalyEvent>,
    batch_alerts: mpsc::Sender<AnomalyEvent>,
) {
    let tick_interval = engine.config().tick_interval;
    let mut method = StreamingMethod::default();

    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                let Some(command) = command else {
                    // Every handle dropped: runtime shuts down
                    break;
                };
                match command {
                    EngineCommand::Start => engine.start(),
                    EngineCommand::Stop => engine.stop(),
                    EngineCommand::Reset => engine.reset(),
                    EngineCommand::ReturnToNormal => engine.return_to_normal(),
                    EngineCommand::SetTarget { x, y } => engine.set_target(x, y),
                    EngineCommand::TriggerAnomaly(kind) => {
                        let event = engine.trigger_anomaly(kind);
                        // try_send: a stalled link must not block the engine
                        if method.uses_stream() {
                            if stream_alerts.try_send(event).is_err() {
                                debug!("stream alert dropped");
                            }
                        }
                        if method.uses_batch() {
                            if batch_alerts.try_send(event).is_err() {
                                debug!("batch alert dropped");
                            }
                        }
                    }
                    EngineCommand::SetStreamingMethod(new_method) => {
                        method = new_method;
                        info!(method = method.as_str(), "streaming method switched");
                    }
                }
                publish(&view_tx, &engine, method, &ctx);
            }
            _ = ctx.sleep(tick_interval) => {
                if engine.is_running() && engine.tick(ctx.system_time()).is_some() {
                    publish(&view_tx, &engine, method, &ctx);
                }
            }
        }
    }
}

fn publish<Ctx: SkyContext>(
    view_tx: &watch::Sender<RuntimeView>,
    engine: &FlightEngine,
    method: StreamingMethod,
    ctx: &Arc<Ctx>,
) {
    let view = RuntimeView {
        snapshot: engine.snapshot(ctx.system_time()),
        method,
        trail: engine.history().latest(TRAIL_LENGTH).cloned().collect(),
    };
    let _ = view_tx.send(view);
}

async fn stream_task<Ctx: SkyContext, S: StreamTransport>(
    ctx: Arc<Ctx>,
    mut link: StreamLink<S>,
    view_rx: watch::Receiver<RuntimeView>,
    mut alert_rx: mpsc::Receiver<AnomalyEvent>,
    cmd_tx: mpsc::Sender<EngineCommand>,
    conn_tx: watch::Sender<ConnectionState>,
) {
    let push_interval = link.config().push_interval;
    let transport = link.transport();

    // Initial handshake, with the same backoff policy as any later drop
    if link.connect(ctx.system_time()).await.is_err() {
        reconnect(&ctx, &mut link, &conn_tx).await;
    }
    let _ = conn_tx.send(link.state());

    loop {
        tokio::select! {
            event = transport.next_event(), if link.is_connected() => {
                let Some(event) = event else {
                    // Transport shut down by its owner
                    break;
                };
                match link.handle_event(event, ctx.system_time()).await {
                    StreamDisposition::Command(command) => {
                        if cmd_tx.send(command.into()).await.is_err() {
                            break;
                        }
                    }
                    StreamDisposition::ConnectionLost => {
                        let _ = conn_tx.send(link.state());
                        reconnect(&ctx, &mut link, &conn_tx).await;
                    }
                    StreamDisposition::Idle => {}
                }
                let _ = conn_tx.send(link.state());
            }
            _ = ctx.sleep(push_interval) => {
                let view = view_rx.borrow().clone();
                if view.snapshot.active && view.method.uses_stream() {
                    if let Err(e) = link.send_telemetry(&view.snapshot).await {
                        debug!(error = %e, "stream push skipped");
                    }
                }
            }
            event = alert_rx.recv() => {
                let Some(event) = event else { break };
                let snapshot = view_rx.borrow().snapshot.clone();
                if let Err(e) = link
                    .send_anomaly_alert(event, &snapshot, ctx.system_time())
                    .await
                {
                    debug!(error = %e, "stream anomaly alert skipped");
                }
            }
        }
    }
}

/// Runs the linear-backoff reconnect loop until it succeeds or the budget
/// is exhausted. Returns true on success.
async fn reconnect<Ctx: SkyContext, S: StreamTransport>(
    ctx: &Arc<Ctx>,
    link: &mut StreamLink<S>,
    conn_tx: &watch::Sender<ConnectionState>,
) -> bool {
    while let Some(delay) = link.schedule_reconnect() {
        let _ = conn_tx.send(link.state());
        ctx.sleep(delay).await;
        info!(attempt = link.reconnect_attempts(), "attempting stream reconnect");
        if link.connect(ctx.system_time()).await.is_ok() {
            let _ = conn_tx.send(link.state());
            return true;
        }
    }
    let _ = conn_tx.send(link.state());
    warn!("stream reconnect budget exhausted; link stays down");
    false
}

async fn batch_task<Ctx: SkyContext, B: BatchTransport>(
    ctx: Arc<Ctx>,
    mut link: BatchLink<B>,
    view_rx: watch::Receiver<RuntimeView>,
    mut alert_rx: mpsc::Receiver<AnomalyEvent>,
) {
    let send_interval = link.config().send_interval;

    loop {
        tokio::select! {
            _ = ctx.sleep(send_interval) => {
                let view = view_rx.borrow().clone();
                if view.snapshot.active && view.method.uses_batch() {
                    if link.send_telemetry(&view.snapshot).await.is_ok() {
                        // Transport is healthy: flush the backlog in order
                        let drained = link.retry_failed().await;
                        if drained > 0 {
                            info!(drained, "retry queue flushed");
                        }
                    }
                }
            }
            event = alert_rx.recv() => {
                let Some(event) = event else { break };
                let snapshot = view_rx.borrow().snapshot.clone();
                link.send_anomaly_report(event.kind, &snapshot, ctx.system_time())
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, EngineConfig, StreamConfig};
    use crate::telemetry::TargetPoint;
    use async_trait::async_trait;
    use skylink_env::{
        BatchEndpoint, DroneId, LinkError, SessionId, StreamEvent, TokioContext,
    };
    use std::sync::Mutex;

    struct NullStream;

    #[async_trait]
    impl StreamTransport for NullStream {
        async fn connect(&self) -> Result<(), LinkError> {
            Ok(())
        }

        async fn send(&self, _frame: String) -> Result<(), LinkError> {
            Ok(())
        }

        async fn next_event(&self) -> Option<StreamEvent> {
            std::future::pending().await
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct RecordingBatch {
        posts: Mutex<Vec<BatchEndpoint>>,
    }

    #[async_trait]
    impl BatchTransport for RecordingBatch {
        async fn post(&self, endpoint: BatchEndpoint, _body: String) -> Result<(), LinkError> {
            self.posts.lock().unwrap().push(endpoint);
            Ok(())
        }
    }

    fn spawn_runtime() -> (RuntimeHandle, Arc<RecordingBatch>) {
        let ctx = TokioContext::shared();
        let engine = FlightEngine::new(EngineConfig::default());
        let stream = StreamLink::new(
            Arc::new(NullStream),
            StreamConfig::default(),
            DroneId::default(),
            SessionId::from_seed(1),
        );
        let batch_transport = Arc::new(RecordingBatch::default());
        let batch = BatchLink::new(
            batch_transport.clone(),
            BatchConfig::default(),
            DroneId::default(),
        );
        (
            DroneRuntime::spawn(ctx, engine, stream, batch),
            batch_transport,
        )
    }

    #[test]
    fn test_streaming_method_parsing() {
        assert_eq!("persistent".parse(), Ok(StreamingMethod::Persistent));
        assert_eq!("websocket".parse(), Ok(StreamingMethod::Persistent));
        assert_eq!("http".parse(), Ok(StreamingMethod::Batch));
        assert_eq!("both".parse(), Ok(StreamingMethod::Both));
        assert!("carrier-pigeon".parse::<StreamingMethod>().is_err());
    }

    #[test]
    fn test_streaming_method_channel_selection() {
        assert!(StreamingMethod::Persistent.uses_stream());
        assert!(!StreamingMethod::Persistent.uses_batch());
        assert!(StreamingMethod::Batch.uses_batch());
        assert!(!StreamingMethod::Batch.uses_stream());
        assert!(StreamingMethod::Both.uses_stream() && StreamingMethod::Both.uses_batch());
    }

    #[test]
    fn test_command_conversion() {
        assert_eq!(EngineCommand::from(DroneCommand::Start), EngineCommand::Start);
        assert_eq!(
            EngineCommand::from(DroneCommand::SetTarget {
                target: TargetPoint { x: 1.0, y: 2.0 }
            }),
            EngineCommand::SetTarget { x: 1.0, y: 2.0 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_ticks_and_stops() {
        let (handle, _batch) = spawn_runtime();

        handle.start().await;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let view = handle.view();
        assert!(view.snapshot.active);
        assert!(view.snapshot.x > 50.0);
        assert!(!view.trail.is_empty());
        assert_eq!(handle.connection_state(), ConnectionState::Connected);

        handle.stop().await;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!handle.view().snapshot.active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_method_posts_telemetry() {
        let (handle, batch) = spawn_runtime();

        handle.set_streaming_method(StreamingMethod::Both).await;
        handle.start().await;
        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;

        let posts = batch.posts.lock().unwrap().clone();
        assert!(posts.len() >= 2);
        assert!(posts.iter().all(|e| *e == BatchEndpoint::Telemetry));
    }
}

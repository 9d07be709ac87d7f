//! SkyLink production agent.
//!
//! Wires the flight engine and both telemetry links to a real backend:
//! WebSocket for the low-latency stream, HTTP POST for the batch reports.
//! Runs until ctrl-c.

use anyhow::Result;
use clap::Parser;
use skylink_core::{
    BatchConfig, BatchLink, DroneRuntime, EngineConfig, FlightEngine, HttpTransport, StreamConfig,
    StreamLink, StreamingMethod, WsTransport,
};
use skylink_env::{DroneId, SessionId, TokioContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// SkyLink drone agent
#[derive(Parser, Debug)]
#[command(name = "skylink-agent")]
#[command(about = "Simulated drone with dual-channel telemetry relay", long_about = None)]
struct Args {
    /// Backend WebSocket URL for the persistent stream
    #[arg(long, default_value = "ws://localhost:8080/drone-data")]
    ws_url: String,

    /// Backend REST API base URL for batch reports
    #[arg(long, default_value = "http://localhost:3000/api")]
    api_url: String,

    /// Bearer credential for batch requests
    #[arg(long, default_value = "YOUR_API_TOKEN", env = "SKYLINK_API_TOKEN")]
    token: String,

    /// Drone identity carried on every payload
    #[arg(long, default_value = "DRONE_001")]
    drone_id: String,

    /// Streaming method (persistent, batch, both)
    #[arg(long, default_value = "persistent")]
    method: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let method: StreamingMethod = args
        .method
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let drone_id = DroneId::new(&args.drone_id);

    let ctx = TokioContext::shared();
    let engine = FlightEngine::new(EngineConfig {
        drone_id: drone_id.clone(),
        seed: rand::random(),
        ..EngineConfig::default()
    });

    let stream_config = StreamConfig {
        url: args.ws_url.clone(),
        ..StreamConfig::default()
    };
    let stream = StreamLink::new(
        Arc::new(WsTransport::new(stream_config.url.clone())),
        stream_config,
        drone_id.clone(),
        SessionId::new(),
    );

    let batch_config = BatchConfig {
        base_url: args.api_url.clone(),
        bearer_token: args.token.clone(),
        ..BatchConfig::default()
    };
    let batch = BatchLink::new(
        Arc::new(HttpTransport::new(
            batch_config.base_url.clone(),
            batch_config.bearer_token.clone(),
        )),
        batch_config,
        drone_id.clone(),
    );

    let handle = DroneRuntime::spawn(ctx, engine, stream, batch);
    handle.set_streaming_method(method).await;
    handle.start().await;
    info!(drone = %drone_id, method = method.as_str(), "airborne; ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                let view = handle.view();
                info!(
                    "pos=({:.1}, {:.1}) | alt={:.0}m | speed={:.0}km/h | bat={:.0}% | mode={} | link={}",
                    view.snapshot.x,
                    view.snapshot.y,
                    view.snapshot.altitude,
                    view.snapshot.speed,
                    view.snapshot.battery,
                    view.snapshot.mode.as_str(),
                    handle.connection_label()
                );
            }
        }
    }

    handle.stop().await;
    info!("stopped");
    Ok(())
}

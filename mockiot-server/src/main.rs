// MockIoT Server - HTTP server for synthetic IoT telemetry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # MockIoT Server
//!
//! HTTP front end for the MockIoT generator, with Prometheus metrics and
//! CSV dataset replay.
//!
//! ## Usage
//!
//! ```bash
//! # Generated default fleet, real-time scenarios
//! mockiot-server --port 8080
//!
//! # Custom fleet, scenario pauses ten times faster
//! mockiot-server --fleet fleet.json --speed 10.0
//!
//! # Replay a recorded dataset continuously
//! mockiot-server --replay-csv data.csv --replay-autostart
//! ```

mod api;
mod fleet;
mod metrics;
mod replay;
mod sink;

use api::{router, AppState};
use clap::Parser;
use fleet::fleet_or_default;
use metrics::{record_task_event, TASK_EVENTS_LAGGED_TOTAL};
use mockiot::{
    Generator, InMemoryCatalog, MemorySink, RealTimePacer, RetentionPolicy, TaskEvent,
    TelemetrySink,
};
use replay::{ReplayConfig, ReplayEngine};
use sink::MeteredSink;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// MockIoT telemetry server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// JSON fleet file (generated default fleet when absent)
    #[arg(short, long)]
    fleet: Option<PathBuf>,

    /// Scenario pause speed multiplier (1.0 = real-time)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Finished tasks kept for polling
    #[arg(long, default_value = "1024")]
    max_tasks: usize,

    /// Drop finished tasks after this many seconds
    #[arg(long)]
    task_ttl_secs: Option<u64>,

    /// CSV dataset for replay
    #[arg(long, default_value = "mock_data/mock_iot_storage.csv")]
    replay_csv: PathBuf,

    /// Start continuous replay at boot
    #[arg(long, default_value = "false")]
    replay_autostart: bool,

    /// Telemetry records kept in memory
    #[arg(long, default_value = "100000")]
    buffer: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("MockIoT Server v{}", env!("CARGO_PKG_VERSION"));

    let devices = match fleet_or_default(args.fleet.as_deref()) {
        Ok(devices) => devices,
        Err(e) => {
            error!("Failed to load fleet: {}", e);
            std::process::exit(1);
        }
    };
    let device_count = devices.len();
    let catalog = Arc::new(InMemoryCatalog::with_devices(devices));

    let memory = Arc::new(MemorySink::with_capacity(args.buffer));
    let sink: Arc<dyn TelemetrySink> = Arc::new(MeteredSink::new(memory));

    let mut retention = RetentionPolicy::default().with_max_tasks(args.max_tasks);
    if let Some(ttl) = args.task_ttl_secs {
        retention = retention.with_ttl(Duration::from_secs(ttl));
    }

    let generator = Generator::builder(catalog.clone(), sink.clone())
        .pacer(Arc::new(RealTimePacer::new(args.speed)))
        .retention(retention)
        .build();
    spawn_task_metrics(generator.subscribe());

    // Replay dataset is optional; endpoints report a missing file.
    let replay = Arc::new(ReplayEngine::new(args.replay_csv, catalog, sink));
    match replay.reload().await {
        Ok(rows) => {
            info!("Replay dataset loaded: {} row(s)", rows);
            if args.replay_autostart {
                replay.start(ReplayConfig::default()).await;
            }
        }
        Err(e) => warn!(
            "Replay dataset {} not loaded: {}",
            replay.csv_path().display(),
            e
        ),
    }

    let state = Arc::new(AppState::new(generator, replay.clone(), device_count));
    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    replay.stop().await;
    info!("Server stopped");
}

/// Feed registry events into the task counters until the registry drops.
fn spawn_task_metrics(mut events: Receiver<TaskEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => record_task_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Task metrics missed {} event(s)", missed);
                    TASK_EVENTS_LAGGED_TOTAL.inc_by(missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

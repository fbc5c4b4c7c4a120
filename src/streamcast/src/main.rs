//! StreamCast — live broadcast session lifecycle and in-stream ad-break
//! scheduling service.
//!
//! Main entry point that wires the stores and engines together, spawns the
//! liveness sweep, and starts the server.

use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use streamcast_api::{ApiServer, AppState};
use streamcast_core::clock::{Clock, SystemClock};
use streamcast_core::config::AppConfig;
use streamcast_inventory::AdInventory;
use streamcast_scheduler::{AdBreakEventStore, AdBreakScheduler, InteractionRecorder};
use streamcast_session::{AuthenticationGate, HeartbeatMonitor, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "streamcast")]
#[command(about = "Live broadcast session lifecycle and ad-break scheduling service")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "STREAMCAST__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "STREAMCAST__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Liveness threshold in seconds (overrides config)
    #[arg(long, env = "STREAMCAST__LIVENESS__THRESHOLD_SECS")]
    liveness_threshold: Option<u64>,

    /// Disable the periodic liveness sweep (sessions then only end via the
    /// publish-done callback)
    #[arg(long, default_value_t = false)]
    no_sweep: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamcast=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("StreamCast starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secs) = cli.liveness_threshold {
        config.liveness.threshold_secs = secs;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        liveness_threshold_secs = config.liveness.threshold_secs,
        sweep_interval_secs = config.liveness.sweep_interval_secs,
        "Configuration loaded"
    );

    // Wire the stores and engines
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = Arc::new(SessionStore::new(clock.clone()));
    let inventory = Arc::new(AdInventory::new());
    let events = Arc::new(AdBreakEventStore::new());

    let gate = Arc::new(AuthenticationGate::new(sessions.clone(), clock.clone()));
    let monitor = Arc::new(HeartbeatMonitor::new(
        sessions.clone(),
        clock.clone(),
        config.liveness.threshold_secs,
    ));
    let scheduler = Arc::new(AdBreakScheduler::new(
        sessions.clone(),
        inventory.clone(),
        events.clone(),
        clock.clone(),
        config.liveness.threshold_secs,
    ));
    let recorder = Arc::new(InteractionRecorder::new(
        events,
        inventory.clone(),
        clock.clone(),
        config.billing.cost_per_click,
    ));

    // Spawn the reaper sweep
    if !cli.no_sweep {
        let monitor_for_sweep = monitor.clone();
        let interval_secs = config.liveness.sweep_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                let demoted = monitor_for_sweep.sweep();
                if demoted > 0 {
                    debug!(demoted, "Liveness sweep demoted sessions");
                }
            }
        });
    } else {
        info!("Liveness sweep disabled");
    }

    let state = AppState {
        sessions,
        gate,
        monitor,
        inventory,
        scheduler,
        recorder,
        clock,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };

    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("StreamCast is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}

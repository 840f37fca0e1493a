//! forgewatch - equipment failure scoring and anomaly response
//!
//! # Usage
//!
//! ```bash
//! # HTTP ingress only (POST /api/v1/samples)
//! cargo run --release
//!
//! # JSON sensor messages from stdin, one per line
//! sensor-feed | ./forgewatch --stdin
//!
//! # JSON sensor messages from a TCP telemetry feed
//! ./forgewatch --tcp localhost:5000
//! ```
//!
//! # Environment Variables
//!
//! - `FORGEWATCH_CONFIG`: Path to the plant config TOML
//! - `FORGEWATCH_ADDR`: HTTP bind address (overridden by `--addr`)
//! - `FORGEWATCH_LOG_FORMAT`: `json` for JSON log lines
//! - `FORGEWATCH_CORS_ORIGINS`: Comma-separated allowed origins
//! - `FORGEWATCH_RESET_DB`: Set to "true" to wipe all persistent data on startup
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use forgewatch::api::create_app;
use forgewatch::clock::{SharedClock, SystemClock};
use forgewatch::config::{self, watcher, PlantConfig};
use forgewatch::pipeline::{IngestLoop, SampleIngestor, SampleSource, StdinSource, TcpSource};
use forgewatch::scoring::{CoefficientStore, ScoringScheduler};
use forgewatch::workflow::{notify, SimulatedPlant};
use forgewatch::{AppCore, Stores};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "forgewatch")]
#[command(about = "Equipment failure scoring and anomaly response pipeline")]
#[command(version)]
struct CliArgs {
    /// Read JSON sensor messages from stdin, one per line
    #[arg(long)]
    stdin: bool,

    /// Connect to a TCP telemetry feed sending JSON lines
    /// Example: ./forgewatch --tcp localhost:5000
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "stdin")]
    tcp: Option<String>,

    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long, env = "FORGEWATCH_ADDR")]
    addr: Option<String>,

    /// Keep predictions, recommendations and the action log in memory
    #[arg(long)]
    in_memory: bool,

    /// Reset all persistent data on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via FORGEWATCH_RESET_DB=true environment variable.
    #[arg(long)]
    reset_db: bool,
}

// ============================================================================
// Database Reset
// ============================================================================

/// Check if database reset is requested via CLI flag or environment variable.
fn should_reset_db(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("FORGEWATCH_RESET_DB") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Remove the data directory and all its contents.
fn reset_data_directory(data_path: &Path) -> Result<()> {
    if !data_path.exists() {
        info!(path = %data_path.display(), "Data directory does not exist, nothing to reset");
        return Ok(());
    }

    warn!(path = %data_path.display(), "Reset requested, wiping all persistent data");
    std::fs::remove_dir_all(data_path)
        .with_context(|| format!("Failed to remove data directory {}", data_path.display()))?;
    warn!("Data directory removed; a fresh database will be created on startup");
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    SampleIngest,
    ScoringScheduler,
    CriticalConsumer,
    HighConsumer,
    CoefficientWatcher,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::SampleIngest => write!(f, "SampleIngest"),
            TaskName::ScoringScheduler => write!(f, "ScoringScheduler"),
            TaskName::CriticalConsumer => write!(f, "CriticalConsumer"),
            TaskName::HighConsumer => write!(f, "HighConsumer"),
            TaskName::CoefficientWatcher => write!(f, "CoefficientWatcher"),
        }
    }
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!(error = %e, "[HttpServer] Server error");
                Err(anyhow::anyhow!("HTTP server error: {e}"))
            }
        }
    });
}

/// Spawn the sample ingestion loop for `source`.
fn spawn_ingest<S: SampleSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    source: S,
    ingestor: Arc<SampleIngestor>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        let stats = IngestLoop::new(source, ingestor)
            .run(cancel_token)
            .await
            .context("Sample source failed")?;
        info!(
            accepted = stats.accepted,
            dropped = stats.dropped,
            "[SampleIngest] Source finished, HTTP ingress remains available"
        );
        Ok(TaskName::SampleIngest)
    });
}

/// Spawn the coefficient file watcher when a path and a poll interval are set.
fn spawn_coefficient_watcher(
    task_set: &mut JoinSet<Result<TaskName>>,
    path: PathBuf,
    poll_secs: u64,
    coefficients: Arc<CoefficientStore>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        watcher::run_file_watcher(
            path,
            Duration::from_secs(poll_secs),
            cancel_token,
            move |_| match coefficients.reload() {
                Ok(set) => watcher::WatchEvent::Reloaded(format!(
                    "{} (intercept {:.2})",
                    set.source, set.intercept
                )),
                Err(e) => watcher::WatchEvent::Error(e.to_string()),
            },
        )
        .await;
        Ok(TaskName::CoefficientWatcher)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!(task = %task_name, "Supervisor: task completed normally");
                    }
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "Supervisor: task failed");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Supervisor: task panicked");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {e}"));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks observe cancellation and drain.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!(task = %task_name, "Task stopped");
        }
    }
    Ok(())
}

// ============================================================================
// Pipeline Runner
// ============================================================================

enum Input {
    Http,
    Stdin,
    Tcp(String),
}

async fn run_pipeline(
    plant: &'static PlantConfig,
    input: Input,
    server_addr: &str,
    cancel_token: CancellationToken,
) -> Result<()> {
    let clock: SharedClock = Arc::new(SystemClock);

    let stores = Stores::from_config(plant).context("Failed to open stores")?;
    let simulated = SimulatedPlant::new(Arc::clone(&clock));
    let mut services = simulated.services();
    services.notifier =
        notify::from_config(&plant.notifications).context("Failed to build notifier")?;

    let core = AppCore::build(plant, clock, stores, services);

    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!(addr = %server_addr, "HTTP server listening");

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: HTTP Server
    spawn_http_server(
        &mut task_set,
        listener,
        create_app(core.api_state()),
        cancel_token.clone(),
    );

    // Task 2: Sample ingestion
    match input {
        Input::Http => info!("Input: HTTP ingress only"),
        Input::Stdin => {
            info!("Input: stdin (JSON sensor messages)");
            spawn_ingest(
                &mut task_set,
                StdinSource::new(),
                Arc::clone(&core.ingestor),
                cancel_token.clone(),
            );
        }
        Input::Tcp(addr) => {
            info!(addr = %addr, "Input: TCP telemetry feed");
            let source = TcpSource::connect(&addr)
                .await
                .with_context(|| format!("Failed to connect to {addr}"))?;
            spawn_ingest(
                &mut task_set,
                source,
                Arc::clone(&core.ingestor),
                cancel_token.clone(),
            );
        }
    }

    // Task 3: Scoring scheduler
    let scheduler = ScoringScheduler::new(
        Arc::clone(&core.engine),
        plant.scoring.initial_delay(),
        plant.scoring.interval(),
    );
    let sched_cancel = cancel_token.clone();
    task_set.spawn(async move {
        let cycles = scheduler.run(sched_cancel).await;
        info!(cycles, "[ScoringScheduler] Stopped");
        Ok(TaskName::ScoringScheduler)
    });

    // Tasks 4-5: Anomaly consumers
    let critical = core.critical_consumer();
    let critical_cancel = cancel_token.clone();
    task_set.spawn(async move {
        critical.run(critical_cancel).await;
        Ok(TaskName::CriticalConsumer)
    });
    let high = core.high_consumer();
    let high_cancel = cancel_token.clone();
    task_set.spawn(async move {
        high.run(high_cancel).await;
        Ok(TaskName::HighConsumer)
    });

    // Task 6: Coefficient watcher
    if let Some(path) = plant.coefficients.path.clone() {
        if plant.coefficients.poll_secs > 0 {
            spawn_coefficient_watcher(
                &mut task_set,
                path,
                plant.coefficients.poll_secs,
                Arc::clone(core.engine.coefficients()),
                cancel_token.clone(),
            );
        }
    }

    run_supervisor(&mut task_set, cancel_token).await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("FORGEWATCH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = CliArgs::parse();

    let mut plant = PlantConfig::load();
    if let Some(addr) = args.addr {
        plant.server.addr = addr;
    }
    if args.in_memory {
        plant.storage.in_memory = true;
    }

    // Reset DB check - BEFORE any storage initialization
    if should_reset_db(args.reset_db) && !plant.storage.in_memory {
        reset_data_directory(&plant.storage.data_dir)?;
    }

    config::init(plant);
    let plant = config::get();
    info!(
        plant = %plant.plant.name,
        site = %plant.plant.site,
        model = %plant.scoring.model_id,
        "forgewatch starting"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let input = match (args.tcp, args.stdin) {
        (Some(addr), _) => Input::Tcp(addr),
        (None, true) => Input::Stdin,
        (None, false) => Input::Http,
    };
    run_pipeline(plant, input, &plant.server.addr, cancel_token).await?;

    info!("forgewatch shutdown complete");
    Ok(())
}

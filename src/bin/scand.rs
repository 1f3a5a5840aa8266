//! ArchaeoScan daemon - simulated sensor telemetry over WebSocket
//!
//! This binary runs the sensor simulator and streams one snapshot per tick
//! to every connected dashboard.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! scand serve
//!
//! # Listen elsewhere with a faster cadence
//! scand serve --bind 127.0.0.1:9000 --interval-ms 500
//!
//! # Print the effective configuration
//! scand config
//!
//! # Enable debug logging
//! RUST_LOG=scand=debug scand serve
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scan_core::DeviceId;
use scand::broadcast::BroadcastLoop;
use scand::config::ScandConfig;
use scand::generator::ReadingGenerator;
use scand::monitor::spawn_monitor_task;
use scand::registry::ConnectionRegistry;
use scand::server::{AppState, DaemonServer};

/// ArchaeoScan daemon - simulated underwater sensor telemetry
#[derive(Parser, Debug)]
#[command(name = "scand", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "SCAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon in the foreground
    Serve(ServeArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Milliseconds between snapshots
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Device id reported in every snapshot
    #[arg(long)]
    device_id: Option<String>,

    /// Seed the simulator for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut ScandConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.stream.interval_ms = interval_ms;
        }
        if let Some(device_id) = self.device_id {
            config.simulator.device_id = DeviceId::new(device_id);
        }
        if let Some(seed) = self.seed {
            config.simulator.seed = Some(seed);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config =
        ScandConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Default to 'serve' if no subcommand given
    match args.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(serve) => {
            serve.apply(&mut config);
            config.validate().context("Invalid configuration")?;
            run_daemon(config)
        }
        Command::Config => {
            print!("{}", config.to_toml().context("Failed to render configuration")?);
            Ok(())
        }
    }
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: ScandConfig) -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("scand=info".parse()?)
                .add_directive("scan_core=info".parse()?)
                .add_directive("scan_protocol=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        device = %config.simulator.device_id,
        "ArchaeoScan daemon starting"
    );

    let config = Arc::new(config);

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let generator = ReadingGenerator::from_config(&config.simulator)
        .context("Invalid simulator settings")?;
    let registry = ConnectionRegistry::from_config(&config.stream);

    let broadcaster = BroadcastLoop::new(generator, registry.clone(), config.stream.interval());
    let broadcast_status = broadcaster.status();
    let broadcast = broadcaster.spawn(cancel_token.clone());

    let (monitor_task, metrics) = spawn_monitor_task(&config.monitor, cancel_token.clone());

    let state = AppState::new(
        Arc::clone(&config),
        registry,
        broadcast_status,
        metrics,
        cancel_token.clone(),
    );
    let server = DaemonServer::new(config.bind, state);

    info!(addr = %config.bind, "Starting server");

    let result = server.run().await;
    if let Err(e) = &result {
        error!(error = %e, "Server error");
    }

    // Stop the loop even if the server failed on its own.
    cancel_token.cancel();
    broadcast.join().await;
    if let Err(e) = monitor_task.await {
        error!(error = %e, "Process monitor task failed");
    }

    info!("ArchaeoScan daemon stopped");
    result.map_err(Into::into)
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

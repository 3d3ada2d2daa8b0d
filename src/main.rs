//! Ready Room service binary
//!
//! Loads configuration, wires the lobby and chat components, serves the
//! probe endpoints and runs until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use ready_room::config::{validate_config, AppConfig};
use ready_room::service::{AppState, HealthCheck};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Lobby lifecycle and room chat service for a game lobby platform
///
/// Players take slots, ready up within a cancellable timeout, and lobby
/// updates and chat fan out to every connection subscribed to a lobby's
/// rooms. Chat is kept in per-room scrollback and written to dated log
/// files, with a global log rotating at local midnight.
#[derive(Parser, Debug)]
#[command(name = "ready-room", version)]
struct Args {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Root directory of the per-room chat logs
    #[arg(long, value_name = "DIR")]
    chat_logs_dir: Option<String>,

    /// Keep chat in memory only
    #[arg(long)]
    no_chat_logs: bool,

    /// Port of the probe and metrics server
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    debug: bool,

    /// Validate the configuration, print it and exit
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the tracing subscriber")
}

/// Resolve once either SIGINT or SIGTERM arrives
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Cannot listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

fn log_banner(config: &AppConfig) {
    info!("Ready Room {}", ready_room::VERSION);
    info!("   Service name: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Ready-up: {}s, scrollback: {} messages",
        config.lobby.ready_up_timeout_seconds, config.lobby.scrollback_capacity
    );
    if config.chat.logs_enabled {
        info!(
            "   Chat logs: {} (global log in {})",
            config.chat.logs_dir, config.chat.global_log_dir
        );
    } else {
        info!("   Chat logs: off");
    }
    if config.metrics.enabled {
        info!("   Probes: http://{}/health, /metrics", config.metrics_addr());
    }
}

/// File or environment configuration with command line overrides applied
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(level) = &args.log_level {
        config.service.log_level = level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(dir) = &args.chat_logs_dir {
        config.chat.logs_dir = dir.clone();
    }
    if args.no_chat_logs {
        config.chat.logs_enabled = false;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.port = port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    log_banner(&config);
    if args.dry_run {
        info!("Configuration is valid, not starting (dry run)");
        return Ok(());
    }

    let mut app = match AppState::new(config.clone()).await {
        Ok(app) => app,
        Err(e) => {
            error!("Could not build the lobby service: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = app.start().await {
        error!("Could not start the lobby service: {}", e);
        std::process::exit(1);
    }

    let ctx = app.health_context();
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            match HealthCheck::check(&ctx).await {
                Ok(report) => info!(
                    "Status {}: {} active lobbies, {} games started, {} ready-up timeouts",
                    report.status,
                    report.stats.active_lobbies,
                    report.stats.games_started,
                    report.stats.ready_up_timeouts
                ),
                Err(e) => warn!("Status report failed: {}", e),
            }
        }
    });

    info!("Lobby service running, waiting for SIGINT or SIGTERM");
    shutdown_signal().await;
    heartbeat.abort();

    info!("Shutting down, flushing chat logs");
    match tokio::time::timeout(config.shutdown_timeout(), app.shutdown()).await {
        Ok(Ok(())) => info!("Shutdown complete"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!(
            "Shutdown exceeded {:?}, exiting anyway",
            config.shutdown_timeout()
        ),
    }
    Ok(())
}

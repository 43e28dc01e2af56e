//! Main entry point for the mingle-room service
//!
//! Production entry point that initializes and runs the matching service
//! with logging, configuration overrides and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use mingle_room::config::{validate_config, AppConfig};
use mingle_room::service::{AppState, HealthStatus};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Mingle Room Matching Service - queue, room and presence coordination
#[derive(Parser)]
#[command(
    name = "mingle-room",
    version,
    about = "Matchmaking and room lifecycle service for anonymous group dating",
    long_about = "Mingle Room pairs equal-sized male and female parties off shared Redis wait \
                 lists, runs the timed group-chat and final-choice phases over AMQP fan-out, \
                 and feeds mutual picks back through the bus as couple matches."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// AMQP URL override
    #[arg(long, value_name = "URL", help = "Override AMQP connection URL")]
    amqp_url: Option<String>,

    /// Redis URL override
    #[arg(long, value_name = "URL", help = "Override Redis connection URL")]
    redis_url: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP gateway port")]
    http_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config, assemble in memory, exit)
    #[arg(
        long,
        help = "Validate configuration and wiring without broker or store, then exit"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform a health check against live dependencies and exit
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let mut app_state = AppState::new(config).await?;
    app_state.start().await?;

    let health = app_state.health_check().await?;
    println!("Health Check: {}", health.status);
    println!("  Local connections: {}", health.stats.local_connections);
    println!("  Active rooms: {}", health.stats.active_rooms);
    println!("  Waiting users: {}", health.stats.waiting_users);

    let healthy = health.status == HealthStatus::Healthy;
    app_state.shutdown().await?;
    std::process::exit(if healthy { 0 } else { 1 });
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Mingle Room Matching Service");
    info!("   Service: {}", config.service.name);
    info!("   Process: {}", config.service.process_id);
    info!("   Log level: {}", config.service.log_level);
    info!("   HTTP port: {}", config.service.http_port);
    info!("   AMQP: {}", config.amqp.url);
    info!("   Redis: {}", config.redis.url);
    info!("   Party sizes: {:?}", config.matching.party_sizes);
    info!(
        "   Chat/choice: {}s group, {}s couple, {}s choice",
        config.rooms.group_chat_seconds,
        config.rooms.couple_chat_seconds,
        config.rooms.choice_seconds
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if args.debug {
        config.service.log_level = "debug".to_string();
    }
    if let Some(amqp_url) = &args.amqp_url {
        config.amqp.url = amqp_url.clone();
    }
    if let Some(redis_url) = &args.redis_url {
        config.redis.url = redis_url.clone();
    }
    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        display_startup_banner(&config);
        let mut app_state = AppState::dry_run(config)?;
        app_state.start().await?;
        app_state.shutdown().await?;
        info!("Dry run completed - configuration and wiring are valid");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Mingle Room Matching Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Mingle Room Matching Service stopped");
    Ok(())
}

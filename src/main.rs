//! Telemetry bridge daemon
//!
//! Runs the connection supervisor headless: display states and audit lines
//! go to the structured log, and the optional health server exposes the
//! last known state over HTTP.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use telemetry_bridge::config::BridgeConfig;
use telemetry_bridge::observability::logging::{init_logging, LogFormat};
use telemetry_bridge::observability::{init_default_logging, HealthServer};
use telemetry_bridge::sink::{FanoutSink, SnapshotSink, TracingSink};
use telemetry_bridge::supervisor::{report_configuration_error, Supervisor};
use telemetry_bridge::transport::mqtt::MqttConnector;
use tokio::signal;
use tracing::{error, info, warn, Level};

const DEFAULT_CONFIG_PATHS: &[&str] = &["bridge.toml", "config/bridge.toml"];

/// Resilient MQTT telemetry bridge
#[derive(Parser)]
#[command(name = "telemetry-bridge")]
#[command(about = "Turns STATUS:VALUE sensor telemetry into alert display state")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace); ignored when LOG_LEVEL is set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and bridge telemetry until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_observability(cli.verbose);

    info!("Starting telemetry bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn init_observability(verbose: u8) {
    if verbose == 0 || std::env::var("LOG_LEVEL").is_ok() {
        init_default_logging();
        return;
    }

    let level = if verbose == 1 { Level::DEBUG } else { Level::TRACE };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    init_logging(level, LogFormat::parse(&format), false);
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(BridgeConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            for path_str in DEFAULT_CONFIG_PATHS {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(BridgeConfig::load_from_file(&path)?);
                }
            }

            warn!(
                "No configuration file found (tried {:?}), using built-in defaults",
                DEFAULT_CONFIG_PATHS
            );
            Ok(BridgeConfig::default())
        }
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = Arc::new(SnapshotSink::new());
    let sink = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink::new()))
            .with(snapshot.clone()),
    );

    let connector = match MqttConnector::new(&config) {
        Ok(connector) => connector,
        Err(e) => {
            report_configuration_error(&*sink, &e);
            return Err(e.into());
        }
    };
    info!(
        broker = %connector.address(),
        topic = %config.broker.topic,
        "Bridge configured"
    );

    let health = config.health.clone();
    let supervisor = Supervisor::new(config, connector, sink.clone()).spawn();

    // Start health server
    if let Some(health) = health {
        let server = Arc::new(HealthServer::new(health.port, snapshot.clone()));
        let shutdown = supervisor.shutdown_signal();
        tokio::spawn(async move {
            if let Err(e) = server.start(shutdown).await {
                error!("Health server error: {}", e);
            }
        });
    }

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Bridge is running; press Ctrl-C to stop");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    supervisor.shutdown().await?;
    info!(
        connection = %snapshot.connection_state(),
        "Supervisor stopped"
    );
    Ok(())
}

fn handle_config_command(
    config: &BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_and_config() {
        let cli = Cli::try_parse_from(["telemetry-bridge", "-c", "bridge.toml", "run"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("bridge.toml")));
        assert!(matches!(cli.command, Commands::Run));

        let cli = Cli::try_parse_from(["telemetry-bridge", "-vv", "config", "--show"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["telemetry-bridge"]).is_err());
    }

    #[test]
    fn test_default_config_passes_config_command() {
        assert!(handle_config_command(&BridgeConfig::default(), false).is_ok());
    }
}

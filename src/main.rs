//! edgelink node runner
//!
//! Loads a bootstrap configuration, attaches the rumqttc transport and
//! drives the device link from a plain tick loop until interrupted.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edgelink::config::DeviceConfig;
use edgelink::link::DeviceLink;
use edgelink::transport::RumqttTransport;

/// MQTT connection supervisor for edge devices
#[derive(Parser)]
#[command(name = "edgelink")]
#[command(about = "MQTT connection supervisor for edge devices")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device link until interrupted
    Run {
        /// Tick interval in milliseconds
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,
    },
    /// Validate configuration and show the derived topic namespace
    Config {
        /// Print the configuration snapshot
        #[arg(long)]
        show: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("edgelink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {err}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { tick_ms } => run(config, tick_ms),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(err) = result {
        error!("command failed: {err}");
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            Ok(DeviceConfig::load_from_file(path)?)
        }
        None => {
            for candidate in ["edgelink.toml", "config/edgelink.toml"] {
                let path = PathBuf::from(candidate);
                if path.exists() {
                    info!("loading configuration from {}", path.display());
                    return Ok(DeviceConfig::load_from_file(&path)?);
                }
            }
            error!("no configuration file found; provide one with -c/--config or create edgelink.toml");
            process::exit(1);
        }
    }
}

fn run(config: DeviceConfig, tick_ms: u64) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let mut link = DeviceLink::with_config(RumqttTransport::new(), config);
    link.on_config(|payload| info!(%payload, "config message"));
    link.on_command(|payload| info!(%payload, "command message"));
    link.on_connected(|| info!("link up"));
    link.on_disconnected(|| info!("link down"));

    info!("device link running");
    while !shutdown.load(Ordering::Relaxed) {
        link.tick();
        thread::sleep(Duration::from_millis(tick_ms));
    }

    info!("shutting down");
    link.disconnect();
    Ok(())
}

fn handle_config_command(
    config: &DeviceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", serde_json::to_string_pretty(&config.snapshot())?);
    }
    info!("configuration valid");
    Ok(())
}

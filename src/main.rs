//! alidns-sync - keeps Alibaba Cloud DNS records pointed at this host

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use alidns_sync::config::{write_sample, ConfigStore, LogFormat};
use alidns_sync::constants::DEFAULT_CONFIG_DIR;
use alidns_sync::daemon::Daemon;
use alidns_sync::health::HealthServer;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

//==============================================================================
// Main
//==============================================================================

#[derive(Debug, Parser)]
#[command(name = "alidns-sync")]
#[command(version = VERSION)]
#[command(about = "Keeps Alibaba Cloud DNS records pointed at this host's public IP")]
struct Args {
    /// Directory holding config.toml
    #[arg(short = 'd', long, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Write a sample config.toml into the config directory (if missing) and exit
    #[arg(long)]
    init: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn init_sample(args: &Args) -> ExitCode {
    init_tracing(args.verbose, LogFormat::Text);
    match write_sample(&args.config_dir) {
        Ok((path, true)) => {
            info!("Sample config written to {}", path.display());
            ExitCode::SUCCESS
        }
        Ok((path, false)) => {
            info!("Config already exists at {}; leaving it untouched", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sample config write failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    if args.init {
        return Ok(init_sample(&args));
    }

    let store = ConfigStore::in_dir(&args.config_dir);
    let config = store.load().context("Config load failed")?;

    init_tracing(args.verbose || config.schedule.verbose, config.schedule.log_format);
    config
        .schedule
        .ensure_enabled()
        .context("Refusing to start")?;
    info!("alidns-sync {}", VERSION);

    let daemon = Daemon::new(store, config.schedule.clone());

    let mut health = if config.schedule.health_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.schedule.health_port));
        Some(
            HealthServer::start(addr, daemon.state())
                .await
                .context("Health server failed")?,
        )
    } else {
        None
    };

    let result = daemon.run().await;

    if let Some(server) = health.as_mut() {
        server.stop().await;
    }
    result?;

    Ok(ExitCode::SUCCESS)
}

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::DriveConfig;

/// Swerve drivetrain runtime
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON drivetrain config; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drive simulated modules instead of the hardware bridge
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            DriveConfig::load(path)
        }
        None => {
            let config = DriveConfig::default();
            config.validate().map(|_| config)
        }
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = swerve_zenoh_runtime::runtime::run(config, args.simulate).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

//! CLI entry point for the NVR daemon
//!
//! Parses command line arguments, loads the configuration and starts the
//! daemon.

use clap::Parser;
use nvr_daemon::{Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// NVR daemon - records camera streams into segmented files
#[derive(Parser, Debug)]
#[command(name = "nvrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (nvr.toml). Defaults apply if it is missing.
    #[arg(short, long, default_value = "nvr.toml")]
    config: PathBuf,

    /// Skip startup checks (capture program availability). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::load_or_default(&args.config) {
        Ok((config, true)) => {
            info!(path = %args.config.display(), "configuration loaded");
            config
        }
        Ok((config, false)) => {
            warn!(path = %args.config.display(), "configuration file not found, using defaults");
            config
        }
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let daemon_result = if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config).await
    } else {
        Daemon::new(config).await
    };

    match daemon_result {
        Ok(daemon) => {
            info!(
                listen_addr = %daemon.config.server.listen_addr,
                autostart = daemon.config.service.autostart,
                "daemon initialized"
            );
            if let Err(e) = daemon.run().await {
                error!(error = %e, "daemon error");
                return ExitCode::FAILURE;
            }
            info!("daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to initialize daemon");
            ExitCode::FAILURE
        }
    }
}

//! Headless netcube demo.
//!
//! Runs an authority and a predicting client over a simulated lossy link and
//! logs how often the client had to reconcile. Configuration is loaded from
//! `config.ron` and can be overridden via CLI flags:
//!
//! `cargo run -p netcube-demo -- --latency-ms 150 --loss 0.1 --duration 20`

mod simulation;

use clap::Parser;
use netcube_config::{CliArgs, Config, default_config_dir};
use tracing::{error, info};

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    netcube_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("Invalid configuration after CLI overrides: {e}");
        std::process::exit(2);
    }

    info!(config_dir = %config_dir.display(), "netcube demo");
    let report = simulation::run(&config);
    report.log();
}

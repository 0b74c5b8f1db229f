//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// netcube command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "netcube", about = "Client prediction and reconciliation simulator")]
pub struct CliArgs {
    /// Seconds to simulate.
    #[arg(long)]
    pub duration: Option<f32>,

    /// One-way link latency in milliseconds.
    #[arg(long)]
    pub latency_ms: Option<u32>,

    /// Maximum latency jitter in milliseconds.
    #[arg(long)]
    pub jitter_ms: Option<u32>,

    /// Probability of dropping an unreliable datagram (0.0 - 1.0).
    #[arg(long)]
    pub loss: Option<f32>,

    /// Seed for link behaviour and scripted input.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of moves kept in each history buffer.
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(duration) = args.duration {
            self.simulation.duration_secs = duration;
        }
        if let Some(latency) = args.latency_ms {
            self.simulation.latency_ms = latency;
        }
        if let Some(jitter) = args.jitter_ms {
            self.simulation.jitter_ms = jitter;
        }
        if let Some(loss) = args.loss {
            self.simulation.packet_loss = loss;
        }
        if let Some(seed) = args.seed {
            self.simulation.seed = seed;
        }
        if let Some(capacity) = args.history_capacity {
            self.history.capacity = capacity;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

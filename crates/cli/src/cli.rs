//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parcel Sorter - scale, scanner and actuator bus control core
#[derive(Parser, Debug)]
#[command(
    name = "parcel-sorter",
    author,
    version,
    about = "Parcel sorting line control core",
    long_about = "Control core of an automated parcel sorting line.\n\n\
                  Reads weights from the scale link, correlates them with scanner \n\
                  events, decides a chute per parcel and drives the actuator bus."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SORTER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SORTER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sorting pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "configs/line.toml",
        env = "SORTER_CONFIG"
    )]
    pub config: PathBuf,

    /// Replace both serial links with a simulated scale, scanner and bus
    #[arg(long, env = "SORTER_SIMULATE")]
    pub simulate: bool,

    /// Scanner records as JSON lines ("-" = stdin); ignored with --simulate
    #[arg(long, default_value = "-", env = "SORTER_EVENTS")]
    pub events: String,

    /// Maximum number of parcels to route (0 = unlimited)
    #[arg(long, default_value = "0", env = "SORTER_MAX_PARCELS")]
    pub max_parcels: u64,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "SORTER_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size for internal queues
    #[arg(long, default_value = "100", env = "SORTER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "SORTER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Simulated gap between parcels (ms)
    #[arg(long, default_value = "600")]
    pub scan_interval_ms: u64,

    /// Simulated share of unreadable labels
    #[arg(long, default_value = "0.05")]
    pub noread_ratio: f64,

    /// Simulation RNG seed
    #[arg(long, default_value = "7")]
    pub seed: u64,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "configs/line.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/line.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show every chute's car sequence
    #[arg(long)]
    pub chutes: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_simulate() {
        let cli = Cli::try_parse_from([
            "parcel-sorter",
            "-v",
            "run",
            "--simulate",
            "--max-parcels",
            "20",
            "--metrics-port",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.simulate);
                assert_eq!(args.max_parcels, 20);
                assert_eq!(args.metrics_port, 0);
                assert_eq!(args.events, "-");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["parcel-sorter", "-q", "-v", "info"]).is_err());
    }

    #[test]
    fn test_info_flags() {
        let cli =
            Cli::try_parse_from(["parcel-sorter", "info", "-c", "line.json", "--json", "--chutes"])
                .unwrap();
        match cli.command {
            Commands::Info(args) => {
                assert!(args.json && args.chutes);
                assert_eq!(args.config, PathBuf::from("line.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

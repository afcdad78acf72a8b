//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// DAQ Pipeline - continuous multi-channel acquisition with periodic snapshots
#[derive(Parser, Debug)]
#[command(
    name = "daq-pipeline",
    author,
    version,
    about = "Multi-channel acquisition pipeline",
    long_about = "Ingests sequenced multi-channel sample frames, keeps a rolling \n\
                  per-channel history, and periodically dispatches derived snapshots \n\
                  and detected events to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DAQ_PIPELINE_VERBOSE")]
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
        env = "DAQ_PIPELINE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the acquisition pipeline
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
        default_value = "pipeline.toml",
        env = "DAQ_PIPELINE_CONFIG"
    )]
    pub config: PathBuf,

    /// Override acquisition server host from configuration
    #[arg(long, env = "DAQ_SOURCE_HOST")]
    pub host: Option<String>,

    /// Override acquisition server port from configuration
    #[arg(long, env = "DAQ_SOURCE_PORT")]
    pub port: Option<u16>,

    /// Pipeline timeout in seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "DAQ_PIPELINE_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Capacity of the scheduler to dispatcher queue
    #[arg(long, default_value = "64", env = "DAQ_PIPELINE_QUEUE_SIZE")]
    pub queue_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DAQ_PIPELINE_METRICS_PORT")]
    pub metrics_port: u16,

    /// Log live window statistics of every channel at the display refresh rate
    #[arg(long)]
    pub monitor: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "pipeline.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show storage plan details
    #[arg(long)]
    pub storage: bool,

    /// List the engine output channels
    #[arg(long)]
    pub outputs: bool,
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
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["daq-pipeline", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("pipeline.toml"));
                assert_eq!(args.timeout, 0);
                assert!(!args.monitor);
                assert!(args.host.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "daq-pipeline",
            "-vv",
            "run",
            "--config",
            "rig.toml",
            "--host",
            "10.0.0.5",
            "--port",
            "6000",
            "--monitor",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("rig.toml"));
        assert_eq!(args.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(args.port, Some(6000));
        assert!(args.monitor);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["daq-pipeline", "-q", "-v", "validate"]).is_err());
    }
}

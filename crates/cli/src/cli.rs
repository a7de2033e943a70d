//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nbtee - copy a byte stream to many sinks without letting slow ones stall it
#[derive(Parser, Debug)]
#[command(
    name = "nbtee",
    author,
    version,
    about = "Non-blocking tee: broadcast stdin to configured sinks",
    long_about = "Reads standard input and copies every chunk to the sinks named in the \n\
                  configuration. Each sink has its own bounded queue: a sink that falls \n\
                  behind loses data instead of slowing down the input or the other sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "NBTEE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "NBTEE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy stdin to every configured sink
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "nbtee.toml", env = "NBTEE_CONFIG")]
    pub config: PathBuf,

    /// Override the default per-sink queue depth from configuration
    #[arg(long, env = "NBTEE_BUFS_PER_SINK")]
    pub bufs_per_sink: Option<usize>,

    /// Size of each chunk read from stdin, in bytes
    #[arg(long, default_value = "32768", env = "NBTEE_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Validate configuration and exit without reading stdin
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "NBTEE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "nbtee.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
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
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

//! # nbtee CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 将标准输入广播到配置的 sinks
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::{LogTarget, ObservabilityConfig};
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(logging_config(&cli))?;

    info!(version = env!("CARGO_PKG_VERSION"), "nbtee starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Logging setup for the global flags
///
/// Logs go to stderr so that stdout stays free for a stdout sink. `--quiet`
/// pins the level to warn even when RUST_LOG is set.
fn logging_config(cli: &Cli) -> ObservabilityConfig {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    ObservabilityConfig {
        log_format: cli.log_format.clone().into(),
        log_target: LogTarget::Stderr,
        metrics_port: None,
        default_log_level: level.to_string(),
        use_env_filter: !cli.quiet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use observability::LogFormat;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_logging_config_levels() {
        let config = logging_config(&parse(&["nbtee", "validate"]));
        assert_eq!(config.default_log_level, "info");
        assert!(config.use_env_filter);
        assert_eq!(config.log_target, LogTarget::Stderr);

        let config = logging_config(&parse(&["nbtee", "-vv", "validate"]));
        assert_eq!(config.default_log_level, "trace");
    }

    #[test]
    fn test_quiet_ignores_env_filter() {
        let config = logging_config(&parse(&["nbtee", "--quiet", "validate"]));
        assert_eq!(config.default_log_level, "warn");
        assert!(!config.use_env_filter);
    }

    #[test]
    fn test_log_format_flag() {
        let config = logging_config(&parse(&["nbtee", "--log-format", "json", "validate"]));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.metrics_port, None);
    }
}

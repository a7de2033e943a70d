//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }
    if args.chunk_size == 0 {
        return Err(CliError::invalid_argument("chunk-size", "must be greater than 0").into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(bufs_per_sink) = args.bufs_per_sink {
        info!(bufs_per_sink, "Overriding default queue depth from CLI");
        blueprint.tee.bufs_per_sink = bufs_per_sink;
    }

    info!(
        bufs_per_sink = blueprint.tee.bufs_per_sink,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        chunk_size: args.chunk_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    info!("Copying stdin to sinks...");
    let stats = pipeline
        .run(tokio::io::stdin(), shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        chunks = stats.chunks_read,
        bytes = stats.bytes_read,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    let failed = stats.failed_sinks();
    if failed > 0 {
        return Err(CliError::sink_failures(failed, stats.active_sinks).into());
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed, that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::TeeBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Default queue depth: {}", blueprint.tee.bufs_per_sink);

    if blueprint.sinks.is_empty() {
        println!("\nNo sinks configured");
    } else {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!(
                "  - {} ({:?}, depth {})",
                sink.name,
                sink.sink_type,
                config_loader::ConfigLoader::bufs_per_sink(blueprint, sink)
            );
        }
    }

    println!();
}

//! Pipeline orchestrator - reads the input and feeds the writer.

use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::TeeBlueprint;
use nbtee::TeeBuilder;
use observability::SinkDelivery;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Writer and sink configuration
    pub blueprint: TeeBlueprint,

    /// Read buffer size in bytes
    pub chunk_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Copy `input` to every configured sink until end of input or until
    /// `shutdown` completes
    ///
    /// Every sink is flushed, removed and closed before returning; sink
    /// errors are recorded in the returned stats rather than failing the run.
    pub async fn run<R, F>(self, mut input: R, shutdown: F) -> Result<PipelineStats>
    where
        R: AsyncRead + Unpin,
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        if self.config.blueprint.sinks.is_empty() {
            warn!("No sinks configured - input will be discarded");
        }

        let configured = TeeBuilder::new(self.config.blueprint)
            .build()
            .await
            .context("Failed to build writer from configuration")?;

        let mut stats = PipelineStats {
            active_sinks: configured.sinks.len(),
            ..Default::default()
        };
        info!(active_sinks = stats.active_sinks, "Writer started");

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping input");
                    stats.interrupted = true;
                    break;
                }
                read = input.read(&mut buf) => {
                    let n = read.context("Failed to read input")?;
                    if n == 0 {
                        debug!("End of input");
                        break;
                    }
                    configured.tee.write(&buf[..n])?;
                    stats.chunks_read += 1;
                    stats.bytes_read += n as u64;
                    stats.delivery.record_buffer(n);
                }
            }
        }

        // Let every sink catch up so the counters below are final.
        configured.tee.flush().await?;
        for (id, snapshot) in configured.tee.metrics().await? {
            let name = configured
                .sink_name(id)
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string());
            stats.delivery.set_sink(
                name,
                SinkDelivery {
                    writes: snapshot.write_count,
                    bytes: snapshot.bytes_written,
                    dropped: snapshot.dropped_count,
                    error: None,
                },
            );
        }

        info!("Closing sinks...");
        for (name, result) in configured.shutdown().await? {
            if let Err(e) = result {
                stats.delivery.set_sink_error(&name, e.to_string());
            }
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            bytes = stats.bytes_read,
            failed_sinks = stats.failed_sinks(),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

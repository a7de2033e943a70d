//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::DeliveryAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Chunks read from the input and handed to the writer
    pub chunks_read: u64,

    /// Bytes read from the input
    pub bytes_read: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of sinks the writer was built with
    pub active_sinks: usize,

    /// Whether the run ended on a shutdown signal rather than end of input
    pub interrupted: bool,

    /// Per-sink delivery totals
    pub delivery: DeliveryAggregator,
}

impl PipelineStats {
    /// Input throughput in bytes per second
    pub fn bytes_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Number of sinks that finished with an error
    pub fn failed_sinks(&self) -> usize {
        self.delivery.failed_sinks()
    }

    /// Print detailed summary to stderr, keeping stdout for sink output
    pub fn print_summary(&self) {
        eprintln!("\n=== Pipeline Statistics ===\n");
        eprintln!("Duration: {:.2}s", self.duration.as_secs_f64());
        eprintln!("Chunks read: {}", self.chunks_read);
        eprintln!("Bytes read: {}", self.bytes_read);
        eprintln!("Throughput: {:.0} B/s", self.bytes_per_sec());
        eprintln!("Active sinks: {}", self.active_sinks);
        if self.interrupted {
            eprintln!("Stopped by signal before end of input");
        }
        eprintln!("\n{}", self.delivery.summary());
    }
}

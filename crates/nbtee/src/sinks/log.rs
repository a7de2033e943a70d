//! LogSink - logs a summary of each buffer via tracing

use contracts::{ContractError, DataSink};
use tracing::{info, instrument};

/// Sink that logs buffer summaries for debugging
///
/// Holds no resources, so it asks not to be closed.
pub struct LogSink {
    name: String,
    buffers: u64,
    bytes: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffers: 0,
            bytes: 0,
        }
    }

    fn log_buffer_summary(&self, buf: &[u8]) {
        let preview_len = buf.len().min(16);
        info!(
            sink = %self.name,
            seq = self.buffers,
            len = buf.len(),
            total_bytes = self.bytes,
            preview = %String::from_utf8_lossy(&buf[..preview_len]),
            "Buffer received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, buf),
        fields(sink = %self.name, len = buf.len())
    )]
    async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
        self.buffers += 1;
        self.bytes += buf.len() as u64;
        self.log_buffer_summary(buf);
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }

    fn closeable(&self) -> bool {
        false
    }
}

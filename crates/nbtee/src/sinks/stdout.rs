//! StdoutSink - copies the stream to the process's standard output

use contracts::{ContractError, DataSink};
use tokio::io::{AsyncWriteExt, Stdout};

/// Sink that writes every buffer to stdout
///
/// Standard output belongs to the process, so this sink is never closed.
pub struct StdoutSink {
    name: String,
    stdout: Stdout,
}

impl StdoutSink {
    /// Create a new StdoutSink
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stdout: tokio::io::stdout(),
        }
    }
}

impl DataSink for StdoutSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
        self.stdout.write_all(buf).await?;
        self.stdout.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    fn closeable(&self) -> bool {
        false
    }
}

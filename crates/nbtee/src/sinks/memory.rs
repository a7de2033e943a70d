//! MemorySink - accumulates everything it receives in memory

use contracts::{ContractError, DataSink};

/// Sink that appends every buffer to an in-memory vector
///
/// Mostly useful for tests and for capturing a stream for later inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    name: String,
    data: Vec<u8>,
    writes: u64,
    close_count: u64,
    closeable: bool,
    fail_after: Option<u64>,
}

impl MemorySink {
    /// Create a new, empty MemorySink
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            closeable: true,
            ..Default::default()
        }
    }

    /// Make every write after the first `writes` successful ones fail
    pub fn fail_after(mut self, writes: u64) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Opt out of being closed when leaving a writer
    pub fn not_closeable(mut self) -> Self {
        self.closeable = false;
        self
    }

    /// Bytes received so far
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Number of successful writes
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// How many times the sink has been closed
    pub fn close_count(&self) -> u64 {
        self.close_count
    }

    /// Take the received bytes, leaving the sink empty
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl DataSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
        if self.fail_after.is_some_and(|limit| self.writes >= limit) {
            return Err(ContractError::sink_write(&self.name, "write limit reached"));
        }
        self.data.extend_from_slice(buf);
        self.writes += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.close_count += 1;
        Ok(())
    }

    fn closeable(&self) -> bool {
        self.closeable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_accumulates() {
        let mut sink = MemorySink::new("mem");
        sink.write(&[1, 2]).await.unwrap();
        sink.write(&[3]).await.unwrap();

        assert_eq!(sink.contents(), &[1, 2, 3]);
        assert_eq!(sink.writes(), 2);
        assert_eq!(sink.take(), vec![1, 2, 3]);
        assert!(sink.contents().is_empty());
    }

    #[tokio::test]
    async fn test_memory_sink_fail_after() {
        let mut sink = MemorySink::new("mem").fail_after(1);
        sink.write(&[1]).await.unwrap();
        let err = sink.write(&[2]).await.unwrap_err();

        assert!(matches!(err, ContractError::SinkWrite { .. }));
        assert_eq!(sink.contents(), &[1]);
    }

    #[tokio::test]
    async fn test_memory_sink_close_flag() {
        let mut sink = MemorySink::new("mem");
        assert!(sink.closeable());
        sink.close().await.unwrap();
        assert_eq!(sink.close_count(), 1);

        assert!(!MemorySink::new("mem").not_closeable().closeable());
    }
}

//! DataSink trait - broadcast writer output interface
//!
//! Defines the abstract interface for byte sinks.

use crate::ContractError;

/// Byte output trait
///
/// All sink implementations must implement this trait. A sink is owned by
/// the caller; the broadcast writer only borrows it through a shared handle
/// and is the sole user of it for I/O until it is closed.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one buffer in full
    ///
    /// # Errors
    /// Returns write error (should include context). A failed write is
    /// terminal for the sink that produced it.
    async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError>;

    /// Close sink
    ///
    /// Only called when [`closeable`](LocalDataSink::closeable) returns true,
    /// and at most once per registration.
    async fn close(&mut self) -> Result<(), ContractError>;

    /// Whether this sink wants to be closed when it leaves the writer
    fn closeable(&self) -> bool {
        true
    }
}

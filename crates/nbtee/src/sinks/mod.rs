//! Sink implementations
//!
//! Contains MemorySink, LogSink, FileSink, StdoutSink and TcpSink.

mod file;
mod log;
mod memory;
mod stdout;
mod tcp;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::memory::MemorySink;
pub use self::stdout::StdoutSink;
pub use self::tcp::{TcpSink, TcpSinkConfig};

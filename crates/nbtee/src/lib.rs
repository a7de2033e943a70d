//! # nbtee
//!
//! Non-blocking broadcast writer.
//!
//! Responsibilities:
//! - Copy every buffer written to it to a dynamic set of sinks
//! - Give each sink its own bounded queue and worker task
//! - Drop data for a sink that cannot keep up, never stall the producer
//! - Close and detach a sink whose write fails without affecting the others
//! - Build a writer and its sinks from a `TeeBlueprint`

mod builder;
mod error;
mod frame;
mod handle;
mod metrics;
pub mod sinks;
mod target;
mod tee;

pub use builder::{ConfiguredSink, ConfiguredTee, TeeBuilder};
pub use contracts::{ContractError, DataSink, SinkConfig, SinkType, TeeBlueprint, TeeConfig};
pub use error::TeeError;
pub use handle::{DrainHandle, SinkStatus};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink, MemorySink, StdoutSink, TcpSink, TcpSinkConfig};
pub use target::{shared, SharedSink, TargetId};
pub use tee::Tee;

//! Messages exchanged between producers, the coordinator and sink workers

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::handle::{DrainHandle, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::target::TargetId;

/// One entry of a sink queue
///
/// Control frames share the data queue so that FIFO order alone places a
/// flush boundary after every buffer accepted before it.
#[derive(Debug)]
pub(crate) enum Frame {
    /// Buffer to write to the target
    Data(Bytes),
    /// Data was dropped here; the worker skips whatever is already queued
    Gap,
    /// Acknowledge once everything queued before this frame is consumed
    Flush(oneshot::Sender<()>),
}

/// Commands consumed by the coordinator, in submission order
pub(crate) enum Command {
    Add(SinkHandle),
    Remove {
        id: TargetId,
        reply: oneshot::Sender<Option<DrainHandle>>,
    },
    Write(Bytes),
    Flush(oneshot::Sender<()>),
    Len(oneshot::Sender<usize>),
    Metrics(oneshot::Sender<Vec<(TargetId, MetricsSnapshot)>>),
    Shutdown,
}

impl Command {
    /// Command name for logging
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Command::Add(_) => "add",
            Command::Remove { .. } => "remove",
            Command::Write(_) => "write",
            Command::Flush(_) => "flush",
            Command::Len(_) => "len",
            Command::Metrics(_) => "metrics",
            Command::Shutdown => "shutdown",
        }
    }
}

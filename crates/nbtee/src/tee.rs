//! Tee - public entry points and the coordinator loop
//!
//! Every operation becomes a [`Command`] on one queue, consumed by a single
//! coordinator task that owns the registry. That task is the only place the
//! set of sinks is read or changed, which gives all callers one global order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use contracts::{DataSink, TeeConfig};

use crate::error::TeeError;
use crate::frame::Command;
use crate::handle::{DrainHandle, Offer, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::target::{SharedSink, TargetId};

/// Non-blocking broadcast writer
///
/// Copies every buffer handed to [`write`](Tee::write) to each registered
/// sink. A sink that cannot keep up misses data instead of slowing down the
/// producer or the other sinks; a sink whose write fails is closed and stops
/// receiving data.
///
/// `Tee` is a cheap handle: clone it to share the writer between tasks.
///
/// # Example
///
/// ```no_run
/// use nbtee::{shared, MemorySink, Tee, TeeConfig};
///
/// # async fn example() -> Result<(), nbtee::TeeError> {
/// let tee = Tee::start(TeeConfig::with_bufs_per_sink(5));
/// let buf = shared(MemorySink::new("buf"));
/// tee.add(buf.clone())?;
/// tee.write(b"hello")?;
///
/// let handle = tee.remove(&buf).await?;
/// if let Err(e) = handle.close().await {
///     eprintln!("error writing to buf: {e}");
/// }
/// tee.close().await
/// # }
/// ```
///
/// Or, removing and closing in one step:
///
/// ```no_run
/// use nbtee::{shared, MemorySink, Tee, TeeConfig};
///
/// # async fn example() -> Result<(), nbtee::TeeError> {
/// let tee = Tee::start(TeeConfig::with_bufs_per_sink(5));
/// let buf = shared(MemorySink::new("buf"));
/// tee.add(buf.clone())?;
/// tee.write(b"hello")?;
/// if let Err(e) = tee.remove_and_close(&buf).await {
///     eprintln!("error writing to buf: {e}");
/// }
/// tee.close().await
/// # }
/// ```
#[derive(Clone)]
pub struct Tee {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shutdown: watch::Receiver<bool>,
    bufs_per_sink: Arc<AtomicUsize>,
}

impl Tee {
    /// Start the coordinator task and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: TeeConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown) = watch::channel(false);

        let coordinator = Coordinator {
            registry: HashMap::new(),
            cmd_rx,
            shutdown: shutdown_tx,
        };
        tokio::spawn(coordinator.run());

        info!(bufs_per_sink = config.bufs_per_sink, "Broadcast writer started");

        Self {
            cmd_tx,
            shutdown,
            bufs_per_sink: Arc::new(AtomicUsize::new(config.bufs_per_sink)),
        }
    }

    /// Queue depth given to sinks added from now on
    pub fn bufs_per_sink(&self) -> usize {
        self.bufs_per_sink.load(Ordering::Relaxed)
    }

    /// Change the queue depth for subsequently added sinks
    ///
    /// Sinks that are already registered keep the depth they were created with.
    pub fn set_bufs_per_sink(&self, bufs_per_sink: usize) {
        self.bufs_per_sink.store(bufs_per_sink, Ordering::Relaxed);
    }

    fn submit(&self, cmd: Command) -> Result<(), TeeError> {
        self.cmd_tx.send(cmd).map_err(|_| TeeError::Closed)
    }

    /// Add a sink. It gets a copy of everything written from now on.
    ///
    /// If its write fails, it is closed (when closeable) and stops receiving
    /// data. Adding a sink that is already registered does nothing.
    pub fn add<S: DataSink + Send + 'static>(&self, target: SharedSink<S>) -> Result<(), TeeError> {
        self.add_with_depth(target, self.bufs_per_sink())
    }

    /// Add a sink with its own queue depth, leaving the writer default alone
    pub(crate) fn add_with_depth<S: DataSink + Send + 'static>(
        &self,
        target: SharedSink<S>,
        depth: usize,
    ) -> Result<(), TeeError> {
        let handle = SinkHandle::spawn(target, depth);
        self.submit(Command::Add(handle))
    }

    /// Copy `buf` and offer it to every sink
    ///
    /// Returns as soon as the copy is queued. Success means the buffer was
    /// admitted to the writer, not that any sink received it.
    pub fn write(&self, buf: &[u8]) -> Result<usize, TeeError> {
        self.submit(Command::Write(Bytes::copy_from_slice(buf)))?;
        Ok(buf.len())
    }

    /// Remove a sink without waiting for it to drain
    ///
    /// The returned handle's [`close`](DrainHandle::close) waits for buffered
    /// data to be written, closes the target when closeable, and reports any
    /// error the sink hit.
    ///
    /// # Errors
    /// [`TeeError::NotFound`] if the sink was never added or already removed.
    #[instrument(name = "tee_remove", skip(self, target), fields(target_id = %TargetId::of(target)))]
    pub async fn remove<S>(&self, target: &SharedSink<S>) -> Result<DrainHandle, TeeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Remove {
            id: TargetId::of(target),
            reply,
        })?;
        rx.await
            .map_err(|_| TeeError::Closed)?
            .ok_or(TeeError::NotFound)
    }

    /// Remove a sink, wait for it to drain, and close it
    ///
    /// Returns the first error encountered writing to or closing the sink.
    #[instrument(name = "tee_remove_and_close", skip(self, target), fields(target_id = %TargetId::of(target)))]
    pub async fn remove_and_close<S>(&self, target: &SharedSink<S>) -> Result<(), TeeError> {
        let handle = self.remove(target).await?;
        handle.close().await?;
        Ok(())
    }

    /// Wait until every current sink has consumed or discarded all data
    /// written before this call
    ///
    /// Other tasks may keep writing while this waits.
    #[instrument(name = "tee_flush", skip(self))]
    pub async fn flush(&self) -> Result<(), TeeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Flush(reply))?;
        rx.await.map_err(|_| TeeError::Closed)
    }

    /// Number of registered sinks
    pub async fn len(&self) -> Result<usize, TeeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Len(reply))?;
        rx.await.map_err(|_| TeeError::Closed)
    }

    /// Whether no sink is registered
    pub async fn is_empty(&self) -> Result<bool, TeeError> {
        Ok(self.len().await? == 0)
    }

    /// Metrics of every registered sink
    pub async fn metrics(&self) -> Result<Vec<(TargetId, MetricsSnapshot)>, TeeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Metrics(reply))?;
        rx.await.map_err(|_| TeeError::Closed)
    }

    /// Stop the writer
    ///
    /// Commands already submitted are applied, then every remaining sink's
    /// queue is closed. Does not wait for sinks to drain and does not close
    /// them; use [`remove_and_close`](Tee::remove_and_close) or the handle from
    /// [`remove`](Tee::remove) for that. Calling it again is a no-op.
    ///
    /// Sink failures are never reported here.
    #[instrument(name = "tee_close", skip(self))]
    pub async fn close(&self) -> Result<(), TeeError> {
        // Fails only if shutdown already happened.
        let _ = self.cmd_tx.send(Command::Shutdown);

        let mut shutdown = self.shutdown.clone();
        shutdown
            .wait_for(|done| *done)
            .await
            .map_err(|_| TeeError::CoordinatorLost)?;
        Ok(())
    }
}

impl std::fmt::Debug for Tee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tee")
            .field("bufs_per_sink", &self.bufs_per_sink())
            .field("closed", &*self.shutdown.borrow())
            .finish()
    }
}

/// Single owner of the sink registry
struct Coordinator {
    registry: HashMap<TargetId, SinkHandle>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Sender<bool>,
}

impl Coordinator {
    /// Run the coordinator main loop
    ///
    /// Returns after a shutdown command or once every `Tee` handle is dropped.
    #[instrument(name = "tee_coordinator", skip(self))]
    async fn run(mut self) {
        debug!("Coordinator started");
        let mut write_count: u64 = 0;

        while let Some(cmd) = self.cmd_rx.recv().await {
            debug!(command = cmd.kind(), sinks = self.registry.len(), "Command");
            match cmd {
                Command::Add(handle) => self.add(handle),
                Command::Remove { id, reply } => self.remove(id, reply),
                Command::Write(buf) => {
                    write_count += 1;
                    if self.broadcast(buf) {
                        // Give workers a turn before a queue is down to its
                        // gap slot.
                        tokio::task::yield_now().await;
                    }
                    if write_count.is_multiple_of(1000) {
                        debug!(writes = write_count, "Coordinator progress");
                    }
                }
                Command::Flush(reply) => self.flush(reply).await,
                Command::Len(reply) => {
                    let _ = reply.send(self.registry.len());
                }
                Command::Metrics(reply) => {
                    let snapshots = self
                        .registry
                        .values()
                        .map(|h| (h.id(), h.metrics().snapshot()))
                        .collect();
                    let _ = reply.send(snapshots);
                }
                Command::Shutdown => break,
            }
        }

        // Later commands are dropped; their reply channels close, and any
        // sink they carried sees its queue closed.
        self.cmd_rx.close();

        let remaining = self.registry.len();
        for (_, handle) in self.registry.drain() {
            drop(handle.detach());
        }
        observability::record_sink_count(0);

        info!(writes = write_count, sinks = remaining, "Broadcast writer closed");
        self.shutdown.send_replace(true);
    }

    fn add(&mut self, handle: SinkHandle) {
        if self.registry.contains_key(&handle.id()) {
            // Already writing to this target: close the new queue before its
            // worker sees any data and forget it.
            debug!(sink = %handle.name(), target_id = %handle.id(), "Target already added");
            drop(handle.detach());
            return;
        }
        info!(sink = %handle.name(), target_id = %handle.id(), "Sink added");
        self.registry.insert(handle.id(), handle);
        observability::record_sink_count(self.registry.len());
    }

    fn remove(&mut self, id: TargetId, reply: oneshot::Sender<Option<DrainHandle>>) {
        let removed = self.registry.remove(&id).map(|handle| {
            info!(sink = %handle.name(), target_id = %id, "Sink removed");
            handle.detach()
        });
        if removed.is_none() {
            warn!(target_id = %id, "Remove of unknown target");
        }
        observability::record_sink_count(self.registry.len());
        let _ = reply.send(removed);
    }

    /// Offer `buf` to every sink; returns whether some queue is nearly full
    fn broadcast(&self, buf: Bytes) -> bool {
        observability::record_buffer_accepted(buf.len());
        let mut nearly_full = false;
        for handle in self.registry.values() {
            // A terminal sink stays registered until removed.
            if handle.try_write(buf.clone()) == Offer::Queued {
                nearly_full |= handle.is_nearly_full();
            }
        }
        nearly_full
    }

    /// Queue a flush boundary on every sink, then acknowledge the caller from
    /// a separate task once all of them have been reached
    ///
    /// A full queue never holds up the loop; its boundary is queued later.
    async fn flush(&self, reply: oneshot::Sender<()>) {
        let mut acks = Vec::with_capacity(self.registry.len());
        for handle in self.registry.values() {
            if let Some(ack) = handle.flush().await {
                acks.push(ack);
            }
        }
        tokio::spawn(async move {
            for ack in acks {
                // A dropped ack means the sink went terminal, which also
                // counts as drained.
                let _ = ack.await;
            }
            let _ = reply.send(());
        });
    }
}

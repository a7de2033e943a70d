//! SinkHandle - manages one target with an isolated queue and worker task
//!
//! The handle is the coordinator's registry entry. Its producer-facing entry
//! points never wait on the target: a buffer the queue cannot take right away
//! is dropped for this sink only.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{ContractError, DataSink};

use crate::frame::Frame;
use crate::metrics::SinkMetrics;
use crate::target::{SharedSink, TargetId};

/// Lifecycle of a sink as seen from outside its worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    /// Accepting and delivering data
    Active,
    /// Queue closed and drained without error
    Stopped,
    /// A write failed; the message of the latched error
    Failed(String),
}

impl SinkStatus {
    /// Whether the sink has reached its final state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SinkStatus::Active)
    }
}

/// What happened to a buffer offered to one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Queued for the worker
    Queued,
    /// Dropped for this sink only; a gap marker may have taken its place
    Dropped,
    /// The sink already stopped
    Terminal,
}

type CloseFuture = Pin<Box<dyn Future<Output = Result<(), ContractError>> + Send>>;
type TargetCloser = Box<dyn FnOnce() -> CloseFuture + Send>;

/// What a worker hands back when it exits
struct WorkerExit {
    /// Present unless the worker already closed the target itself
    closer: Option<TargetCloser>,
    /// First write error, if any
    error: Option<ContractError>,
}

/// Registry entry for a running sink worker
pub(crate) struct SinkHandle {
    id: TargetId,
    name: String,
    tx: mpsc::Sender<Frame>,
    status: watch::Receiver<SinkStatus>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<WorkerExit>,
    // Keeps the allocation alive so its address stays a unique key.
    _target: Arc<dyn std::any::Any + Send + Sync>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// A depth of zero is treated as one: the queue always has room for a
    /// single frame.
    pub(crate) fn spawn<S: DataSink + Send + 'static>(target: SharedSink<S>, depth: usize) -> Self {
        let id = TargetId::of(&target);
        let name = match target.try_lock() {
            Ok(sink) => sink.name().to_string(),
            Err(_) => id.to_string(),
        };
        let (tx, rx) = mpsc::channel(depth.max(1));
        let (status_tx, status) = watch::channel(SinkStatus::Active);
        let metrics = Arc::new(SinkMetrics::new());
        metrics.set_queue_depth(tx.max_capacity());

        let worker = tokio::spawn(sink_worker(
            Arc::clone(&target),
            rx,
            status_tx,
            Arc::clone(&metrics),
            name.clone(),
        ));

        Self {
            id,
            name,
            tx,
            status,
            metrics,
            worker,
            _target: target,
        }
    }

    pub(crate) fn id(&self) -> TargetId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    fn is_terminal(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    /// Whether only the slot kept for a gap marker is left
    pub(crate) fn is_nearly_full(&self) -> bool {
        self.tx.max_capacity() > 1 && self.tx.capacity() == 1
    }

    /// Offer a buffer to the sink without waiting
    pub(crate) fn try_write(&self, buf: Bytes) -> Offer {
        if self.is_terminal() {
            return Offer::Terminal;
        }

        if self.is_nearly_full() {
            // Filling the last slot with data could leave no room for a gap
            // marker later, so the marker takes it instead.
            let _ = self.tx.try_send(Frame::Gap);
            self.record_drop();
            return Offer::Dropped;
        }

        match self.tx.try_send(Frame::Data(buf)) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                Offer::Queued
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Depth one with a frame still queued, or the producer
                // outran the drain rate.
                self.record_drop();
                Offer::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(sink = %self.name, "Sink worker already exited");
                Offer::Terminal
            }
        }
    }

    fn record_drop(&self) {
        self.metrics.add_dropped_count(1);
        observability::record_sink_dropped(&self.name, 1);
    }

    /// Queue a flush boundary behind everything already accepted
    ///
    /// Never waits on the queue: when it is full, a background task holds the
    /// next free slot for the boundary. Returns `None` when the sink is
    /// terminal, since a terminal sink is already fully drained.
    pub(crate) async fn flush(&self) -> Option<oneshot::Receiver<()>> {
        if self.is_terminal() {
            return None;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        // Unconstrained so the coop budget cannot turn the first poll into a
        // no-op Pending.
        let mut reserve = Box::pin(tokio::task::unconstrained(self.tx.clone().reserve_owned()));

        // The first poll either takes a free slot or joins the queue's wait
        // list, which is served before any later try_send.
        let first = std::future::poll_fn(|cx| Poll::Ready(reserve.as_mut().poll(cx))).await;
        match first {
            Poll::Ready(Ok(permit)) => {
                permit.send(Frame::Flush(ack_tx));
            }
            Poll::Ready(Err(_)) => return None,
            Poll::Pending => {
                debug!(sink = %self.name, "Queue full, flush boundary deferred");
                tokio::spawn(async move {
                    if let Ok(permit) = reserve.await {
                        permit.send(Frame::Flush(ack_tx));
                    }
                });
            }
        }
        Some(ack_rx)
    }

    /// Close the queue and keep only what is needed to drain and close later
    pub(crate) fn detach(self) -> DrainHandle {
        // Dropping the sender closes the queue; the worker finishes what is
        // already queued and exits.
        drop(self.tx);
        DrainHandle {
            id: self.id,
            name: self.name,
            worker: self.worker,
        }
    }
}

/// Handle to a sink that has left the writer
///
/// Returned by [`Tee::remove`](crate::Tee::remove). The sink keeps draining
/// in the background whether or not this handle is kept.
pub struct DrainHandle {
    id: TargetId,
    name: String,
    worker: JoinHandle<WorkerExit>,
}

impl DrainHandle {
    /// Identity of the removed target
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// Name of the removed target
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for every queued buffer to be written, close the target if it is
    /// closeable, and return the first error encountered writing or closing.
    ///
    /// A write error is preferred over a close error.
    #[instrument(name = "drain_handle_close", skip(self), fields(sink = %self.name))]
    pub async fn close(self) -> Result<(), ContractError> {
        let exit = self.worker.await.map_err(|e| {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
            ContractError::Other(format!("sink '{}' worker panicked: {e}", self.name))
        })?;

        let mut result = match exit.error {
            Some(e) => Err(e),
            None => Ok(()),
        };
        if let Some(closer) = exit.closer {
            let closed = closer().await;
            if result.is_ok() {
                result = closed;
            }
        }
        debug!(sink = %self.name, ok = result.is_ok(), "Sink closed");
        result
    }
}

impl std::fmt::Debug for DrainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("finished", &self.worker.is_finished())
            .finish()
    }
}

async fn close_target<S: DataSink>(target: &SharedSink<S>) -> Result<(), ContractError> {
    let mut sink = target.lock().await;
    if !sink.closeable() {
        return Ok(());
    }
    sink.close().await
}

fn closer_for<S: DataSink + Send + 'static>(target: SharedSink<S>) -> TargetCloser {
    Box::new(move || Box::pin(async move { close_target(&target).await }))
}

/// Fire the terminal signal; later calls keep the first status
fn mark_terminal(status: &watch::Sender<SinkStatus>, terminal: SinkStatus) {
    status.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        *current = terminal;
        true
    });
}

fn ack_all(pending: &mut Vec<oneshot::Sender<()>>) {
    for ack in pending.drain(..) {
        let _ = ack.send(());
    }
}

/// Worker task that consumes frames and writes to the target
#[instrument(
    name = "sink_worker_loop",
    skip(target, rx, status, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink + Send + 'static>(
    target: SharedSink<S>,
    mut rx: mpsc::Receiver<Frame>,
    status: watch::Sender<SinkStatus>,
    metrics: Arc<SinkMetrics>,
    name: String,
) -> WorkerExit {
    debug!(sink = %name, "Sink worker started");
    let mut pending: Vec<oneshot::Sender<()>> = Vec::new();

    while let Some(frame) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match frame {
            Frame::Gap => {
                metrics.inc_gap_count();
                // Catch up past everything the producer already queued, up
                // to the next flush boundary.
                let mut skipped = 0u64;
                while let Ok(next) = rx.try_recv() {
                    match next {
                        Frame::Data(_) => skipped += 1,
                        Frame::Gap => {}
                        Frame::Flush(ack) => {
                            pending.push(ack);
                            break;
                        }
                    }
                }
                if skipped > 0 {
                    metrics.add_dropped_count(skipped);
                    observability::record_sink_dropped(&name, skipped);
                }
                debug!(sink = %name, skipped, "Skipped queued buffers after gap");
                ack_all(&mut pending);
            }
            Frame::Flush(ack) => {
                pending.push(ack);
                ack_all(&mut pending);
            }
            Frame::Data(buf) => {
                let written = target.lock().await.write(&buf).await;
                match written {
                    Ok(()) => {
                        metrics.record_write(buf.len());
                        observability::record_sink_write(&name, buf.len());
                    }
                    Err(e) => {
                        metrics.inc_failure_count();
                        observability::record_sink_failure(&name);
                        error!(sink = %name, error = %e, "Write failed, sink terminated");
                        mark_terminal(&status, SinkStatus::Failed(e.to_string()));

                        if let Err(close_err) = close_target(&target).await {
                            warn!(sink = %name, error = %close_err, "Close after write failure failed");
                        }

                        // Discard the rest without writing; dropping queued
                        // flush acks releases their waiters.
                        rx.close();
                        let mut discarded = 0u64;
                        while rx.recv().await.is_some() {
                            discarded += 1;
                        }
                        drop(pending);
                        debug!(sink = %name, discarded, "Sink worker stopped after failure");
                        return WorkerExit {
                            closer: None,
                            error: Some(e),
                        };
                    }
                }
            }
        }
    }

    mark_terminal(&status, SinkStatus::Stopped);
    ack_all(&mut pending);
    metrics.set_queue_len(0);
    debug!(sink = %name, "Sink worker stopped");

    WorkerExit {
        closer: Some(closer_for(target)),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::shared;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        data: Vec<u8>,
        write_count: Arc<AtomicU64>,
        close_count: Arc<AtomicU64>,
        fail_on_write: Option<u64>,
        delay_ms: u64,
    }

    impl MockSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                data: Vec::new(),
                write_count: Arc::new(AtomicU64::new(0)),
                close_count: Arc::new(AtomicU64::new(0)),
                fail_on_write: None,
                delay_ms: 0,
            }
        }
    }

    impl DataSink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let n = self.write_count.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_write == Some(n) {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.data.extend_from_slice(buf);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn flush_and_wait(handle: &SinkHandle) {
        if let Some(ack) = handle.flush().await {
            let _ = ack.await;
        }
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let target = shared(MockSink::new("test"));
        let handle = SinkHandle::spawn(Arc::clone(&target), 10);
        assert_eq!(handle.name(), "test");

        for i in 0..5u8 {
            assert_eq!(handle.try_write(Bytes::from(vec![i])), Offer::Queued);
        }
        flush_and_wait(&handle).await;

        assert_eq!(target.lock().await.data, vec![0, 1, 2, 3, 4]);
        assert_eq!(handle.metrics().write_count(), 5);
        assert_eq!(handle.metrics().bytes_written(), 5);

        handle.detach().close().await.unwrap();
        assert_eq!(target.lock().await.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_handle_queue_full_drops() {
        let mut sink = MockSink::new("slow");
        sink.delay_ms = 50;
        let target = shared(sink);

        let handle = SinkHandle::spawn(Arc::clone(&target), 2);

        // Producer outruns a slow drain; nothing blocks.
        for i in 0..10u8 {
            assert_ne!(handle.try_write(Bytes::from(vec![i])), Offer::Terminal);
        }
        assert!(handle.metrics().dropped_count() > 0);

        flush_and_wait(&handle).await;
        let delivered = target.lock().await.data.clone();
        assert!(!delivered.is_empty());
        assert!(delivered.len() < 10);
        // Whatever got through arrives in submission order.
        assert!(delivered.windows(2).all(|w| w[0] < w[1]));

        handle.detach().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_handle_failure_latches_and_closes() {
        let mut sink = MockSink::new("failing");
        sink.fail_on_write = Some(2);
        let target = shared(sink);

        let handle = SinkHandle::spawn(Arc::clone(&target), 10);
        handle.try_write(Bytes::from_static(&[1]));
        handle.try_write(Bytes::from_static(&[2]));
        flush_and_wait(&handle).await;

        // Give the worker time to observe the failure
        while !handle.is_terminal() {
            sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(handle.try_write(Bytes::from_static(&[3])), Offer::Terminal);
        assert_eq!(
            *handle.status.borrow(),
            SinkStatus::Failed("sink 'failing' write error: mock failure".into())
        );
        assert_eq!(handle.metrics().failure_count(), 1);

        let err = handle.detach().close().await.unwrap_err();
        assert!(matches!(err, ContractError::SinkWrite { .. }));

        let sink = target.lock().await;
        assert_eq!(sink.data, vec![1]);
        // Closed by the worker on failure, not again by the drain handle.
        assert_eq!(sink.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_on_terminal_sink_returns_immediately() {
        let target = shared(MockSink::new("done"));
        let handle = SinkHandle::spawn(Arc::clone(&target), 4);
        let (status_tx, status) = watch::channel(SinkStatus::Active);
        mark_terminal(&status_tx, SinkStatus::Stopped);
        mark_terminal(&status_tx, SinkStatus::Failed("late".into()));
        assert_eq!(*status.borrow(), SinkStatus::Stopped);

        let handle = SinkHandle { status, ..handle };
        assert!(handle.flush().await.is_none());
        handle.detach().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_gap_skips_to_next_flush() {
        let target = shared(MockSink::new("lagging"));
        let handle = SinkHandle::spawn(Arc::clone(&target), 8);
        assert_eq!(handle.metrics().queue_depth(), 8);

        // Hold the target so the worker cannot get past the first frame.
        let guard = target.lock().await;
        let (ack_tx, ack_rx) = oneshot::channel();
        handle.tx.try_send(Frame::Data(Bytes::from_static(b"a"))).unwrap();
        handle.tx.try_send(Frame::Gap).unwrap();
        handle.tx.try_send(Frame::Data(Bytes::from_static(b"b"))).unwrap();
        handle.tx.try_send(Frame::Flush(ack_tx)).unwrap();
        handle.tx.try_send(Frame::Data(Bytes::from_static(b"c"))).unwrap();
        drop(guard);

        ack_rx.await.unwrap();
        flush_and_wait(&handle).await;

        // "b" was queued behind the gap and skipped; "c" came after the
        // flush boundary and survives.
        assert_eq!(target.lock().await.data, b"ac");
        assert_eq!(handle.metrics().gap_count(), 1);
        assert_eq!(handle.metrics().dropped_count(), 1);
        assert_eq!(handle.metrics().write_count(), 2);

        handle.detach().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_on_full_queue_does_not_wait() {
        let target = shared(MockSink::new("stuck"));
        let handle = SinkHandle::spawn(Arc::clone(&target), 2);

        let guard = target.lock().await;
        handle.tx.try_send(Frame::Data(Bytes::from_static(b"a"))).unwrap();
        handle.tx.try_send(Frame::Data(Bytes::from_static(b"b"))).unwrap();
        // The worker has taken at most one frame and is blocked on the lock.
        while handle.tx.capacity() > 0 {
            assert_eq!(handle.try_write(Bytes::from_static(b"x")), Offer::Dropped);
        }

        let ack = tokio::time::timeout(Duration::from_secs(1), handle.flush())
            .await
            .expect("flush waited on a full queue")
            .expect("sink is not terminal");
        // The boundary is waiting for a slot; data offered meanwhile is not
        // queued ahead of it.
        assert_eq!(handle.try_write(Bytes::from_static(b"z")), Offer::Dropped);

        drop(guard);
        ack.await.unwrap();
        assert!(!target.lock().await.data.contains(&b'z'));

        handle.detach().close().await.unwrap();
    }

    #[tokio::test]
    async fn test_detach_drains_queued_data() {
        let mut sink = MockSink::new("draining");
        sink.delay_ms = 5;
        let target = shared(sink);

        let handle = SinkHandle::spawn(Arc::clone(&target), 8);
        for i in 0..5u8 {
            assert_eq!(handle.try_write(Bytes::from(vec![i])), Offer::Queued);
        }
        handle.detach().close().await.unwrap();

        assert_eq!(target.lock().await.data, vec![0, 1, 2, 3, 4]);
    }
}

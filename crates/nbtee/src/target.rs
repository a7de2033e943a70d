//! Target identity
//!
//! Sinks are registered by the identity of their shared allocation, never by
//! value, so the same target added twice maps to the same registry key.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

/// A caller-owned sink shared with the broadcast writer
pub type SharedSink<S> = Arc<Mutex<S>>;

/// Wrap a sink so it can be registered with a [`Tee`](crate::Tee)
///
/// Keep a clone of the returned handle to remove the sink later or to
/// inspect it once it has been drained.
pub fn shared<S>(sink: S) -> SharedSink<S> {
    Arc::new(Mutex::new(sink))
}

/// Identity of a registered target (address of its shared allocation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    /// Identity of the given shared sink
    pub fn of<S: ?Sized>(target: &Arc<Mutex<S>>) -> Self {
        Self(Arc::as_ptr(target) as *const () as usize)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target@{:#x}", self.0)
    }
}

//! Queue backend capability interface.

use std::fmt;
use std::time::Duration;

/// Error returned when a bounded queue cannot accept an item.
///
/// Carries the rejected item back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the rejected item
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

/// What a backend does when it runs out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Never full; enqueue always succeeds
    Unbounded,
    /// Fixed capacity; enqueue may return [`QueueFull`] per the policy
    Bounded {
        /// Maximum number of queued items
        capacity: usize,
        /// Behaviour on a full queue
        policy: FullPolicy,
    },
}

/// Policy applied by bounded backends when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullPolicy {
    /// Return [`QueueFull`] immediately
    #[default]
    Reject,
    /// Spin/yield until space frees up, giving up after `timeout`
    Block {
        /// Upper bound on the wait
        timeout: Duration,
    },
}

/// A multi-producer multi-consumer queue usable as the logger's backing store.
///
/// All methods take `&self` and may be called from any thread.
pub trait RecordQueue<T: Send>: Send + Sync {
    /// Add an item at the tail.
    ///
    /// Unbounded backends always return `Ok`. Bounded backends return the
    /// item inside [`QueueFull`] when their [`FullPolicy`] gives up.
    fn enqueue(&self, item: T) -> Result<(), QueueFull<T>>;

    /// Remove the item at the head, or `None` when the queue is empty
    fn dequeue(&self) -> Option<T>;

    /// Best-effort emptiness snapshot; may be stale under concurrent use
    fn is_empty(&self) -> bool;

    /// Backpressure contract of this backend
    fn backpressure(&self) -> Backpressure;

    /// Hook for consumers to run deferred maintenance between batches.
    ///
    /// Returns the number of resources released.
    fn collect_garbage(&self) -> usize {
        0
    }
}

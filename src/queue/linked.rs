//! Unbounded lock-free MPMC queue (Michael-Scott), protected by epochs.
//!
//! The list always holds a sentinel node at `head`. Enqueue links a new node
//! after the last node and then swings `tail` (best effort; any thread that
//! sees a lagging tail helps advance it). Dequeue swings `head` to its
//! successor, moves the value out of the successor, which becomes the new
//! sentinel, and retires the old head through the [`EpochManager`].

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crossbeam::utils::{Backoff, CachePadded};

use crate::epoch::EpochManager;
use crate::queue::traits::{Backpressure, QueueFull, RecordQueue};

struct Node<T> {
    /// Initialised for every node linked after the sentinel
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn with_value(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Unbounded lock-free queue.
///
/// Enqueue never fails and never blocks; contention only causes CAS retries.
pub struct LinkedQueue<T: Send> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
    epoch: Arc<EpochManager>,
}

// Safety: values are moved in and out whole; nodes are shared only through
// atomics and freed under epoch protection.
unsafe impl<T: Send> Send for LinkedQueue<T> {}
unsafe impl<T: Send> Sync for LinkedQueue<T> {}

impl<T: Send> LinkedQueue<T> {
    /// Create a queue with its own epoch manager
    pub fn new() -> Self {
        Self::with_epoch(Arc::new(EpochManager::new()))
    }

    /// Create a queue that retires nodes into `epoch`
    pub fn with_epoch(epoch: Arc<EpochManager>) -> Self {
        let sentinel = Node::sentinel();
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            epoch,
        }
    }

    /// Epoch manager protecting this queue
    pub fn epoch(&self) -> &Arc<EpochManager> {
        &self.epoch
    }

    /// Append `value` at the tail
    pub fn push(&self, value: T) {
        let node = Node::with_value(value);
        let _guard = self.epoch.enter();
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: `tail` is never null and cannot be freed while pinned.
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }

            if next.is_null() {
                // SAFETY: as above.
                let linked = unsafe {
                    (*tail)
                        .next
                        .compare_exchange(next, node, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                };
                if linked {
                    // Failure is harmless: a later operation will swing it.
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    return;
                }
                backoff.spin();
            } else {
                // Tail is lagging; help it forward and retry.
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Acquire);
            }
        }
    }

    /// Remove the value at the head
    pub fn pop(&self) -> Option<T> {
        let _guard = self.epoch.enter();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            // SAFETY: `head` is never null and cannot be freed while pinned.
            let next = unsafe { (*head).next.load(Ordering::Acquire) };

            if head != self.head.load(Ordering::Acquire) {
                continue;
            }

            if head == tail {
                if next.is_null() {
                    return None;
                }
                // Tail is lagging behind a linked node.
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Acquire);
                continue;
            }

            if next.is_null() {
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: winning the head CAS grants exclusive ownership of
                // `next`'s value; `next` is now the sentinel and its value
                // slot is treated as uninitialised from here on.
                let value = unsafe { (*(*next).value.get()).assume_init_read() };
                // SAFETY: `head` is unlinked and this thread won the CAS.
                unsafe { self.epoch.retire(head) };
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Best-effort emptiness check
    pub fn is_empty(&self) -> bool {
        let _guard = self.epoch.enter();
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        // SAFETY: `head` cannot be freed while pinned.
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        head == tail && next.is_null()
    }
}

impl<T: Send> Default for LinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> RecordQueue<T> for LinkedQueue<T> {
    fn enqueue(&self, item: T) -> Result<(), QueueFull<T>> {
        self.push(item);
        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        self.pop()
    }

    fn is_empty(&self) -> bool {
        LinkedQueue::is_empty(self)
    }

    fn backpressure(&self) -> Backpressure {
        Backpressure::Unbounded
    }

    fn collect_garbage(&self) -> usize {
        self.epoch.collect()
    }
}

impl<T: Send> Drop for LinkedQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the list directly. The head is a sentinel
        // whose value was already moved out (or never set).
        let mut current = *self.head.get_mut();
        let mut is_sentinel = true;
        while !current.is_null() {
            // SAFETY: every node still linked is owned solely by the queue.
            let mut node = unsafe { Box::from_raw(current) };
            if !is_sentinel {
                // SAFETY: non-sentinel nodes hold an initialised value.
                unsafe { node.value.get_mut().assume_init_drop() };
            }
            current = *node.next.get_mut();
            is_sentinel = false;
        }
    }
}

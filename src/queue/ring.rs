//! Bounded lock-free MPMC ring buffer.
//!
//! Positions grow monotonically and map onto slots modulo the capacity. Each
//! slot carries a sequence stamp telling producers and consumers whether it
//! is free for the current lap; the queue is full when advancing the tail
//! would land on a slot the head has not released yet.
//!
//! Stamps count in half-steps (`2 * position` free, `2 * position + 1`
//! filled) so that a single-slot ring can tell "filled at `p`" apart from
//! "free for `p + 1`".

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam::utils::{Backoff, CachePadded};

use crate::queue::traits::{Backpressure, FullPolicy, QueueFull, RecordQueue};

struct Slot<T> {
    /// `2 * pos` while free for `pos`, `2 * pos + 1` once filled
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

#[inline]
fn free_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2)
}

#[inline]
fn filled_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2).wrapping_add(1)
}

/// Fixed-capacity queue with an explicit full policy.
pub struct RingQueue<T: Send> {
    buffer: Box<[Slot<T>]>,
    capacity: usize,
    policy: FullPolicy,
    /// Next position to dequeue
    head: CachePadded<AtomicUsize>,
    /// Next position to enqueue
    tail: CachePadded<AtomicUsize>,
}

// Safety: a slot's value is only touched by the thread that won the
// corresponding position CAS, and hand-off is ordered by the sequence stamp.
unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T: Send> RingQueue<T> {
    /// Create a ring that rejects items when full
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, FullPolicy::Reject)
    }

    /// Create a ring with the given full policy
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_policy(capacity: usize, policy: FullPolicy) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let buffer = (0..capacity)
            .map(|i| Slot {
                sequence: AtomicUsize::new(free_stamp(i)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer,
            capacity,
            policy,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Maximum number of items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Full policy in effect
    pub fn policy(&self) -> FullPolicy {
        self.policy
    }

    /// Approximate number of queued items
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity)
    }

    /// Best-effort emptiness check
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Enqueue without waiting; returns the item if the ring is full
    pub fn try_push(&self, value: T) -> Result<(), QueueFull<T>> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let slot = &self.buffer[tail % self.capacity];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(free_stamp(tail)) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: this thread owns the slot for position `tail`.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.sequence
                            .store(filled_stamp(tail), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        tail = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                // The slot still holds last lap's item: tail meets head.
                return Err(QueueFull(value));
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue without waiting
    pub fn try_pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let slot = &self.buffer[head % self.capacity];
            let sequence = slot.sequence.load(Ordering::Acquire);
            let diff = sequence.wrapping_sub(filled_stamp(head)) as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the sequence stamp shows the slot is filled
                        // and this thread owns position `head`.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.sequence.store(
                            free_stamp(head.wrapping_add(self.capacity)),
                            Ordering::Release,
                        );
                        return Some(value);
                    }
                    Err(current) => {
                        head = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                return None;
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Enqueue according to the configured [`FullPolicy`]
    pub fn push(&self, value: T) -> Result<(), QueueFull<T>> {
        match self.policy {
            FullPolicy::Reject => self.try_push(value),
            FullPolicy::Block { timeout } => {
                let deadline = Instant::now() + timeout;
                let backoff = Backoff::new();
                let mut value = value;
                loop {
                    match self.try_push(value) {
                        Ok(()) => return Ok(()),
                        Err(QueueFull(rejected)) => {
                            if Instant::now() >= deadline {
                                return Err(QueueFull(rejected));
                            }
                            value = rejected;
                        }
                    }
                    if backoff.is_completed() {
                        thread::yield_now();
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }
}

impl<T: Send> RecordQueue<T> for RingQueue<T> {
    fn enqueue(&self, item: T) -> Result<(), QueueFull<T>> {
        self.push(item)
    }

    fn dequeue(&self) -> Option<T> {
        self.try_pop()
    }

    fn is_empty(&self) -> bool {
        RingQueue::is_empty(self)
    }

    fn backpressure(&self) -> Backpressure {
        Backpressure::Bounded {
            capacity: self.capacity,
            policy: self.policy,
        }
    }
}

impl<T: Send> Drop for RingQueue<T> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}

//! Loom-based model-checked tests for the queue CAS protocols.
//!
//! These tests replicate the link / swing-tail / swing-head steps of
//! `src/queue/linked.rs` and the slot-stamp hand-off of `src/queue/ring.rs`
//! on small fixed arenas built from loom atomics, so Loom can exhaustively
//! explore all interleavings WITHOUT touching production code.
//!
//! Run with:
//! ```bash
//! cargo test --test loom_cas
//! ```

use loom::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

// ---------------------------------------------------------------------------
// Test-local harness: Michael-Scott queue over an index arena.
//
// Node 0 starts as the sentinel. Pointers are arena indices; NIL marks the
// end of the list. Reclamation is out of scope here (see loom_epoch.rs).
// ---------------------------------------------------------------------------

const NIL: usize = usize::MAX;

struct TestNode {
    value: AtomicU64,
    next: AtomicUsize,
}

struct TestQueue {
    nodes: [TestNode; 4],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl TestQueue {
    fn new() -> Self {
        let node = || TestNode {
            value: AtomicU64::new(0),
            next: AtomicUsize::new(NIL),
        };
        Self {
            nodes: [node(), node(), node(), node()],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Enqueue using arena slot `idx` for the new node.
    fn push(&self, idx: usize, value: u64) {
        self.nodes[idx].value.store(value, Ordering::Relaxed);
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let next = self.nodes[tail].next.load(Ordering::Acquire);
            if tail != self.tail.load(Ordering::Acquire) {
                thread::yield_now();
                continue;
            }
            if next == NIL {
                if self.nodes[tail]
                    .next
                    .compare_exchange(NIL, idx, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let _ =
                        self.tail
                            .compare_exchange(tail, idx, Ordering::AcqRel, Ordering::Acquire);
                    return;
                }
            } else {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Acquire);
            }
            thread::yield_now();
        }
    }

    fn pop(&self) -> Option<u64> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let next = self.nodes[head].next.load(Ordering::Acquire);
            if head != self.head.load(Ordering::Acquire) {
                thread::yield_now();
                continue;
            }
            if head == tail {
                if next == NIL {
                    return None;
                }
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Acquire);
            } else if next != NIL
                && self
                    .head
                    .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return Some(self.nodes[next].value.load(Ordering::Relaxed));
            }
            thread::yield_now();
        }
    }

    /// Walk the list from head, skipping the sentinel.
    fn values(&self) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cur = self.nodes[self.head.load(Ordering::Acquire)]
            .next
            .load(Ordering::Acquire);
        while cur != NIL {
            out.push(self.nodes[cur].value.load(Ordering::Relaxed));
            cur = self.nodes[cur].next.load(Ordering::Acquire);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Two producers race to link after the same sentinel.
/// Invariant: both nodes are linked exactly once and tail ends on the last.
#[test]
fn test_loom_concurrent_enqueue() {
    loom::model(|| {
        let queue = Arc::new(TestQueue::new());

        let q1 = Arc::clone(&queue);
        let q2 = Arc::clone(&queue);
        let h1 = thread::spawn(move || q1.push(1, 10));
        let h2 = thread::spawn(move || q2.push(2, 20));
        h1.join().unwrap();
        h2.join().unwrap();

        let mut values = queue.values();
        assert_eq!(values.len(), 2);
        let last = *values.last().unwrap();
        let tail = queue.tail.load(Ordering::Acquire);
        assert_eq!(queue.nodes[tail].value.load(Ordering::Relaxed), last);
        values.sort_unstable();
        assert_eq!(values, vec![10, 20]);
    });
}

/// A consumer races a producer on a queue holding one item.
/// Invariant: the consumer gets the existing item; the new one stays queued.
#[test]
fn test_loom_enqueue_dequeue_race() {
    loom::model(|| {
        let queue = Arc::new(TestQueue::new());
        queue.push(1, 10);

        let q1 = Arc::clone(&queue);
        let q2 = Arc::clone(&queue);
        let producer = thread::spawn(move || q1.push(2, 20));
        let consumer = thread::spawn(move || q2.pop());

        producer.join().unwrap();
        assert_eq!(consumer.join().unwrap(), Some(10));
        assert_eq!(queue.pop(), Some(20));
        assert_eq!(queue.pop(), None);
    });
}

/// Two consumers race on a queue holding one item.
/// Invariant: exactly one of them gets it.
#[test]
fn test_loom_dequeue_race() {
    loom::model(|| {
        let queue = Arc::new(TestQueue::new());
        queue.push(1, 10);

        let q1 = Arc::clone(&queue);
        let q2 = Arc::clone(&queue);
        let c1 = thread::spawn(move || q1.pop());
        let c2 = thread::spawn(move || q2.pop());

        let results = [c1.join().unwrap(), c2.join().unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        assert!(results.contains(&Some(10)));
        assert_eq!(queue.pop(), None);
    });
}

// ---------------------------------------------------------------------------
// Test-local harness: ring slot stamps (capacity 1).
//
// A stamp of `2 * pos` means "free for pos"; `2 * pos + 1` means "filled".
// Producers claim positions by CAS on tail. With a single slot this is the
// case where "filled at 0" must not read as "free for 1".
// ---------------------------------------------------------------------------

/// Two producers race for the single slot of a capacity-1 ring.
/// Invariant: exactly one wins; the loser observes the ring as full.
#[test]
fn test_loom_ring_full_detection() {
    loom::model(|| {
        let stamp = Arc::new(AtomicUsize::new(0));
        let tail = Arc::new(AtomicUsize::new(0));
        let value = Arc::new(AtomicU64::new(0));

        let producer = |stamp: Arc<AtomicUsize>, tail: Arc<AtomicUsize>, value: Arc<AtomicU64>, v: u64| {
            move || -> bool {
                loop {
                    let pos = tail.load(Ordering::Relaxed);
                    let seq = stamp.load(Ordering::Acquire);
                    let diff = seq.wrapping_sub(pos * 2) as isize;
                    if diff == 0 {
                        if tail
                            .compare_exchange(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                            .is_ok()
                        {
                            value.store(v, Ordering::Relaxed);
                            stamp.store(pos * 2 + 1, Ordering::Release);
                            return true;
                        }
                    } else if diff < 0 {
                        return false;
                    }
                    thread::yield_now();
                }
            }
        };

        let h1 = thread::spawn(producer(
            Arc::clone(&stamp),
            Arc::clone(&tail),
            Arc::clone(&value),
            1,
        ));
        let h2 = thread::spawn(producer(
            Arc::clone(&stamp),
            Arc::clone(&tail),
            Arc::clone(&value),
            2,
        ));

        let won = [h1.join().unwrap(), h2.join().unwrap()];
        assert!(won[0] ^ won[1]);
        assert_eq!(stamp.load(Ordering::Acquire), 1);
        let expected = if won[0] { 1 } else { 2 };
        assert_eq!(value.load(Ordering::Relaxed), expected);
    });
}

//! EpochManager - generation-based reclamation for lock-free structures
//!
//! Threads bracket every access to shared nodes with a critical section
//! (`enter` / guard drop). Unlinked nodes are retired onto the calling
//! thread's private list, tagged with the global epoch at retirement, and are
//! only freed once the global epoch has moved [`RECLAIM_LAG`] generations past
//! that tag. The global epoch itself only advances when no active thread is
//! still observing an older generation.

use std::cell::RefCell;
use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::constants::{CACHE_LINE_BYTES, DEFAULT_RETIRE_THRESHOLD, RECLAIM_LAG};

// ============ Per-thread registration ============

/// Global counter for allocating manager IDs (keys into the thread-local map)
static NEXT_MANAGER_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Control blocks owned by the current thread, one per manager entered
    static LOCAL_BLOCKS: RefCell<Vec<LocalBlock>> = const { RefCell::new(Vec::new()) };
}

/// Thread-local handle on a control block.
///
/// Dropped during thread teardown, which detaches the block so that the
/// manager can prune it once its retired list has drained. Entries whose
/// manager has been dropped elsewhere are discarded on the next miss.
struct LocalBlock {
    manager_id: usize,
    manager: Weak<()>,
    tcb: Arc<ThreadControlBlock>,
}

impl LocalBlock {
    fn is_orphaned(&self) -> bool {
        self.manager.strong_count() == 0
    }
}

impl Drop for LocalBlock {
    fn drop(&mut self) {
        self.tcb.detached.store(true, Ordering::Release);
    }
}

// ============ Retired nodes ============

/// A node that has been unlinked but not yet freed.
struct Retired {
    ptr: *mut u8,
    free: unsafe fn(*mut u8),
    epoch: u64,
}

// Safety: retired pointers are only created from `Box<T>` with `T: Send`
unsafe impl Send for Retired {}

impl Retired {
    /// Free the node.
    ///
    /// # Safety
    ///
    /// No thread may still hold a reference obtained inside a critical section
    /// that overlapped the node's retirement.
    unsafe fn free(self) {
        // SAFETY: forwarded from the caller; `free` matches the original type.
        unsafe { (self.free)(self.ptr) }
    }
}

unsafe fn free_boxed<T>(ptr: *mut u8) {
    // SAFETY: `ptr` was produced by `Box::<T>::into_raw` in `retire`.
    drop(unsafe { Box::from_raw(ptr.cast::<T>()) });
}

/// Split `list` into (ready, still pending) using the safe epoch bound.
fn take_ready(list: &mut Vec<Retired>, safe_epoch: u64) -> Vec<Retired> {
    let (ready, pending): (Vec<_>, Vec<_>) =
        list.drain(..).partition(|node| node.epoch <= safe_epoch);
    *list = pending;
    ready
}

// ============ Thread control block ============

/// Per-thread epoch state.
///
/// Created on a thread's first interaction with an [`EpochManager`]. The
/// `active` flag and local epoch are written only by the owning thread; the
/// retired list is also swept by other threads, hence its lock.
#[repr(align(64))]
pub struct ThreadControlBlock {
    /// Whether the owning thread is inside a critical section
    active: AtomicBool,
    /// Global epoch observed when the current critical section began
    local_epoch: AtomicU64,
    /// Nesting depth of critical sections
    nesting: AtomicU32,
    /// Nodes retired by this thread and not yet freed
    retired: Mutex<Vec<Retired>>,
    /// Set once the owning thread has gone away
    detached: AtomicBool,
    /// Set on blocks registered without thread-local storage; cleared when
    /// the owner's critical section ends
    transient: AtomicBool,
}

const _: () = assert!(std::mem::align_of::<ThreadControlBlock>() == CACHE_LINE_BYTES);

impl ThreadControlBlock {
    fn new(transient: bool) -> Self {
        Self {
            active: AtomicBool::new(false),
            local_epoch: AtomicU64::new(0),
            nesting: AtomicU32::new(0),
            retired: Mutex::new(Vec::new()),
            detached: AtomicBool::new(transient),
            transient: AtomicBool::new(transient),
        }
    }

    /// Check if the owning thread is inside a critical section
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Epoch published by the most recent `enter`
    #[inline]
    pub fn local_epoch(&self) -> u64 {
        self.local_epoch.load(Ordering::SeqCst)
    }

    /// Number of retired nodes waiting on this block
    pub fn retired_len(&self) -> usize {
        self.retired.lock().len()
    }

    /// Check if the owning thread has deregistered or exited
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn is_prunable(&self) -> bool {
        self.is_detached()
            && !self.transient.load(Ordering::Acquire)
            && !self.is_active()
            && self.retired.lock().is_empty()
    }
}

// ============ Manager ============

/// Snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpochStats {
    /// Current global epoch
    pub global_epoch: u64,
    /// Number of control blocks in the registry
    pub registered_threads: usize,
    /// Retired nodes not yet freed (thread lists plus orphans)
    pub pending: usize,
    /// Total nodes ever retired
    pub retired_total: u64,
    /// Total nodes freed
    pub reclaimed_total: u64,
}

/// Epoch-based reclamation manager.
///
/// Constructed explicitly and shared by reference (usually `Arc`) with every
/// structure it protects. Each instance keeps its own registry of thread
/// control blocks.
pub struct EpochManager {
    id: usize,
    /// Liveness token; thread-local entries hold a `Weak` to it
    alive: Arc<()>,
    /// Current global epoch
    global_epoch: CachePadded<AtomicU64>,
    /// Every control block handed out by this manager
    registry: RwLock<Vec<Arc<ThreadControlBlock>>>,
    /// Retired nodes whose owning thread could not keep them
    orphans: Mutex<Vec<Retired>>,
    /// List length that triggers an immediate sweep in `retire`
    retire_threshold: usize,
    retired_total: AtomicU64,
    reclaimed_total: AtomicU64,
}

impl EpochManager {
    /// Create a new manager with the default retire threshold
    pub fn new() -> Self {
        Self::with_retire_threshold(DEFAULT_RETIRE_THRESHOLD)
    }

    /// Create a new manager that sweeps after `threshold` retirements
    pub fn with_retire_threshold(threshold: usize) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            alive: Arc::new(()),
            global_epoch: CachePadded::new(AtomicU64::new(0)),
            registry: RwLock::new(Vec::new()),
            orphans: Mutex::new(Vec::new()),
            retire_threshold: threshold.max(1),
            retired_total: AtomicU64::new(0),
            reclaimed_total: AtomicU64::new(0),
        }
    }

    /// Current global epoch
    #[inline]
    pub fn current_epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::SeqCst)
    }

    /// Retire threshold in effect
    pub fn retire_threshold(&self) -> usize {
        self.retire_threshold
    }

    /// Return the calling thread's control block, creating it on first use.
    ///
    /// If thread-local storage is no longer reachable (thread teardown) a
    /// transient, already-detached block is registered instead. It stays in
    /// the registry until the first critical section entered on it ends.
    pub fn register(&self) -> Arc<ThreadControlBlock> {
        match self.local_block() {
            Some(tcb) => tcb,
            None => {
                warn!(
                    manager = self.id,
                    "thread-local storage unavailable, using a transient control block"
                );
                self.new_block(true)
            }
        }
    }

    fn local_block(&self) -> Option<Arc<ThreadControlBlock>> {
        LOCAL_BLOCKS
            .try_with(|blocks| {
                let mut blocks = blocks.try_borrow_mut().ok()?;
                if let Some(block) = blocks.iter().find(|b| b.manager_id == self.id) {
                    return Some(Arc::clone(&block.tcb));
                }
                blocks.retain(|b| !b.is_orphaned());
                let tcb = self.new_block(false);
                blocks.push(LocalBlock {
                    manager_id: self.id,
                    manager: Arc::downgrade(&self.alive),
                    tcb: Arc::clone(&tcb),
                });
                Some(tcb)
            })
            .ok()
            .flatten()
    }

    fn new_block(&self, transient: bool) -> Arc<ThreadControlBlock> {
        let tcb = Arc::new(ThreadControlBlock::new(transient));
        self.registry.write().push(Arc::clone(&tcb));
        tcb
    }

    /// Enter a critical section.
    ///
    /// Nodes reachable while the returned guard is alive are not freed until
    /// it is dropped. Critical sections nest; only the outermost one
    /// publishes an epoch.
    pub fn enter(&self) -> EpochGuard<'_> {
        self.pin(self.register())
    }

    fn pin(&self, tcb: Arc<ThreadControlBlock>) -> EpochGuard<'_> {
        if tcb.nesting.fetch_add(1, Ordering::Relaxed) == 0 {
            let epoch = self.global_epoch.load(Ordering::SeqCst);
            tcb.local_epoch.store(epoch, Ordering::SeqCst);
            tcb.active.store(true, Ordering::SeqCst);
            fence(Ordering::SeqCst);
        }
        EpochGuard {
            manager: self,
            tcb,
            _not_send: PhantomData,
        }
    }

    fn leave(&self, tcb: &ThreadControlBlock) {
        if tcb.nesting.fetch_sub(1, Ordering::Relaxed) == 1 {
            tcb.active.store(false, Ordering::SeqCst);
            if tcb.transient.load(Ordering::Relaxed) {
                tcb.transient.store(false, Ordering::Release);
            }
        }
    }

    /// Check if the calling thread is inside a critical section of this manager
    pub fn is_pinned(&self) -> bool {
        LOCAL_BLOCKS
            .try_with(|blocks| {
                blocks.try_borrow().ok().is_some_and(|blocks| {
                    blocks
                        .iter()
                        .any(|b| b.manager_id == self.id && b.tcb.is_active())
                })
            })
            .unwrap_or(false)
    }

    /// Retire a boxed node for deferred destruction.
    ///
    /// The node is tagged with the current global epoch. Once the calling
    /// thread's list reaches the retire threshold a sweep runs immediately.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw`, must already be unreachable for
    /// any critical section that starts after this call, and must not be
    /// retired more than once.
    pub unsafe fn retire<T: Send>(&self, ptr: *mut T) {
        if ptr.is_null() {
            return;
        }
        let node = Retired {
            ptr: ptr.cast::<u8>(),
            free: free_boxed::<T>,
            epoch: self.global_epoch.load(Ordering::SeqCst),
        };
        self.retired_total.fetch_add(1, Ordering::Relaxed);

        match self.local_block() {
            Some(tcb) => {
                let len = {
                    let mut list = tcb.retired.lock();
                    list.push(node);
                    list.len()
                };
                if len >= self.retire_threshold {
                    self.advance_epoch();
                    self.reclaim(&tcb);
                }
            }
            None => {
                warn!(
                    manager = self.id,
                    epoch = node.epoch,
                    "no control block for retiring thread, parking node on orphan list"
                );
                self.orphans.lock().push(node);
            }
        }
    }

    /// Try to advance the global epoch by one.
    ///
    /// Succeeds only when every active thread has already observed the
    /// current epoch. Never blocks; returns whether the epoch moved.
    pub fn advance_epoch(&self) -> bool {
        fence(Ordering::SeqCst);
        let current = self.global_epoch.load(Ordering::SeqCst);
        {
            let registry = self.registry.read();
            let lagging = registry
                .iter()
                .any(|tcb| tcb.is_active() && tcb.local_epoch() < current);
            if lagging {
                return false;
            }
        }
        self.global_epoch
            .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Epoch bound at or below which retired nodes may be freed
    #[inline]
    fn safe_epoch(&self) -> Option<u64> {
        self.current_epoch().checked_sub(RECLAIM_LAG)
    }

    /// Free every node on `tcb`'s list that is at least two generations stale.
    ///
    /// Returns the number of nodes freed.
    pub fn reclaim(&self, tcb: &ThreadControlBlock) -> usize {
        let Some(safe_epoch) = self.safe_epoch() else {
            return 0;
        };
        let ready = take_ready(&mut tcb.retired.lock(), safe_epoch);
        self.free_all(ready)
    }

    /// Reclaim on the calling thread's own list
    pub fn reclaim_local(&self) -> usize {
        match self.local_block() {
            Some(tcb) => self.reclaim(&tcb),
            None => 0,
        }
    }

    fn free_all(&self, ready: Vec<Retired>) -> usize {
        let count = ready.len();
        for node in ready {
            // SAFETY: the node is at least RECLAIM_LAG generations stale.
            unsafe { node.free() };
        }
        if count > 0 {
            self.reclaimed_total
                .fetch_add(count as u64, Ordering::Relaxed);
        }
        count
    }

    /// Full sweep: try to advance, reclaim every registered list and the
    /// orphan list, then prune detached empty blocks.
    ///
    /// Returns the number of nodes freed.
    pub fn collect(&self) -> usize {
        self.advance_epoch();
        let blocks: Vec<Arc<ThreadControlBlock>> = self.registry.read().clone();

        let mut freed = 0;
        for tcb in &blocks {
            freed += self.reclaim(tcb);
        }
        if let Some(safe_epoch) = self.safe_epoch() {
            let ready = take_ready(&mut self.orphans.lock(), safe_epoch);
            freed += self.free_all(ready);
        }

        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|tcb| !tcb.is_prunable());
        let pruned = before - registry.len();
        if pruned > 0 && tracing::enabled!(tracing::Level::DEBUG) {
            debug!(manager = self.id, pruned, "pruned detached control blocks");
        }
        freed
    }

    /// Deregister the calling thread.
    ///
    /// Safe nodes are freed immediately; the remainder moves to the orphan
    /// list and is freed by later sweeps. Calling this inside a critical
    /// section is a misuse and is ignored.
    pub fn unregister(&self) {
        let block = LOCAL_BLOCKS
            .try_with(|blocks| {
                let mut blocks = blocks.try_borrow_mut().ok()?;
                let index = blocks.iter().position(|b| b.manager_id == self.id)?;
                if blocks[index].tcb.nesting.load(Ordering::Relaxed) > 0 {
                    warn!(manager = self.id, "unregister called inside a critical section");
                    return None;
                }
                Some(blocks.swap_remove(index))
            })
            .ok()
            .flatten();

        let Some(block) = block else {
            return;
        };

        self.reclaim(&block.tcb);
        let leftover: Vec<Retired> = block.tcb.retired.lock().drain(..).collect();
        if !leftover.is_empty() {
            self.orphans.lock().extend(leftover);
        }
        self.registry
            .write()
            .retain(|tcb| !Arc::ptr_eq(tcb, &block.tcb));
    }

    /// Snapshot of the manager's counters
    pub fn stats(&self) -> EpochStats {
        let registry = self.registry.read();
        let pending = registry.iter().map(|tcb| tcb.retired_len()).sum::<usize>()
            + self.orphans.lock().len();
        EpochStats {
            global_epoch: self.current_epoch(),
            registered_threads: registry.len(),
            pending,
            retired_total: self.retired_total.load(Ordering::Relaxed),
            reclaimed_total: self.reclaimed_total.load(Ordering::Relaxed),
        }
    }

    /// Spawn a background thread that calls [`collect`](Self::collect) every
    /// `interval`.
    pub fn spawn_reclaimer(self: &Arc<Self>, interval: Duration) -> io::Result<Reclaimer> {
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let manager = Arc::clone(self);
        let signal = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("epochlog-reclaimer".to_string())
            .spawn(move || {
                let (lock, cvar) = &*signal;
                let mut stopped = lock.lock();
                while !*stopped {
                    cvar.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                    drop(stopped);
                    manager.collect();
                    stopped = lock.lock();
                }
            })?;

        Ok(Reclaimer {
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Default for EpochManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EpochManager {
    fn drop(&mut self) {
        // Guards borrow the manager, so no critical section can be open here.
        let mut pending: Vec<Retired> = self.orphans.get_mut().drain(..).collect();
        for tcb in self.registry.get_mut().drain(..) {
            pending.extend(tcb.retired.lock().drain(..));
            tcb.detached.store(true, Ordering::Release);
        }
        for node in pending {
            // SAFETY: no thread can be inside a critical section of this manager.
            unsafe { node.free() };
        }
        let _ = LOCAL_BLOCKS.try_with(|blocks| {
            if let Ok(mut blocks) = blocks.try_borrow_mut() {
                blocks.retain(|b| b.manager_id != self.id);
            }
        });
    }
}

// ============ Guard ============

/// RAII guard for a critical section; dropping it leaves the section.
pub struct EpochGuard<'a> {
    manager: &'a EpochManager,
    tcb: Arc<ThreadControlBlock>,
    _not_send: PhantomData<*const ()>,
}

impl EpochGuard<'_> {
    /// Epoch published when the outermost section was entered
    pub fn epoch(&self) -> u64 {
        self.tcb.local_epoch()
    }

    /// Leave the critical section explicitly
    pub fn leave(self) {}
}

impl Drop for EpochGuard<'_> {
    fn drop(&mut self) {
        self.manager.leave(&self.tcb);
    }
}

// ============ Background reclaimer ============

/// Handle on the background reclamation thread.
pub struct Reclaimer {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Reclaimer {
    /// Stop the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let (lock, cvar) = &*self.shutdown;
            *lock.lock() = true;
            cvar.notify_all();
            let _ = handle.join();
        }
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.stop();
    }
}

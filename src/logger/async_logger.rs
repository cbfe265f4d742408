//! Batching single-consumer writer.
//!
//! Producers call [`AsyncLogger::append`], which links the record into the
//! queue and bumps a pending counter. One writer thread sleeps on a condition
//! variable until either the counter reaches the batch threshold or the flush
//! interval elapses, then drains up to `batch_capacity` records and appends
//! them to the rotating sink. `stop()` clears the running flag, wakes the
//! writer and joins it after a final drain and sync.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::epoch::{EpochManager, Reclaimer};
use crate::logger::rotation::RotatingFileSink;
use crate::logger::state::{AtomicWriterState, WriterState};
use crate::logger::stats::{LoggerStats, LoggerStatsSnapshot};
use crate::logger::types::{LoggerConfig, LoggerError, QueueBackend};
use crate::queue::{LinkedQueue, QueueFull, RecordQueue, RingQueue};
use crate::record::Record;

/// State shared between producers, the owner and the writer thread
struct Shared {
    config: LoggerConfig,
    queue: Box<dyn RecordQueue<Record>>,
    /// Records accepted but not yet taken by the writer
    pending: AtomicUsize,
    /// Cleared by `stop()`; read by the writer before each drain
    running: AtomicBool,
    /// Cleared once the logger stops or the writer fails
    accepting: AtomicBool,
    wait_lock: Mutex<()>,
    wakeup: Condvar,
    state: AtomicWriterState,
    stats: LoggerStats,
}

impl Shared {
    fn notify_writer(&self) {
        let _guard = self.wait_lock.lock();
        self.wakeup.notify_one();
    }

    /// Take `n` records off the pending count, clamping at zero.
    ///
    /// A caller-supplied queue may already hold records that were never
    /// counted by `append`.
    fn release_pending(&self, n: usize) {
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_sub(n))
            });
    }
}

enum Lifecycle {
    Created,
    Running(JoinHandle<Result<(), LoggerError>>),
    Stopped,
}

/// Asynchronous batching logger.
///
/// Explicitly constructed and shared by reference (or `Arc`) with every
/// producer. `append` never blocks on I/O.
pub struct AsyncLogger {
    shared: Arc<Shared>,
    epoch: Option<Arc<EpochManager>>,
    lifecycle: Mutex<Lifecycle>,
    reclaimer: Mutex<Option<Reclaimer>>,
}

impl AsyncLogger {
    /// Build a logger with the queue backend named in `config`
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        match config.queue {
            QueueBackend::Linked => {
                let epoch = Arc::new(EpochManager::with_retire_threshold(
                    config.retire_threshold,
                ));
                let queue = LinkedQueue::with_epoch(Arc::clone(&epoch));
                Ok(Self::compose(config, Box::new(queue), Some(epoch)))
            }
            QueueBackend::Ring { capacity, policy } => {
                let queue = RingQueue::with_policy(capacity, policy);
                Ok(Self::compose(config, Box::new(queue), None))
            }
        }
    }

    /// Build a logger around a caller-supplied queue
    pub fn with_queue(
        config: LoggerConfig,
        queue: Box<dyn RecordQueue<Record>>,
    ) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(Self::compose(config, queue, None))
    }

    fn compose(
        config: LoggerConfig,
        queue: Box<dyn RecordQueue<Record>>,
        epoch: Option<Arc<EpochManager>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue,
                pending: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                accepting: AtomicBool::new(true),
                wait_lock: Mutex::new(()),
                wakeup: Condvar::new(),
                state: AtomicWriterState::new(WriterState::Idle),
                stats: LoggerStats::new(),
            }),
            epoch,
            lifecycle: Mutex::new(Lifecycle::Created),
            reclaimer: Mutex::new(None),
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &LoggerConfig {
        &self.shared.config
    }

    /// Epoch manager protecting the linked backend, if any
    pub fn epoch(&self) -> Option<&Arc<EpochManager>> {
        self.epoch.as_ref()
    }

    /// Current writer phase
    pub fn state(&self) -> WriterState {
        self.shared.state.load()
    }

    /// Counter snapshot
    pub fn stats(&self) -> LoggerStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Records accepted but not yet picked up by the writer
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Whether the writer thread is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Queue a record for writing.
    ///
    /// Records appended before `start()` are written once the writer runs.
    /// A record that cannot be queued (full ring, stopped or failed logger)
    /// is counted as dropped; the caller is never told.
    pub fn append(&self, record: Record) {
        let shared = &*self.shared;
        if !shared.accepting.load(Ordering::Acquire) {
            shared.stats.record_drop();
            return;
        }

        // Count before linking so the writer never takes more than was counted.
        let pending = shared.pending.fetch_add(1, Ordering::AcqRel) + 1;
        match shared.queue.enqueue(record) {
            Ok(()) => {
                shared.stats.record_append();
                if pending == shared.config.batch_threshold {
                    shared.notify_writer();
                }
            }
            Err(QueueFull(_record)) => {
                shared.release_pending(1);
                shared.stats.record_drop();
                if tracing::enabled!(tracing::Level::WARN) {
                    warn!(
                        dropped = shared.stats.dropped.load(Ordering::Relaxed),
                        "queue full, record dropped"
                    );
                }
            }
        }
    }

    /// Spawn the writer thread (and the epoch reclaimer, if configured).
    pub fn start(&self) -> Result<(), LoggerError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running(_) => return Err(LoggerError::AlreadyStarted),
            Lifecycle::Stopped => return Err(LoggerError::Stopped),
        }

        let config = &self.shared.config;
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_writer(shared))
            .map_err(|source| {
                self.shared.running.store(false, Ordering::Release);
                LoggerError::Spawn {
                    name: config.thread_name.clone(),
                    source,
                }
            })?;
        *lifecycle = Lifecycle::Running(handle);

        if let (Some(epoch), true) = (&self.epoch, config.background_reclaim) {
            match epoch.spawn_reclaimer(config.reclaim_interval) {
                Ok(reclaimer) => *self.reclaimer.lock() = Some(reclaimer),
                // The writer still sweeps between batches.
                Err(err) => warn!(error = %err, "failed to start epoch reclaimer"),
            }
        }

        info!(
            root = %config.root_dir.display(),
            queue = config.queue.as_str(),
            "logger started"
        );
        Ok(())
    }

    /// Stop accepting records, flush everything queued so far and join the
    /// writer.
    ///
    /// Idempotent: later calls return `Ok(())` without doing anything. The
    /// first call returns the error that halted the writer, if any.
    pub fn stop(&self) -> Result<(), LoggerError> {
        let mut lifecycle = self.lifecycle.lock();
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        self.shared.accepting.store(false, Ordering::Release);

        let handle = match previous {
            Lifecycle::Running(handle) => handle,
            Lifecycle::Created => {
                self.shared.state.store(WriterState::Terminated);
                return Ok(());
            }
            Lifecycle::Stopped => return Ok(()),
        };

        self.shared.running.store(false, Ordering::SeqCst);
        {
            let _guard = self.shared.wait_lock.lock();
            self.shared.wakeup.notify_all();
        }

        let result = handle.join().unwrap_or(Err(LoggerError::WriterPanicked));

        if let Some(mut reclaimer) = self.reclaimer.lock().take() {
            reclaimer.stop();
        }
        if let Some(epoch) = &self.epoch {
            self.shared.stats.record_reclaimed(epoch.collect());
        }

        let stats = self.shared.stats.snapshot();
        info!(
            written = stats.written,
            dropped = stats.dropped,
            batches = stats.batches,
            "logger stopped"
        );
        result
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!(error = %err, "logger stopped with error");
        }
    }
}

fn run_writer(shared: Arc<Shared>) -> Result<(), LoggerError> {
    let config = &shared.config;
    let mut sink = RotatingFileSink::new(
        config.root_dir.clone(),
        config.max_file_bytes,
        config.sync_on_flush,
    );
    let mut batch = Vec::with_capacity(config.batch_capacity);

    let result = writer_loop(&shared, &mut sink, &mut batch);
    if let Err(err) = &result {
        shared.accepting.store(false, Ordering::Release);
        error!(error = %err, "log writer halted");
    }
    shared.state.store(WriterState::Terminated);
    result
}

fn writer_loop(
    shared: &Shared,
    sink: &mut RotatingFileSink,
    batch: &mut Vec<Record>,
) -> Result<(), LoggerError> {
    let config = &shared.config;
    loop {
        {
            let mut guard = shared.wait_lock.lock();
            if shared.running.load(Ordering::Acquire)
                && shared.pending.load(Ordering::Acquire) < config.batch_threshold
            {
                shared.state.store(WriterState::Idle);
                shared.wakeup.wait_for(&mut guard, config.flush_interval);
            }
        }

        // Sampled before draining so the final pass sees every record
        // appended before `stop()`.
        let running = shared.running.load(Ordering::SeqCst);
        if !running {
            shared.state.store(WriterState::Stopping);
        }

        drain_all(shared, sink, batch)?;
        let freed = shared.queue.collect_garbage();
        shared.stats.record_reclaimed(freed);

        if !running {
            sink.sync()?;
            debug!("final flush complete");
            return Ok(());
        }
    }
}

/// Write batches until a drain comes back short of the cap
fn drain_all(
    shared: &Shared,
    sink: &mut RotatingFileSink,
    batch: &mut Vec<Record>,
) -> Result<(), LoggerError> {
    let capacity = shared.config.batch_capacity;
    loop {
        if shared.running.load(Ordering::Acquire) {
            shared.state.store(WriterState::Draining);
        }
        batch.clear();
        while batch.len() < capacity {
            match shared.queue.dequeue() {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        shared.release_pending(batch.len());

        if shared.running.load(Ordering::Acquire) {
            shared.state.store(WriterState::Writing);
        }
        let report = sink.write_batch(batch)?;
        shared.stats.record_batch(&report);
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(lines = report.lines, bytes = report.bytes, "batch written");
        }

        if batch.len() < capacity {
            batch.clear();
            return Ok(());
        }
    }
}

//! Writer statistics

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::logger::rotation::BatchReport;

/// Counters updated by producers and the writer thread
#[derive(Debug, Default)]
pub struct LoggerStats {
    /// Records accepted by the queue
    pub appended: AtomicU64,
    /// Records rejected (full ring or stopped logger)
    pub dropped: AtomicU64,
    /// Lines written to disk
    pub written: AtomicU64,
    /// Non-empty batches written
    pub batches: AtomicU64,
    /// File rotations
    pub rotations: AtomicU64,
    /// Bytes written to disk
    pub bytes_written: AtomicU64,
    /// Queue nodes freed by the writer between batches
    pub reclaimed: AtomicU64,
}

impl LoggerStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted record
    pub fn record_append(&self) {
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected record
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a written batch
    pub fn record_batch(&self, report: &BatchReport) {
        if report.lines == 0 {
            return;
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.written.fetch_add(report.lines, Ordering::Relaxed);
        self.bytes_written.fetch_add(report.bytes, Ordering::Relaxed);
        self.rotations.fetch_add(report.rotations, Ordering::Relaxed);
    }

    /// Record nodes freed by a reclamation pass
    pub fn record_reclaimed(&self, count: usize) {
        self.reclaimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a point-in-time copy
    pub fn snapshot(&self) -> LoggerStatsSnapshot {
        LoggerStatsSnapshot {
            appended: self.appended.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`LoggerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoggerStatsSnapshot {
    /// Records accepted by the queue
    pub appended: u64,
    /// Records rejected
    pub dropped: u64,
    /// Lines written
    pub written: u64,
    /// Batches written
    pub batches: u64,
    /// File rotations
    pub rotations: u64,
    /// Bytes written
    pub bytes_written: u64,
    /// Queue nodes freed by the writer
    pub reclaimed: u64,
}

impl LoggerStatsSnapshot {
    /// Records accepted but not yet written
    pub fn in_flight(&self) -> u64 {
        self.appended.saturating_sub(self.written)
    }

    /// Mean lines per batch
    pub fn average_batch(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        self.written as f64 / self.batches as f64
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for LoggerStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Logger Statistics:")?;
        writeln!(f, "  Appended: {}", self.appended)?;
        writeln!(f, "  Dropped: {}", self.dropped)?;
        writeln!(f, "  Written: {}", self.written)?;
        writeln!(
            f,
            "  Batches: {} (avg {:.1} lines)",
            self.batches,
            self.average_batch()
        )?;
        writeln!(f, "  Rotations: {}", self.rotations)?;
        writeln!(f, "  Bytes written: {}", self.bytes_written)?;
        write!(f, "  Reclaimed nodes: {}", self.reclaimed)
    }
}

//! epochlog - Lock-free asynchronous access logging
//!
//! Many producer threads hand structured [`Record`]s to an [`AsyncLogger`];
//! one writer thread batches them into rotating files laid out as
//! `<root>/<YYYY-MM-DD>/<N>.txt`.
//!
//! # Components
//!
//! - **Epoch manager**: generation-based deferred reclamation for lock-free
//!   structures ([`epoch`])
//! - **Record queues**: an unbounded Michael-Scott queue and a bounded ring,
//!   both behind [`queue::RecordQueue`]
//! - **Batching writer**: count/time triggered drain with size-capped file
//!   rotation ([`logger`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use epochlog::prelude::*;
//!
//! # fn main() -> Result<(), LoggerError> {
//! let logger = Arc::new(AsyncLogger::new(LoggerConfig::new("/var/log/app"))?);
//! logger.start()?;
//!
//! logger.append(Record::event(Severity::Info, "service up"));
//!
//! logger.stop()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod access;
pub mod config;
pub mod epoch;
pub mod logger;
pub mod queue;
pub mod record;

#[cfg(test)]
mod test_util;

// Re-exports for convenience
pub use access::{AccessLogger, AccessSpan};
pub use config::{ConfigError, EpochlogConfig};
pub use epoch::{EpochGuard, EpochManager};
pub use logger::{AsyncLogger, LoggerConfig, LoggerError, QueueBackend, WriterState};
pub use record::{Operation, Outcome, OutcomeCode, Record, RecordKind, Severity};

/// Constants used throughout the library
pub mod constants {
    /// Size of a cache line in bytes
    pub const CACHE_LINE_BYTES: usize = 64;

    /// Retired nodes a thread accumulates before it sweeps
    pub const DEFAULT_RETIRE_THRESHOLD: usize = 64;

    /// Generations a retired node must age before it is freed
    pub const RECLAIM_LAG: u64 = 2;

    /// Background reclaimer period (ms)
    pub const DEFAULT_RECLAIM_INTERVAL_MS: u64 = 100;

    /// Pending records that wake the writer
    pub const DEFAULT_BATCH_THRESHOLD: usize = 256;

    /// Most records written per batch
    pub const DEFAULT_BATCH_CAPACITY: usize = 512;

    /// Writer wake-up timeout (ms)
    pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 256;

    /// Log file rotation size (32 MiB)
    pub const DEFAULT_MAX_FILE_BYTES: u64 = 32 * crate::size::MIB;
}

/// Utility for size literals
pub mod size {
    /// 1 KiB in bytes
    pub const KIB: u64 = 1024;
    /// 1 MiB in bytes
    pub const MIB: u64 = 1024 * KIB;
    /// 1 GiB in bytes
    pub const GIB: u64 = 1024 * MIB;
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::access::AccessLogger;
    pub use crate::epoch::EpochManager;
    pub use crate::logger::{AsyncLogger, LoggerConfig, LoggerError, QueueBackend};
    pub use crate::queue::{FullPolicy, LinkedQueue, RecordQueue, RingQueue};
    pub use crate::record::{Operation, Outcome, OutcomeCode, Record, RecordKind, Severity};
}

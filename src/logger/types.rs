//! Shared types for the asynchronous logger.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_BATCH_CAPACITY, DEFAULT_BATCH_THRESHOLD, DEFAULT_FLUSH_INTERVAL_MS,
    DEFAULT_MAX_FILE_BYTES, DEFAULT_RECLAIM_INTERVAL_MS, DEFAULT_RETIRE_THRESHOLD,
};
use crate::queue::FullPolicy;

/// Which queue sits between producers and the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    /// Unbounded linked queue with epoch reclamation
    #[default]
    Linked,
    /// Fixed-size ring
    Ring {
        /// Number of slots
        capacity: usize,
        /// What to do when every slot is taken
        policy: FullPolicy,
    },
}

impl QueueBackend {
    /// Ring backend that rejects records when full
    pub fn ring(capacity: usize) -> Self {
        Self::Ring {
            capacity,
            policy: FullPolicy::Reject,
        }
    }

    /// Stable name used in config files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linked => "linked",
            Self::Ring { .. } => "ring",
        }
    }
}

/// Configuration for the asynchronous logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Directory that holds the per-day subdirectories
    pub root_dir: PathBuf,
    /// Pending records that wake the writer early
    pub batch_threshold: usize,
    /// Most records written per batch
    pub batch_capacity: usize,
    /// Longest the writer sleeps between batches
    pub flush_interval: Duration,
    /// Size at which the current file is rotated
    pub max_file_bytes: u64,
    /// `fsync` after every batch instead of only at shutdown
    pub sync_on_flush: bool,
    /// Queue backend
    pub queue: QueueBackend,
    /// Retired nodes per thread before a sweep
    pub retire_threshold: usize,
    /// Period of the background reclaimer
    pub reclaim_interval: Duration,
    /// Whether to run the background reclaimer
    pub background_reclaim: bool,
    /// Name of the writer thread
    pub thread_name: String,
}

impl LoggerConfig {
    /// Defaults writing below `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Set the wake-up threshold
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    /// Set the batch capacity
    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    /// Set the writer's wake-up timeout
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the rotation size
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Sync to disk after every batch
    pub fn with_sync_on_flush(mut self, enabled: bool) -> Self {
        self.sync_on_flush = enabled;
        self
    }

    /// Pick the queue backend
    pub fn with_queue(mut self, queue: QueueBackend) -> Self {
        self.queue = queue;
        self
    }

    /// Set the per-thread retire threshold
    pub fn with_retire_threshold(mut self, threshold: usize) -> Self {
        self.retire_threshold = threshold;
        self
    }

    /// Enable or disable the background reclaimer
    pub fn with_background_reclaim(mut self, enabled: bool, interval: Duration) -> Self {
        self.background_reclaim = enabled;
        self.reclaim_interval = interval;
        self
    }

    /// Name the writer thread
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Check values that would make the writer misbehave
    pub fn validate(&self) -> Result<(), LoggerError> {
        if self.batch_threshold == 0 {
            return Err(LoggerError::InvalidConfig(
                "batch_threshold must be greater than zero".into(),
            ));
        }
        if self.batch_capacity == 0 {
            return Err(LoggerError::InvalidConfig(
                "batch_capacity must be greater than zero".into(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(LoggerError::InvalidConfig(
                "flush_interval must be greater than zero".into(),
            ));
        }
        if self.max_file_bytes == 0 {
            return Err(LoggerError::InvalidConfig(
                "max_file_bytes must be greater than zero".into(),
            ));
        }
        if let QueueBackend::Ring { capacity: 0, .. } = self.queue {
            return Err(LoggerError::InvalidConfig(
                "ring capacity must be greater than zero".into(),
            ));
        }
        if self.background_reclaim && self.reclaim_interval.is_zero() {
            return Err(LoggerError::InvalidConfig(
                "reclaim_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("logs"),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            sync_on_flush: false,
            queue: QueueBackend::Linked,
            retire_threshold: DEFAULT_RETIRE_THRESHOLD,
            reclaim_interval: Duration::from_millis(DEFAULT_RECLAIM_INTERVAL_MS),
            background_reclaim: true,
            thread_name: "epochlog-writer".to_string(),
        }
    }
}

/// Errors reported by the logger
#[derive(Debug, Error)]
pub enum LoggerError {
    /// A log file could not be opened
    #[error("failed to open log file {path}: {source}")]
    Open {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Writing or syncing a log file failed
    #[error("failed to write log file {path}: {source}")]
    Write {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// A day directory could not be created or listed
    #[error("failed to prepare log directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// A background thread could not be spawned
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        /// Thread name
        name: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// `start` was called on a running logger
    #[error("logger already started")]
    AlreadyStarted,
    /// The logger has been stopped
    #[error("logger stopped")]
    Stopped,
    /// The writer thread panicked
    #[error("writer thread panicked")]
    WriterPanicked,
    /// Configuration rejected by [`LoggerConfig::validate`]
    #[error("invalid logger configuration: {0}")]
    InvalidConfig(String),
}

impl LoggerError {
    /// Whether the error came from the filesystem
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::Write { .. } | Self::CreateDir { .. } | Self::Spawn { .. }
        )
    }
}

//! Asynchronous batching logger
//!
//! [`AsyncLogger`] owns the record queue and a single writer thread that
//! drains it into `<root>/<YYYY-MM-DD>/<N>.txt` files through a
//! [`RotatingFileSink`].

mod async_logger;
mod format;
mod rotation;
mod state;
mod stats;
mod types;

pub use async_logger::AsyncLogger;
pub use format::{format_line, format_record, FIELD_SEPARATOR, TIMESTAMP_FORMAT};
pub use rotation::{BatchReport, RotatingFileSink, LOG_FILE_EXTENSION};
pub use state::WriterState;
pub use stats::{LoggerStats, LoggerStatsSnapshot};
pub use types::{LoggerConfig, LoggerError, QueueBackend};

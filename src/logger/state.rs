//! Writer thread lifecycle

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of the writer thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterState {
    /// Created but not started, or waiting for work
    Idle = 0,
    /// Moving records from the queue into a batch
    Draining = 1,
    /// Writing a batch to disk
    Writing = 2,
    /// Stop requested; performing the final flush
    Stopping = 3,
    /// Thread exited
    Terminated = 4,
}

impl WriterState {
    /// Upper-case name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Draining => "DRAINING",
            Self::Writing => "WRITING",
            Self::Stopping => "STOPPING",
            Self::Terminated => "TERMINATED",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Draining,
            2 => Self::Writing,
            3 => Self::Stopping,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for WriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`WriterState`] shared between the writer and observers
#[derive(Debug)]
pub(crate) struct AtomicWriterState(AtomicU8);

impl AtomicWriterState {
    pub(crate) const fn new(state: WriterState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> WriterState {
        WriterState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: WriterState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

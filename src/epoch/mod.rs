//! Epoch-based memory reclamation
//!
//! This module implements the generation-counting scheme used to free queue
//! nodes without a garbage collector. Threads publish the epoch they observe
//! while inside a critical section; retired nodes are freed once the global
//! epoch is two generations past their retirement.

mod manager;

pub use manager::{EpochGuard, EpochManager, EpochStats, Reclaimer, ThreadControlBlock};

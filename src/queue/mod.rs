//! Record queues
//!
//! Two interchangeable backends implement [`RecordQueue`]:
//!
//! - [`LinkedQueue`]: unbounded Michael-Scott queue; enqueue never fails.
//!   Unlinked nodes are reclaimed through the
//!   [`EpochManager`](crate::epoch::EpochManager).
//! - [`RingQueue`]: fixed capacity; a full ring is reported back to the
//!   caller (or waited on for a bounded time) per its [`FullPolicy`].
//!
//! The backend is picked when the logger is composed; see
//! [`QueueBackend`](crate::logger::QueueBackend).

mod linked;
mod ring;
mod traits;

pub use linked::LinkedQueue;
pub use ring::RingQueue;
pub use traits::{Backpressure, FullPolicy, QueueFull, RecordQueue};

//! Redis Streams job queue.
//!
//! This crate provides:
//! - Enqueueing `NarrationJob` messages onto a stream
//! - Consumer-group reads for workers
//! - Reclaiming messages left pending by crashed workers

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{Delivery, NarrationJob};
pub use queue::{JobQueue, QueueConfig};

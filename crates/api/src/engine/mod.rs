//! Background OCR job execution.

pub mod queue;

pub use queue::{job_queue, JobDispatcher, JobQueue, QueueClosed};

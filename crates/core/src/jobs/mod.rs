//! OCR job lifecycle: identifiers, terminal records, the write-once store,
//! and the pipeline orchestrator.
//!
//! A job is `pending` until the orchestrator writes exactly one terminal
//! record (`completed` or `failed`) for it.

pub mod id;
pub mod orchestrator;
pub mod record;
pub mod store;

pub use id::{InvalidJobId, JobId, JOB_ID_PATTERN};
pub use orchestrator::{JobOrchestrator, OcrJob, PipelineStep, STEP_META, STEP_TX};
pub use record::JobOutcome;
pub use store::{FsJobStore, StoreError};

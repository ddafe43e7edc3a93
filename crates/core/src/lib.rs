//! Domain logic for the ledgerscan OCR service.
//!
//! Everything here is free of HTTP and database concerns so it can be
//! exercised directly from unit tests:
//!
//! - [`runner`] -- external tool invocation and structured-output extraction.
//! - [`jobs`] -- job ids, the write-once job store, and the step orchestrator.
//! - [`supervisor`] -- liveness, lazy start, and termination of the local
//!   language-model server.

pub mod error;
pub mod jobs;
pub mod roles;
pub mod runner;
pub mod supervisor;
pub mod types;

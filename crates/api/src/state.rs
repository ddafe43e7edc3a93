use std::sync::Arc;

use ledgerscan_core::jobs::FsJobStore;
use ledgerscan_core::supervisor::LlmServerSupervisor;

use crate::config::ServerConfig;
use crate::engine::JobQueue;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: ledgerscan_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Hands submitted jobs to the background dispatcher.
    pub jobs: JobQueue,
    /// Read side of the job store (the orchestrator owns the write side).
    pub store: Arc<FsJobStore>,
    pub supervisor: Arc<LlmServerSupervisor>,
    /// Client used to relay chat requests to the LLM server.
    pub http: reqwest::Client,
}

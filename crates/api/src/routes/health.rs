use axum::extract::State;
use axum::{routing::get, Json, Router};
use ledgerscan_core::supervisor::Liveness;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when the database is reachable, `degraded` otherwise.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub db_healthy: bool,
    /// The LLM server is started on demand, so `false` does not degrade status.
    pub llm_server_up: bool,
}

/// GET /health -- returns service, database, and LLM server health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (db, llm) = tokio::join!(
        ledgerscan_db::health_check(&state.pool),
        state.supervisor.probe()
    );
    let db_healthy = db.is_ok();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        llm_server_up: llm == Liveness::Up,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

//! Route definitions for the `/llm` supervisor resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::llm_server;
use crate::state::AppState;

/// Routes mounted at `/llm`.
///
/// ```text
/// GET  /status   -> status
/// POST /start    -> start (admin)
/// POST /stop     -> stop (admin)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(llm_server::status))
        .route("/start", post(llm_server::start))
        .route("/stop", post(llm_server::stop))
}

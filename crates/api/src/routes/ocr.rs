//! Route definitions for the `/ocr` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::ocr;
use crate::state::AppState;

/// Routes mounted at `/ocr`.
///
/// ```text
/// POST /jobs           -> submit_job
/// GET  /result/{id}    -> get_result
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(ocr::submit_job))
        .route("/result/{id}", get(ocr::get_result))
}

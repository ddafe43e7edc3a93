pub mod auth;
pub mod chat;
pub mod health;
pub mod llm_server;
pub mod ocr;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                  login (public)
///
/// /ocr/jobs                    submit OCR job (POST, auth)
/// /ocr/result/{id}             poll job outcome (GET, auth)
///
/// /chat/completions            relay to the LLM server (POST, auth)
///
/// /llm/status                  liveness and phase (GET, auth)
/// /llm/start                   start if down (POST, admin)
/// /llm/stop                    stop, optionally forced (POST, admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/ocr", ocr::router())
        .nest("/chat", chat::router())
        .nest("/llm", llm_server::router())
}

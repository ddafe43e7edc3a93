use axum::routing::post;
use axum::Router;

use crate::handlers::chat;
use crate::state::AppState;

/// Routes mounted at `/chat`.
pub fn router() -> Router<AppState> {
    Router::new().route("/completions", post(chat::chat_completions))
}

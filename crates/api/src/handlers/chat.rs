//! Chat-completions relay to the local LLM server.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledgerscan_core::supervisor::Availability;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// POST /api/v1/chat/completions
///
/// Makes sure the LLM server is running, then forwards the JSON body to its
/// OpenAI-compatible endpoint and returns the upstream status and body.
pub async fn chat_completions(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> AppResult<Response> {
    if !body.is_object() {
        return Err(AppError::BadRequest(
            "Request body must be a JSON object".into(),
        ));
    }
    if body.get("stream").and_then(Value::as_bool) == Some(true) {
        return Err(AppError::BadRequest(
            "Streaming responses are not supported".into(),
        ));
    }

    match state.supervisor.ensure_running().await? {
        Availability::AlreadyUp => {}
        Availability::Started => {
            tracing::info!(user_id = user.user_id, "LLM server started for chat request");
        }
        Availability::StartInProgress => {
            tracing::info!(user_id = user.user_id, "LLM server start in progress, forwarding anyway");
        }
    }

    let upstream = state
        .http
        .post(state.config.llm.chat_completions_url())
        .json(&body)
        .send()
        .await
        .map_err(|e| AppError::BadGateway(format!("LLM server request failed: {e}")))?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let payload: Value = upstream
        .json()
        .await
        .map_err(|e| AppError::BadGateway(format!("LLM server returned an invalid body: {e}")))?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "LLM server returned an error status");
    }

    Ok((status, Json(payload)).into_response())
}

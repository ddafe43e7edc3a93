//! Handlers for the `/llm` supervisor control resource.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use ledgerscan_core::supervisor::{Availability, Liveness, ServerPhase};
use serde::{Deserialize, Serialize};

use super::parse_optional_json;
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub phase: ServerPhase,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub availability: Availability,
    pub phase: ServerPhase,
}

/// Optional request body for `POST /llm/stop`.
#[derive(Debug, Default, Deserialize)]
pub struct StopRequest {
    /// Skip SIGTERM and the grace period.
    #[serde(default)]
    pub force: bool,
}

/// GET /api/v1/llm/status
pub async fn status(State(state): State<AppState>, _user: AuthUser) -> DataResponse<ServerStatus> {
    let running = state.supervisor.probe().await == Liveness::Up;
    DataResponse::new(ServerStatus {
        running,
        phase: state.supervisor.phase(),
    })
}

/// POST /api/v1/llm/start (admin)
pub async fn start(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> AppResult<DataResponse<StartResponse>> {
    tracing::info!(user_id = admin.user_id, "LLM server start requested");
    let availability = state.supervisor.ensure_running().await?;
    Ok(DataResponse::new(StartResponse {
        availability,
        phase: state.supervisor.phase(),
    }))
}

/// POST /api/v1/llm/stop (admin)
///
/// Responds 200 when every matching process was terminated, 500 with the
/// same report otherwise.
pub async fn stop(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: Bytes,
) -> AppResult<Response> {
    let request: StopRequest = parse_optional_json(&body)?;
    tracing::info!(user_id = admin.user_id, force = request.force, "LLM server stop requested");

    let report = if request.force {
        state.supervisor.stop_forced().await?
    } else {
        state.supervisor.stop_graceful().await?
    };

    let status = if report.success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok(DataResponse::new(report).with_status(status))
}

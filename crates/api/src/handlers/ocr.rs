//! Handlers for OCR job submission and polling.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use ledgerscan_core::error::CoreError;
use ledgerscan_core::jobs::{JobId, JobOutcome, OcrJob};
use ledgerscan_core::runner::overrides;
use ledgerscan_core::types::Overrides;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::parse_optional_json;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Prefix of the polling URL returned on submission.
pub const RESULT_URL_PREFIX: &str = "/api/v1/ocr/result";

/// Optional request body for `POST /ocr/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub overrides: Overrides,
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: &'static str,
    pub result_url: String,
}

/// POST /api/v1/ocr/jobs
///
/// Queue an OCR run over the configured input image. Responds 202 before the
/// pipeline starts; poll `result_url` for the outcome.
pub async fn submit_job(
    State(state): State<AppState>,
    user: AuthUser,
    body: Bytes,
) -> AppResult<Response> {
    let request: SubmitJobRequest = parse_optional_json(&body)?;

    overrides::validate(&request.overrides).map_err(|key| {
        AppError::Core(CoreError::Validation(format!(
            "Override '{key}' must be a string, number, or boolean"
        )))
    })?;

    let input = state.config.ocr.input_image.clone();
    if let Err(e) = tokio::fs::File::open(&input).await {
        // Accepted anyway; the first pipeline step will fail and record it.
        tracing::warn!(input = %input.display(), error = %e, "OCR input image is not readable");
    }

    let id = JobId::generate();
    state
        .jobs
        .enqueue(OcrJob {
            id: id.clone(),
            input,
            overrides: request.overrides,
        })
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    tracing::info!(job_id = %id, user_id = user.user_id, "OCR job submitted");

    Ok(DataResponse::new(JobAccepted {
        result_url: format!("{RESULT_URL_PREFIX}/{id}"),
        job_id: id,
        status: "pending",
    })
    .with_status(StatusCode::ACCEPTED))
}

/// GET /api/v1/ocr/result/{id}
///
/// - 202 while pending
/// - 200 with the result record once completed
/// - 500 with the error record once failed
/// - 400 for a malformed id, before the store is touched
pub async fn get_result(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(raw_id): Path<String>,
) -> AppResult<Response> {
    let id = JobId::parse(&raw_id)?;

    let response = match state.store.read(&id).await? {
        JobOutcome::Pending => DataResponse::new(json!({ "status": "pending", "job_id": id }))
            .with_status(StatusCode::ACCEPTED),
        JobOutcome::Completed(record) => DataResponse::new(record).with_status(StatusCode::OK),
        JobOutcome::Failed(record) => {
            DataResponse::new(record).with_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    Ok(response)
}

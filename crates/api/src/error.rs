use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledgerscan_core::error::CoreError;
use ledgerscan_core::jobs::{InvalidJobId, StoreError};
use ledgerscan_core::supervisor::SupervisorError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A job id that fails validation. Raised before any store access.
    #[error(transparent)]
    InvalidJobId(#[from] InvalidJobId),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM server error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The upstream LLM server could not be reached or answered garbage.
    #[error("Upstream error: {0}")]
    BadGateway(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::InvalidJobId(err) => {
                (StatusCode::BAD_REQUEST, "INVALID_JOB_ID", err.to_string())
            }

            AppError::Store(err) => {
                tracing::error!(error = %err, "Job store error");
                internal()
            }

            AppError::Supervisor(err) => match err {
                SupervisorError::Enumerate(_) => {
                    tracing::error!(error = %err, "Process enumeration failed");
                    internal()
                }
                SupervisorError::ModelMissing(_) | SupervisorError::Launch { .. } => {
                    tracing::error!(error = %err, "LLM server unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "LLM_SERVER_UNAVAILABLE",
                        err.to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "Upstream request failed");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (SQLSTATE 23505) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            (
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("Duplicate value violates unique constraint: {constraint}"),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn invalid_job_id_is_client_error() {
        let err = AppError::from(InvalidJobId("../etc".to_string()));
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn supervisor_errors_map_by_kind() {
        let missing = SupervisorError::ModelMissing(PathBuf::from("/m.gguf"));
        assert_eq!(status_of(missing.into()), StatusCode::SERVICE_UNAVAILABLE);

        let enumerate = SupervisorError::Enumerate(std::io::Error::other("boom"));
        assert_eq!(status_of(enumerate.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_failure_is_bad_gateway() {
        let err = AppError::BadGateway("connection refused".to_string());
        assert_eq!(status_of(err), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn row_not_found_is_404() {
        assert_eq!(
            status_of(AppError::Database(sqlx::Error::RowNotFound)),
            StatusCode::NOT_FOUND
        );
    }
}

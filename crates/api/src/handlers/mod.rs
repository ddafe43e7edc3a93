pub mod auth;
pub mod chat;
pub mod llm_server;
pub mod ocr;

use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

/// Parse an optional JSON body; an empty body yields `T::default()`.
pub(crate) fn parse_optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

//! Terminal job records and the poll-side view of a job.
//!
//! Both record kinds carry a `status` field matching the outer outcome so a
//! record file is self-describing when inspected on disk.

use chrono::Utc;
use serde_json::{json, Map, Value};

use super::id::JobId;
use crate::runner::RunnerError;

/// What a poll sees for a job id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// No terminal record yet.
    Pending,
    /// The result record.
    Completed(Value),
    /// The error record (or a synthetic one if the stored record is corrupt).
    Failed(Value),
}

impl JobOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Build the result record from the merged step outputs.
pub fn completed_record(id: &JobId, results: Map<String, Value>) -> Value {
    let mut record = Map::new();
    record.insert("status".into(), json!("completed"));
    record.insert("job_id".into(), json!(id));
    record.insert("completed_at".into(), json!(Utc::now()));
    for (key, value) in results {
        record.insert(key, value);
    }
    Value::Object(record)
}

/// Build the error record for a failed step.
///
/// Captured streams are included verbatim when the tool ran to completion.
pub fn failed_record(id: &JobId, step: &str, err: &RunnerError) -> Value {
    let (stdout, stderr) = match err.captured_output() {
        Some((out, errout)) => (Some(out), Some(errout)),
        None => (None, None),
    };

    json!({
        "status": "failed",
        "job_id": id,
        "failed_at": Utc::now(),
        "step": step,
        "error": format!("Step '{step}' failed: {err}"),
        "exit_code": err.exit_code(),
        "stdout": stdout,
        "stderr": stderr,
    })
}

/// Synthetic error record returned when a stored record cannot be parsed.
pub fn corrupted_record(id: &JobId, message: &str) -> Value {
    json!({
        "status": "failed",
        "job_id": id,
        "error": message,
    })
}

//! Step-by-step OCR pipeline for a single job.
//!
//! The pipeline is a fixed, ordered list of [`PipelineStep`]s. Each step runs
//! one external tool against the same input image and overrides. On the
//! first failure the run stops and the error record is written. When every
//! step succeeds their outputs are merged under each step's `output_key`
//! and the result record is written. Exactly one terminal record is
//! attempted per job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Map;

use super::id::JobId;
use super::record::{completed_record, failed_record, JobOutcome};
use super::store::FsJobStore;
use crate::runner::{ToolExecutor, ToolInput, ToolSpec};
use crate::types::Overrides;

/// Step name of the statement-metadata extraction.
pub const STEP_META: &str = "run_meta";
/// Step name of the transaction-table extraction.
pub const STEP_TX: &str = "run_tx";

/// One stage of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStep {
    /// Name recorded in error records (e.g. `"run_meta"`).
    pub name: String,
    /// Key under which this step's output appears in the result record.
    pub output_key: String,
    pub tool: ToolSpec,
}

impl PipelineStep {
    pub fn new(name: &str, output_key: &str, tool: ToolSpec) -> Self {
        Self {
            name: name.to_string(),
            output_key: output_key.to_string(),
            tool,
        }
    }
}

/// A unit of work handed from submission to the pipeline.
#[derive(Debug, Clone)]
pub struct OcrJob {
    pub id: JobId,
    /// Preprocessed image every step reads.
    pub input: PathBuf,
    pub overrides: Overrides,
}

/// Runs OCR jobs through the configured steps and records the outcome.
pub struct JobOrchestrator<E> {
    executor: E,
    store: Arc<FsJobStore>,
    steps: Vec<PipelineStep>,
}

impl<E: ToolExecutor> JobOrchestrator<E> {
    pub fn new(executor: E, store: Arc<FsJobStore>, steps: Vec<PipelineStep>) -> Self {
        Self {
            executor,
            store,
            steps,
        }
    }

    pub fn store(&self) -> &Arc<FsJobStore> {
        &self.store
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Run every step for `job` and persist the terminal record.
    ///
    /// Never returns an error: step failures become the job's error record,
    /// and a failure to persist is logged (the job then stays pending).
    /// The returned outcome is what was computed, whether or not it was
    /// persisted.
    pub async fn run_job(&self, job: OcrJob) -> JobOutcome {
        let started = Instant::now();
        tracing::info!(job_id = %job.id, steps = self.steps.len(), "OCR pipeline started");

        let mut results = Map::new();

        for step in &self.steps {
            let input = ToolInput {
                image: job.input.clone(),
                overrides: job.overrides.clone(),
            };

            match self.executor.execute(&step.tool, input).await {
                Ok(output) => {
                    tracing::info!(
                        job_id = %job.id,
                        step = %step.name,
                        duration_ms = output.duration_ms,
                        "Pipeline step completed"
                    );
                    results.insert(step.output_key.clone(), output.payload);
                }
                Err(err) => {
                    tracing::error!(
                        job_id = %job.id,
                        step = %step.name,
                        error = %err,
                        "Pipeline step failed"
                    );
                    let record = failed_record(&job.id, &step.name, &err);
                    if let Err(e) = self.store.write_error(&job.id, &record).await {
                        tracing::error!(
                            job_id = %job.id,
                            error = %e,
                            "Failed to persist error record; job will remain pending"
                        );
                    }
                    return JobOutcome::Failed(record);
                }
            }
        }

        let record = completed_record(&job.id, results);
        if let Err(e) = self.store.write_result(&job.id, &record).await {
            tracing::error!(
                job_id = %job.id,
                error = %e,
                "Failed to persist result record; job will remain pending"
            );
        }

        tracing::info!(
            job_id = %job.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "OCR pipeline completed"
        );
        JobOutcome::Completed(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

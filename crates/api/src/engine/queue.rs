//! Job queue and dispatcher.
//!
//! Submission handlers push [`OcrJob`]s onto an unbounded channel and return
//! immediately. A single long-lived [`JobDispatcher`] task drains the channel
//! and runs each job on its own Tokio task, so jobs are independent and may
//! overlap. On cancellation the dispatcher stops taking new work, starts the
//! jobs still buffered in the channel, and waits for every pipeline to finish.

use std::sync::Arc;

use ledgerscan_core::jobs::{JobOrchestrator, OcrJob};
use ledgerscan_core::runner::ToolExecutor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// The dispatcher is gone; no more jobs can be accepted.
#[derive(Debug, thiserror::Error)]
#[error("Job queue is closed")]
pub struct QueueClosed;

/// Cloneable handle used by handlers to enqueue jobs.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<OcrJob>,
}

impl JobQueue {
    pub fn enqueue(&self, job: OcrJob) -> Result<(), QueueClosed> {
        self.tx.send(job).map_err(|_| QueueClosed)
    }
}

/// Create a connected queue handle and dispatcher.
pub fn job_queue<E>(orchestrator: Arc<JobOrchestrator<E>>) -> (JobQueue, JobDispatcher<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        JobQueue { tx },
        JobDispatcher {
            orchestrator,
            rx,
            tracker: TaskTracker::new(),
        },
    )
}

/// Background task that starts a pipeline for every queued job.
pub struct JobDispatcher<E> {
    orchestrator: Arc<JobOrchestrator<E>>,
    rx: mpsc::UnboundedReceiver<OcrJob>,
    tracker: TaskTracker,
}

impl<E: ToolExecutor + 'static> JobDispatcher<E> {
    /// Run until cancelled or until every [`JobQueue`] handle is dropped,
    /// then wait for in-flight jobs.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Job dispatcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                next = self.rx.recv() => match next {
                    Some(job) => self.dispatch(job),
                    None => {
                        tracing::info!("Job queue closed, dispatcher exiting");
                        break;
                    }
                },
            }
        }

        // Jobs already accepted with a 202 still run.
        self.rx.close();
        while let Some(job) = self.rx.recv().await {
            self.dispatch(job);
        }
        self.tracker.close();
        if !self.tracker.is_empty() {
            tracing::info!(in_flight = self.tracker.len(), "Waiting for in-flight OCR jobs");
        }
        self.tracker.wait().await;
        tracing::info!("Job dispatcher stopped");
    }

    fn dispatch(&self, job: OcrJob) {
        tracing::debug!(job_id = %job.id, "Dispatching OCR job");
        let orchestrator = Arc::clone(&self.orchestrator);
        self.tracker.spawn(async move {
            orchestrator.run_job(job).await;
        });
    }
}

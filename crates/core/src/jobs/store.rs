//! Durable, write-once job outcome store.
//!
//! Each job owns two disjoint files in the store directory:
//!
//! ```text
//! <id>.json    result record (status = "completed")
//! <id>.error   error record  (status = "failed")
//! ```
//!
//! Absence of both means the job is pending. A record is written to a
//! private temp file and then published with a hard link, which fails if
//! the target already exists. Readers therefore never observe a partially
//! written record and a terminal record is never overwritten.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::id::JobId;
use super::record::{corrupted_record, JobOutcome};

const RESULT_SUFFIX: &str = "json";
const ERROR_SUFFIX: &str = "error";

/// Errors from the job store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The job already has a result or error record.
    #[error("Job {0} already has a terminal record")]
    AlreadyTerminal(String),

    #[error("Failed to serialize job record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job store I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Filesystem-backed job store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FsJobStore {
    dir: PathBuf,
}

impl FsJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the store directory if it does not exist.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn result_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{id}.{RESULT_SUFFIX}"))
    }

    pub fn error_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{id}.{ERROR_SUFFIX}"))
    }

    /// Persist the result record for `id`.
    pub async fn write_result(&self, id: &JobId, record: &Value) -> Result<(), StoreError> {
        self.write_once(id, &self.result_path(id), record).await
    }

    /// Persist the error record for `id`.
    pub async fn write_error(&self, id: &JobId, record: &Value) -> Result<(), StoreError> {
        self.write_once(id, &self.error_path(id), record).await
    }

    /// Look up the outcome of `id`.
    ///
    /// The error record takes precedence over the result record. A record
    /// that exists but does not parse is reported as `Failed` with a
    /// synthetic "corrupted" body.
    pub async fn read(&self, id: &JobId) -> Result<JobOutcome, StoreError> {
        if let Some(bytes) = read_if_exists(&self.error_path(id)).await? {
            return Ok(match serde_json::from_slice(&bytes) {
                Ok(record) => JobOutcome::Failed(record),
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Corrupted error record");
                    JobOutcome::Failed(corrupted_record(id, "Error record is corrupted"))
                }
            });
        }

        if let Some(bytes) = read_if_exists(&self.result_path(id)).await? {
            return Ok(match serde_json::from_slice(&bytes) {
                Ok(record) => JobOutcome::Completed(record),
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Corrupted result record");
                    JobOutcome::Failed(corrupted_record(id, "Result record is corrupted"))
                }
            });
        }

        Ok(JobOutcome::Pending)
    }

    async fn write_once(&self, id: &JobId, target: &Path, record: &Value) -> Result<(), StoreError> {
        if fs::try_exists(self.error_path(id)).await? || fs::try_exists(self.result_path(id)).await? {
            return Err(StoreError::AlreadyTerminal(id.to_string()));
        }

        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.dir.join(format!(".{id}.{}.tmp", Uuid::new_v4().simple()));

        let written = write_synced(&tmp, &bytes).await;
        let published = match written {
            Ok(()) => fs::hard_link(&tmp, target).await,
            Err(e) => Err(e),
        };
        let _ = fs::remove_file(&tmp).await;

        match published {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyTerminal(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn store() -> (tempfile::TempDir, FsJobStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = FsJobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn unknown_id_is_pending() {
        let (_dir, store) = store();
        let outcome = store.read(&JobId::generate()).await.expect("read");
        assert_eq!(outcome, JobOutcome::Pending);
    }

    #[tokio::test]
    async fn result_round_trips_exactly() {
        let (_dir, store) = store();
        let id = JobId::generate();
        let record = json!({"status": "completed", "job_id": id, "metadata": {"a": 1}});

        store.write_result(&id, &record).await.expect("write");

        let first = store.read(&id).await.expect("read");
        let second = store.read(&id).await.expect("read");
        assert_eq!(first, JobOutcome::Completed(record));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn error_record_is_failed_and_blocks_result() {
        let (_dir, store) = store();
        let id = JobId::generate();
        let record = json!({"status": "failed", "step": "run_meta"});

        store.write_error(&id, &record).await.expect("write");
        assert_eq!(store.read(&id).await.expect("read"), JobOutcome::Failed(record));

        let second = store.write_result(&id, &json!({"status": "completed"})).await;
        assert_matches!(second, Err(StoreError::AlreadyTerminal(_)));
        assert!(!store.result_path(&id).exists());
    }

    #[tokio::test]
    async fn records_are_never_overwritten() {
        let (_dir, store) = store();
        let id = JobId::generate();
        store
            .write_result(&id, &json!({"v": 1}))
            .await
            .expect("first write");

        let again = store.write_result(&id, &json!({"v": 2})).await;
        assert_matches!(again, Err(StoreError::AlreadyTerminal(_)));
        assert_eq!(
            store.read(&id).await.expect("read"),
            JobOutcome::Completed(json!({"v": 1}))
        );
    }

    #[tokio::test]
    async fn error_takes_precedence_when_both_exist() {
        let (_dir, store) = store();
        let id = JobId::generate();
        std::fs::write(store.result_path(&id), r#"{"status":"completed"}"#).expect("seed");
        std::fs::write(store.error_path(&id), r#"{"status":"failed"}"#).expect("seed");

        assert_eq!(
            store.read(&id).await.expect("read"),
            JobOutcome::Failed(json!({"status": "failed"}))
        );
    }

    #[tokio::test]
    async fn corrupted_result_reads_as_failed() {
        let (_dir, store) = store();
        let id = JobId::generate();
        std::fs::write(store.result_path(&id), "{not json").expect("seed");

        let outcome = store.read(&id).await.expect("read");
        assert_matches!(outcome, JobOutcome::Failed(ref body)
            if body["error"].as_str().is_some_and(|m| m.contains("corrupted")));
    }

    #[tokio::test]
    async fn corrupted_error_reads_as_failed() {
        let (_dir, store) = store();
        let id = JobId::generate();
        std::fs::write(store.error_path(&id), "").expect("seed");

        let outcome = store.read(&id).await.expect("read");
        assert_matches!(outcome, JobOutcome::Failed(ref body)
            if body["error"] == "Error record is corrupted" && body["status"] == "failed");
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let (dir, store) = store();
        let id = JobId::generate();
        store.write_result(&id, &json!({})).await.expect("write");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{id}.json")]);
    }

    #[tokio::test]
    async fn init_creates_nested_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = FsJobStore::new(dir.path().join("a/b/results"));
        store.init().await.expect("init");
        assert!(store.dir().is_dir());
    }
}

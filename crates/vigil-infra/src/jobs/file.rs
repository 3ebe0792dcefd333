//! File-backed job status store: one JSON document per job.
//!
//! Records are rewritten whole through a temporary file in the same directory
//! that is renamed over the target, so a reader sees either the previous or
//! the next complete document. Reads and writes are still retried a bounded
//! number of times to ride out transient I/O failures and external writers
//! that do not follow the same discipline.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use vigil_core::domain::{Job, JobId, JobStatus, MAX_STATUS_MESSAGE_CHARS};
use vigil_core::ports::{JobStatusStore, JobStoreError};

/// File job store configuration.
#[derive(Debug, Clone)]
pub struct FileJobStoreConfig {
    /// Directory holding `<job_id>.json` records.
    pub dir: PathBuf,
    /// Attempts per read or update before giving up.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Status messages are cut to this many characters.
    pub max_message_chars: usize,
}

impl Default for FileJobStoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/jobs"),
            max_attempts: 5,
            retry_delay: Duration::from_millis(500),
            max_message_chars: MAX_STATUS_MESSAGE_CHARS,
        }
    }
}

impl FileJobStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        Self {
            dir: Path::new(&data_dir).join("jobs"),
            max_attempts: std::env::var("JOB_STATUS_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(5),
            retry_delay: Duration::from_millis(
                std::env::var("JOB_STATUS_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            max_message_chars: MAX_STATUS_MESSAGE_CHARS,
        }
    }
}

/// Job status store keeping each job in its own JSON file.
pub struct FileJobStatusStore {
    config: FileJobStoreConfig,
}

impl FileJobStatusStore {
    pub fn new(config: FileJobStoreConfig) -> Result<Self, JobStoreError> {
        std::fs::create_dir_all(&config.dir).map_err(|e| {
            JobStoreError::Io(format!("creating {}: {}", config.dir.display(), e))
        })?;

        tracing::info!(dir = %config.dir.display(), "Job status store ready");

        Ok(Self { config })
    }

    /// Create from environment configuration.
    pub fn from_env() -> Result<Self, JobStoreError> {
        Self::new(FileJobStoreConfig::from_env())
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Location of the record for `job_id`.
    pub fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.config.dir.join(format!("{}.json", job_id))
    }

    async fn load(path: &Path) -> Result<Option<Job>, JobStoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JobStoreError::Io(e.to_string())),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| JobStoreError::Malformed(e.to_string()))
    }

    async fn write(&self, path: &Path, job: &Job, overwrite: bool) -> Result<(), JobStoreError> {
        let bytes =
            serde_json::to_vec_pretty(job).map_err(|e| JobStoreError::Malformed(e.to_string()))?;
        let dir = self.config.dir.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || write_replace(&dir, &path, &bytes, overwrite))
            .await
            .map_err(|e| JobStoreError::Io(e.to_string()))?
    }

    async fn try_update(
        &self,
        path: &Path,
        status: JobStatus,
        message: &str,
    ) -> Result<UpdateOutcome, JobStoreError> {
        let mut job = match Self::load(path).await? {
            Some(job) => job,
            None => return Ok(UpdateOutcome::Missing),
        };

        if let Err(e) = job.apply_status(status, message, self.config.max_message_chars) {
            return Ok(UpdateOutcome::Rejected(e.to_string()));
        }

        self.write(path, &job, true).await?;
        Ok(UpdateOutcome::Written)
    }
}

enum UpdateOutcome {
    Written,
    Missing,
    Rejected(String),
}

/// Write `bytes` to a temp file next to `path` and rename it into place.
fn write_replace(
    dir: &Path,
    path: &Path,
    bytes: &[u8],
    overwrite: bool,
) -> Result<(), JobStoreError> {
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| JobStoreError::Io(e.to_string()))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| JobStoreError::Io(e.to_string()))?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };

    match persisted {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Err(JobStoreError::AlreadyExists(
            path.display().to_string(),
        )),
        Err(e) => Err(JobStoreError::Io(e.error.to_string())),
    }
}

#[async_trait]
impl JobStatusStore for FileJobStatusStore {
    async fn create(&self, job_id: &JobId, job: &Job) -> Result<(), JobStoreError> {
        let path = self.path_for(job_id);

        self.write(&path, job, false).await.map_err(|e| match e {
            JobStoreError::AlreadyExists(_) => JobStoreError::AlreadyExists(job_id.to_string()),
            other => other,
        })?;

        tracing::debug!(job_id = %job_id, status = %job.status, "Job record created");
        Ok(())
    }

    async fn update(&self, job_id: &str, status: JobStatus, message: &str) {
        let job_id = match JobId::parse(job_id) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "Refusing status update");
                return;
            }
        };
        let path = self.path_for(&job_id);
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.try_update(&path, status, message).await {
                Ok(UpdateOutcome::Written) => {
                    tracing::debug!(
                        job_id = %job_id,
                        status = %status,
                        attempt,
                        "Job status updated"
                    );
                    return;
                }
                Ok(UpdateOutcome::Missing) => {
                    tracing::error!(
                        job_id = %job_id,
                        status = %status,
                        "Job record not found, status not updated"
                    );
                    return;
                }
                Ok(UpdateOutcome::Rejected(reason)) => {
                    tracing::warn!(job_id = %job_id, reason = %reason, "Status update ignored");
                    return;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Job status update failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        status = %status,
                        attempts,
                        error = %e,
                        "Job status update failed after max retries"
                    );
                }
            }
        }
    }

    async fn read(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
        let job_id =
            JobId::parse(job_id).map_err(|_| JobStoreError::InvalidId(job_id.to_string()))?;
        let path = self.path_for(&job_id);
        let attempts = self.config.max_attempts.max(1);

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match Self::load(&path).await {
                Ok(job) => return Ok(job),
                Err(e) => {
                    tracing::debug!(job_id = %job_id, attempt, error = %e, "Job read failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(JobStoreError::RetriesExhausted {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_store(dir: &Path) -> FileJobStatusStore {
        FileJobStatusStore::new(FileJobStoreConfig {
            dir: dir.to_path_buf(),
            max_attempts: 5,
            retry_delay: Duration::from_millis(50),
            max_message_chars: MAX_STATUS_MESSAGE_CHARS,
        })
        .unwrap()
    }

    async fn seed(store: &FileJobStatusStore, raw: &str) -> JobId {
        let id = JobId::generate();
        tokio::fs::write(store.path_for(&id), raw).await.unwrap();
        id
    }

    fn raw_record(store: &FileJobStatusStore, id: &JobId) -> serde_json::Value {
        let content = std::fs::read_to_string(store.path_for(id)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_update_then_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = seed(&store, r#"{"status": "pending"}"#).await;

        store.update(id.as_str(), JobStatus::Running, "started").await;

        let job = store.read(id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.status_message.as_deref(), Some("started"));
    }

    #[tokio::test]
    async fn test_empty_message_removes_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = seed(&store, r#"{"status": "pending"}"#).await;

        store.update(id.as_str(), JobStatus::Running, "started").await;
        store.update(id.as_str(), JobStatus::Running, "").await;

        let raw = raw_record(&store, &id);
        assert_eq!(raw["status"], "running");
        assert!(raw.get("status_message").is_none());
    }

    #[tokio::test]
    async fn test_missing_job_is_not_created() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = JobId::generate();

        store.update(id.as_str(), JobStatus::Running, "started").await;

        assert!(!store.path_for(&id).exists());
        assert!(store.read(id.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_id_is_ignored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());

        store.update("../escape", JobStatus::Failed, "nope").await;

        assert!(!temp_dir.path().parent().unwrap().join("escape.json").exists());
        assert!(matches!(
            store.read("../escape").await,
            Err(JobStoreError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_long_failure_message_is_truncated() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = seed(&store, r#"{"status": "pending"}"#).await;

        store
            .update(id.as_str(), JobStatus::Failed, &"boom".repeat(1000))
            .await;

        let job = store.read(id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let message = job.status_message.unwrap();
        assert!(message.chars().count() <= 1000);
        assert!(message.starts_with("boomboom"));
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = seed(&store, r#"{"status": "complete"}"#).await;

        store.update(id.as_str(), JobStatus::Running, "again").await;

        let job = store.read(id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Complete);
        assert!(job.status_message.is_none());
    }

    #[tokio::test]
    async fn test_foreign_fields_are_preserved() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = seed(
            &store,
            r#"{"status": "pending", "target": "model-a", "probes": ["dan", "encoding"]}"#,
        )
        .await;

        store.update(id.as_str(), JobStatus::Running, "started").await;

        let raw = raw_record(&store, &id);
        assert_eq!(raw["target"], "model-a");
        assert_eq!(raw["probes"][1], "encoding");
        assert!(raw.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn test_create_refuses_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = JobId::generate();
        let job = Job::pending().with_field("target", "model-a");

        store.create(&id, &job).await.unwrap();
        let err = store.create(&id, &Job::pending()).await.unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyExists(_)));

        let stored = store.read(id.as_str()).await.unwrap().unwrap();
        assert_eq!(stored.extra["target"], "model-a");
    }

    #[tokio::test]
    async fn test_corrupt_record_gives_up_without_panicking() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileJobStatusStore::new(FileJobStoreConfig {
            dir: temp_dir.path().to_path_buf(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
            max_message_chars: MAX_STATUS_MESSAGE_CHARS,
        })
        .unwrap();
        let id = seed(&store, r#"{"status": "pend"#).await;

        store.update(id.as_str(), JobStatus::Running, "started").await;

        let content = std::fs::read_to_string(store.path_for(&id)).unwrap();
        assert_eq!(content, r#"{"status": "pend"#);
        assert!(matches!(
            store.read(id.as_str()).await,
            Err(JobStoreError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_recovers_from_transient_corruption() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = test_store(temp_dir.path());
        let id = seed(&store, r#"{"status": "pend"#).await;

        let path = store.path_for(&id);
        let dir = temp_dir.path().to_path_buf();
        let fixer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            write_replace(&dir, &path, br#"{"status": "pending"}"#, true).unwrap();
        });

        store.update(id.as_str(), JobStatus::Running, "started").await;
        fixer.await.unwrap();

        let job = store.read(id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.status_message.as_deref(), Some("started"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_never_expose_partial_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(test_store(temp_dir.path()));
        let id = seed(&store, r#"{"status": "pending"}"#).await;

        let mut writers = Vec::new();
        for writer in 0..2 {
            let store = store.clone();
            let id = id.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..50 {
                    let message = format!("writer {} step {}", writer, i);
                    store.update(id.as_str(), JobStatus::Running, &message).await;
                }
            }));
        }

        let reader = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let job = store.read(id.as_str()).await.unwrap();
                    assert!(job.is_some());
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        let job = store.read(id.as_str()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.status_message.unwrap().starts_with("writer "));
    }
}

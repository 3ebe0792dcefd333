//! Job status port - durable per-job status records.

use async_trait::async_trait;

use crate::domain::{Job, JobId, JobStatus};

/// Job status store trait - abstraction over where job records live.
///
/// The runner and the polling endpoint may live in different processes, so
/// the store is the only channel between them.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Persist the initial record for a newly submitted job.
    ///
    /// Fails with [`JobStoreError::AlreadyExists`] instead of overwriting.
    async fn create(&self, job_id: &JobId, job: &Job) -> Result<(), JobStoreError>;

    /// Move a job to `status`, replacing or clearing its status message.
    ///
    /// Never fails: a missing record, an illegal transition or exhausted
    /// retries are logged and the call returns normally so that the caller's
    /// control flow is not interrupted by bookkeeping.
    async fn update(&self, job_id: &str, status: JobStatus, message: &str);

    /// Load the current record, or `None` if the job does not exist.
    async fn read(&self, job_id: &str) -> Result<Option<Job>, JobStoreError>;
}

/// Job store errors.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Invalid job id: {0:?}")]
    InvalidId(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Malformed job record: {0}")]
    Malformed(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

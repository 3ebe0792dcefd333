use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DomainError;

/// Upper bound on a persisted status message, in characters.
pub const MAX_STATUS_MESSAGE_CHARS: usize = 1000;

/// Lifecycle of a background scan.
///
/// `Complete` and `Failed` are terminal: once a job reaches either, its status
/// never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether a job currently in `self` may be moved to `next`.
    ///
    /// Re-entering the same non-terminal status is allowed so that a runner
    /// can replace or clear its progress message.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (JobStatus::Running, JobStatus::Pending) => false,
            _ => true,
        }
    }

    pub fn transition_to(&self, next: JobStatus) -> Result<JobStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::IllegalTransition { from: *self, to: next })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Identifier of a job, safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate an externally supplied id.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted, which keeps the id
    /// from escaping the job directory.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(DomainError::InvalidJobId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Persisted job record.
///
/// The store owns `status`, `status_message` and `updated_at`. Everything
/// else written by the submitter lands in `extra` and is carried through
/// updates untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// A freshly submitted job.
    pub fn pending() -> Self {
        let now = Utc::now();
        Self {
            status: JobStatus::Pending,
            status_message: None,
            created_at: Some(now),
            updated_at: Some(now),
            extra: Map::new(),
        }
    }

    /// Attach a submitter-owned field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Apply a status change.
    ///
    /// An empty message removes `status_message` entirely; a non-empty one is
    /// stored after truncation to `max_message_chars`.
    pub fn apply_status(
        &mut self,
        status: JobStatus,
        message: &str,
        max_message_chars: usize,
    ) -> Result<(), DomainError> {
        self.status = self.status.transition_to(status)?;
        self.status_message = if message.is_empty() {
            None
        } else {
            Some(truncate_message(message, max_message_chars).to_string())
        };
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}

/// Cut `message` to at most `max_chars` characters on a char boundary.
pub fn truncate_message(message: &str, max_chars: usize) -> &str {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_reject_transitions() {
        assert!(!JobStatus::Complete.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Complete));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Complete,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_id_rejects_path_components() {
        assert!(JobId::parse("abc-123_DEF").is_ok());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("../etc/passwd").is_err());
        assert!(JobId::parse("a/b").is_err());
        assert!(JobId::parse("job.json").is_err());
    }

    #[test]
    fn test_generated_id_is_valid() {
        let id = JobId::generate();
        assert!(JobId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_empty_message_removes_field() {
        let mut job = Job::pending();
        job.apply_status(JobStatus::Running, "started", MAX_STATUS_MESSAGE_CHARS)
            .unwrap();
        assert_eq!(job.status_message.as_deref(), Some("started"));

        job.apply_status(JobStatus::Running, "", MAX_STATUS_MESSAGE_CHARS)
            .unwrap();
        assert!(job.status_message.is_none());

        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("status_message").is_none());
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_message("héllo", 2), "hé");
        assert_eq!(truncate_message("short", 100), "short");
        let long = "boom".repeat(1000);
        assert_eq!(truncate_message(&long, 1000).chars().count(), 1000);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = r#"{"status":"pending","target":"gpt-x","probes":["dan"]}"#;
        let job: Job = serde_json::from_str(raw).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.extra["target"], "gpt-x");

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["probes"][0], "dan");
    }
}

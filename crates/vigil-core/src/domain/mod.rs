//! Domain entities - the core business objects.

mod job;

pub use job::{Job, JobId, JobStatus, MAX_STATUS_MESSAGE_CHARS, truncate_message};

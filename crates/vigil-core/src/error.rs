//! Domain-level error types.

use thiserror::Error;

use crate::domain::JobStatus;

/// Domain errors - business rule violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

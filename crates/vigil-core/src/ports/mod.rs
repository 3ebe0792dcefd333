//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod job_status;
mod rate_limit;

pub use job_status::{JobStatusStore, JobStoreError};
pub use rate_limit::{RateLimitCheck, RateLimitError, RateLimitResult, RateLimitStore, WindowCount};

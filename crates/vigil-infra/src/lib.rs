//! # Vigil Infrastructure
//!
//! Concrete implementations of the ports defined in `vigil-core`: the rate
//! limit stores with their fail-open limiter, and the file-backed job status
//! store.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external services, in-process rate limiting only
//! - `redis` - Redis-backed shared rate limit counters

pub mod jobs;
pub mod rate_limit;

// Re-exports - always available
pub use jobs::{FileJobStatusStore, FileJobStoreConfig};
pub use rate_limit::{InMemoryRateLimitStore, RateLimiter};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisRateLimitConfig, RedisRateLimitStore};

//! Application state - shared across all handlers.

use std::sync::Arc;

use vigil_core::ports::JobStatusStore;
use vigil_infra::{FileJobStatusStore, RateLimiter};

use crate::background::ScanRunner;
use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub jobs: Arc<dyn JobStatusStore>,
    pub runner: Arc<ScanRunner>,
}

impl AppState {
    /// Assemble state from already-built parts.
    pub fn from_parts(
        limiter: Arc<RateLimiter>,
        jobs: Arc<dyn JobStatusStore>,
        runner: Arc<ScanRunner>,
    ) -> Self {
        Self {
            limiter,
            jobs,
            runner,
        }
    }

    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        #[cfg(feature = "redis")]
        let limiter = RateLimiter::with_redis(config.redis.clone()).await;

        #[cfg(not(feature = "redis"))]
        let limiter = {
            tracing::info!("Running without redis feature - rate limits are per-process");
            RateLimiter::in_memory()
        };

        let jobs: Arc<dyn JobStatusStore> = Arc::new(FileJobStatusStore::new(config.jobs.clone())?);
        let runner = Arc::new(ScanRunner::new(config.scan.clone(), jobs.clone()));

        tracing::info!(
            rate_limit_backend = limiter.backend(),
            job_dir = %config.jobs.dir.display(),
            "Application state initialized"
        );

        Ok(Self::from_parts(Arc::new(limiter), jobs, runner))
    }
}

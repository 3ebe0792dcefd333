//! Fail-open rate limiter: shared store first, process-local counts second.

use std::sync::Arc;

use vigil_core::ports::{RateLimitCheck, RateLimitResult, RateLimitStore};

use super::memory::InMemoryRateLimitStore;

/// Per-client fixed-window rate limiter.
///
/// Construct one per process and hand it to request handlers. Every check
/// first goes to the shared `primary` store; if that store errors or times out
/// the request is counted in the owned in-memory `fallback` instead. No error
/// ever reaches the caller.
pub struct RateLimiter {
    primary: Option<Arc<dyn RateLimitStore>>,
    fallback: Arc<InMemoryRateLimitStore>,
}

impl RateLimiter {
    pub fn new(
        primary: Option<Arc<dyn RateLimitStore>>,
        fallback: Arc<InMemoryRateLimitStore>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Limiter without a shared store; every result is degraded.
    pub fn in_memory() -> Self {
        Self::new(None, Arc::new(InMemoryRateLimitStore::new()))
    }

    /// Connect to Redis, or run on the in-memory fallback alone if it is
    /// unreachable at startup.
    #[cfg(feature = "redis")]
    pub async fn with_redis(config: super::RedisRateLimitConfig) -> Self {
        match super::RedisRateLimitStore::new(config).await {
            Ok(store) => {
                let primary: Arc<dyn RateLimitStore> = Arc::new(store);
                Self::new(Some(primary), Arc::new(InMemoryRateLimitStore::new()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Redis rate limit store unavailable, using in-memory fallback"
                );
                Self::in_memory()
            }
        }
    }

    /// Name of the backend consulted first.
    pub fn backend(&self) -> &'static str {
        self.primary
            .as_ref()
            .map(|store| store.backend())
            .unwrap_or_else(|| self.fallback.backend())
    }

    pub fn fallback(&self) -> &Arc<InMemoryRateLimitStore> {
        &self.fallback
    }

    /// Count one request for `client_key` and report where the count came from.
    pub async fn check(&self, client_key: &str, limit: u64, window_secs: u64) -> RateLimitCheck {
        if client_key.is_empty() || limit == 0 || window_secs == 0 {
            tracing::debug!(
                client_key,
                limit,
                window_secs,
                "Rate limit parameters out of range, allowing request"
            );
            return RateLimitCheck::Degraded {
                result: RateLimitResult::uncounted(limit, window_secs),
                reason: "invalid rate limit parameters".to_string(),
            };
        }

        let reason = match &self.primary {
            Some(store) => match store.increment(client_key, window_secs).await {
                Ok(count) => {
                    return RateLimitCheck::Authoritative(RateLimitResult::from_count(
                        count,
                        limit,
                        window_secs,
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        backend = store.backend(),
                        error = %e,
                        "Rate limit store unavailable, counting locally"
                    );
                    e.to_string()
                }
            },
            None => "no shared store configured".to_string(),
        };

        let result = match self.fallback.increment(client_key, window_secs).await {
            Ok(count) => RateLimitResult::new(count.count, limit, window_secs, None),
            Err(e) => {
                tracing::error!(error = %e, "In-memory rate limit failed, allowing request");
                RateLimitResult::uncounted(limit, window_secs)
            }
        };

        RateLimitCheck::Degraded { result, reason }
    }

    /// Decide whether `client_key` is over quota.
    ///
    /// Returns `(is_limited, info)`. `info.reset_time` is `None` whenever the
    /// count came from the process-local fallback.
    pub async fn is_rate_limited(
        &self,
        client_key: &str,
        limit: u64,
        window_secs: u64,
    ) -> (bool, RateLimitResult) {
        let result = self.check(client_key, limit, window_secs).await.into_result();
        (result.is_exceeded(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use vigil_core::ports::{RateLimitError, WindowCount};
    use vigil_core::window::ManualClock;

    /// Shared store double that can be switched off mid-test.
    struct SwitchableStore {
        inner: InMemoryRateLimitStore,
        up: AtomicBool,
    }

    #[async_trait]
    impl RateLimitStore for SwitchableStore {
        async fn increment(
            &self,
            key: &str,
            window_secs: u64,
        ) -> Result<WindowCount, RateLimitError> {
            if !self.up.load(Ordering::SeqCst) {
                return Err(RateLimitError::Backend("connection refused".to_string()));
            }
            let count = self.inner.increment(key, window_secs).await?;
            Ok(WindowCount {
                count: count.count,
                reset_time: Some(1_700_000_000),
            })
        }

        fn backend(&self) -> &'static str {
            "switchable"
        }
    }

    /// Shared store that never answers within its operation timeout.
    struct StalledStore {
        op_timeout: std::time::Duration,
    }

    #[async_trait]
    impl RateLimitStore for StalledStore {
        async fn increment(
            &self,
            _key: &str,
            _window_secs: u64,
        ) -> Result<WindowCount, RateLimitError> {
            let reply = tokio::time::sleep(std::time::Duration::from_secs(30));
            tokio::time::timeout(self.op_timeout, reply)
                .await
                .map_err(|_| RateLimitError::Timeout(self.op_timeout.as_millis() as u64))?;
            Ok(WindowCount {
                count: 1,
                reset_time: Some(1_700_000_000),
            })
        }

        fn backend(&self) -> &'static str {
            "stalled"
        }
    }

    fn limiter_with_clock() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(
            None,
            Arc::new(InMemoryRateLimitStore::with_clock(clock.clone())),
        );
        (clock, limiter)
    }

    #[tokio::test]
    async fn test_quota_counts_down_to_zero() {
        let (_clock, limiter) = limiter_with_clock();
        let limit = 5;

        for i in 1..=limit {
            let (limited, info) = limiter.is_rate_limited("client", limit, 60).await;
            assert!(!limited, "call {} should be allowed", i);
            assert_eq!(info.requests, i);
            assert_eq!(info.remaining, limit - i);
        }

        let (limited, info) = limiter.is_rate_limited("client", limit, 60).await;
        assert!(limited);
        assert_eq!(info.remaining, 0);
    }

    #[tokio::test]
    async fn test_window_expiry_restarts_count() {
        let (clock, limiter) = limiter_with_clock();

        for _ in 0..10 {
            limiter.is_rate_limited("client", 3, 30).await;
        }
        clock.advance(Duration::seconds(30));

        let (limited, info) = limiter.is_rate_limited("client", 3, 30).await;
        assert!(!limited);
        assert_eq!(info.requests, 1);
        assert_eq!(info.remaining, 2);
    }

    #[tokio::test]
    async fn test_remaining_stays_within_bounds() {
        let (_clock, limiter) = limiter_with_clock();

        for _ in 0..20 {
            let (_, info) = limiter.is_rate_limited("client", 4, 60).await;
            assert!(info.remaining <= info.limit);
        }
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_open() {
        let limiter = RateLimiter::in_memory();

        let (limited, info) = limiter.is_rate_limited("", 10, 60).await;
        assert!(!limited);
        assert_eq!(info.requests, 0);

        let (limited, info) = limiter.is_rate_limited("client", 0, 60).await;
        assert!(!limited);
        assert_eq!(info.remaining, 0);

        let (limited, _) = limiter.is_rate_limited("client", 10, 0).await;
        assert!(!limited);
        assert_eq!(limiter.fallback().tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_local_counts() {
        let store = Arc::new(SwitchableStore {
            inner: InMemoryRateLimitStore::new(),
            up: AtomicBool::new(true),
        });
        let primary: Arc<dyn RateLimitStore> = store.clone();
        let limiter = RateLimiter::new(Some(primary), Arc::new(InMemoryRateLimitStore::new()));
        assert_eq!(limiter.backend(), "switchable");

        let check = limiter.check("client", 2, 60).await;
        assert!(!check.is_degraded());
        assert_eq!(check.result().reset_time, Some(1_700_000_000));

        store.up.store(false, Ordering::SeqCst);

        let check = limiter.check("client", 2, 60).await;
        assert!(check.is_degraded());
        let result = check.into_result();
        assert_eq!(result.requests, 1);
        assert_eq!(result.limit, 2);
        assert_eq!(result.window, 60);
        assert_eq!(result.remaining, 1);
        assert!(result.reset_time.is_none());

        limiter.is_rate_limited("client", 2, 60).await;
        let (limited, info) = limiter.is_rate_limited("client", 2, 60).await;
        assert!(limited);
        assert_eq!(info.remaining, 0);
    }

    #[tokio::test]
    async fn test_in_memory_limiter_reports_backend() {
        let limiter = RateLimiter::in_memory();
        assert_eq!(limiter.backend(), "memory");
        assert!(limiter.check("client", 1, 1).await.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_degrades_to_local_counts() {
        let primary: Arc<dyn RateLimitStore> = Arc::new(StalledStore {
            op_timeout: std::time::Duration::from_millis(250),
        });
        let limiter = RateLimiter::new(Some(primary), Arc::new(InMemoryRateLimitStore::new()));

        let check = limiter.check("client", 3, 60).await;
        assert!(check.is_degraded());
        let result = check.into_result();
        assert_eq!(result.requests, 1);
        assert_eq!(result.remaining, 2);
        assert!(result.reset_time.is_none());

        let (limited, info) = limiter.is_rate_limited("client", 3, 60).await;
        assert!(!limited);
        assert_eq!(info.requests, 2);
    }

    #[tokio::test]
    async fn test_oversized_window_is_counted_without_panicking() {
        let (clock, limiter) = limiter_with_clock();

        for window in [u64::MAX, 10_000_000_000_000_000] {
            let (limited, info) = limiter.is_rate_limited("client", 10, window).await;
            assert!(!limited);
            assert_eq!(info.window, window);
        }

        let (_, info) = limiter.is_rate_limited("client", 10, u64::MAX).await;
        assert_eq!(info.requests, 3);

        clock.advance(Duration::days(365));
        assert_eq!(limiter.fallback().purge_expired(), 0);
        assert_eq!(limiter.fallback().tracked_keys(), 1);
    }
}

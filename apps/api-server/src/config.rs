//! Application configuration loaded from environment variables.

use std::env;

use vigil_infra::FileJobStoreConfig;
#[cfg(feature = "redis")]
use vigil_infra::RedisRateLimitConfig;

use crate::background::ScanConfig;

/// Quota applied to every `/api` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Key clients by `Forwarded` / `X-Forwarded-For` instead of the socket
    /// peer. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
            trust_proxy_headers: false,
        }
    }
}

impl RateLimitPolicy {
    pub fn from_env() -> Self {
        Self {
            max_requests: env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            trust_proxy_headers: env::var("RATE_LIMIT_TRUST_PROXY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitPolicy,
    pub jobs: FileJobStoreConfig,
    pub scan: ScanConfig,
    #[cfg(feature = "redis")]
    pub redis: RedisRateLimitConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            rate_limit: RateLimitPolicy::from_env(),
            jobs: FileJobStoreConfig::from_env(),
            scan: ScanConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisRateLimitConfig::from_env(),
        }
    }
}

//! Redis rate limit store using an atomic fixed-window counter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use vigil_core::ports::{RateLimitError, RateLimitStore, WindowCount};
use vigil_core::window;

/// Redis rate limit store configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Bound on establishing the initial connection
    pub connect_timeout: Duration,
    /// Bound on a single counter round trip
    pub op_timeout: Duration,
    /// Key prefix for rate limit keys
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_millis(1000),
            op_timeout: Duration::from_millis(250),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisRateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_millis(
                std::env::var("REDIS_CONNECT_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            op_timeout: Duration::from_millis(
                std::env::var("RATE_LIMIT_OP_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
        }
    }
}

// INCR creates the key at 1 when absent; the expiry is set only then so the
// window is anchored at the first request. A key that somehow lost its TTL
// gets it back instead of counting forever.
// Returns: [current_count, ttl_remaining]
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window_secs = tonumber(ARGV[1])

local current = redis.call('INCR', key)
if current == 1 then
    redis.call('EXPIRE', key, window_secs)
end

local ttl = redis.call('TTL', key)
if ttl < 0 then
    redis.call('EXPIRE', key, window_secs)
    ttl = window_secs
end
return {current, ttl}
"#;

/// Redis-backed fixed-window counter shared by every server instance.
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    script: Script,
}

impl RedisRateLimitStore {
    pub async fn new(config: RedisRateLimitConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| RateLimitError::Timeout(config.connect_timeout.as_millis() as u64))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis rate limit store");

        Ok(Self {
            conn,
            config,
            script: Script::new(FIXED_WINDOW_SCRIPT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RedisRateLimitConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        make_key(&self.config.key_prefix, key)
    }
}

fn make_key(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<WindowCount, RateLimitError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let mut invocation = self.script.key(&redis_key);
        invocation.arg(window_secs);

        let result = tokio::time::timeout(
            self.config.op_timeout,
            invocation.invoke_async::<Vec<i64>>(&mut conn),
        )
        .await
        .map_err(|_| RateLimitError::Timeout(self.config.op_timeout.as_millis() as u64))?
        .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let count = result
            .first()
            .copied()
            .ok_or_else(|| RateLimitError::Backend("Empty script reply".to_string()))?;
        let ttl_secs = match result.get(1) {
            Some(ttl) => u64::try_from(*ttl).unwrap_or(0),
            None => window_secs,
        };

        Ok(WindowCount {
            count: count.max(0) as u64,
            reset_time: Some(window::reset_at(Utc::now(), ttl_secs)),
        })
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

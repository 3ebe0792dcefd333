//! Rate limiting port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::window;

/// Counter state reported by a backend after one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests observed in the current window, including this one.
    pub count: u64,
    /// Epoch second at which the window resets, if the backend knows it.
    pub reset_time: Option<i64>,
}

/// Rate limit store trait - a fixed-window counter keyed by client.
///
/// Implementations must make the increment atomic with respect to other
/// callers sharing the same store.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `key` in a window of `window_secs` and return
    /// the updated window state.
    async fn increment(&self, key: &str, window_secs: u64) -> Result<WindowCount, RateLimitError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Usage metadata for one rate limit decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub requests: u64,
    pub limit: u64,
    pub window: u64,
    pub remaining: u64,
    pub reset_time: Option<i64>,
}

impl RateLimitResult {
    pub fn new(requests: u64, limit: u64, window: u64, reset_time: Option<i64>) -> Self {
        Self {
            requests,
            limit,
            window,
            remaining: window::remaining(limit, requests),
            reset_time,
        }
    }

    /// Result for a request that was not counted at all.
    pub fn uncounted(limit: u64, window: u64) -> Self {
        Self::new(0, limit, window, None)
    }

    pub fn from_count(count: WindowCount, limit: u64, window: u64) -> Self {
        Self::new(count.count, limit, window, count.reset_time)
    }

    pub fn is_exceeded(&self) -> bool {
        self.requests > self.limit
    }
}

/// Outcome of a check, tagged with whether the shared store answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitCheck {
    /// The shared store counted the request.
    Authoritative(RateLimitResult),
    /// The shared store was unavailable and the process-local count was used.
    Degraded {
        result: RateLimitResult,
        reason: String,
    },
}

impl RateLimitCheck {
    pub fn result(&self) -> &RateLimitResult {
        match self {
            RateLimitCheck::Authoritative(result) => result,
            RateLimitCheck::Degraded { result, .. } => result,
        }
    }

    pub fn into_result(self) -> RateLimitResult {
        match self {
            RateLimitCheck::Authoritative(result) => result,
            RateLimitCheck::Degraded { result, .. } => result,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RateLimitCheck::Degraded { .. })
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend timed out after {0}ms")]
    Timeout(u64),
}

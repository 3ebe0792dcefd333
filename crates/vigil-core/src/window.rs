//! Time and fixed-window arithmetic shared by the rate limit backends.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of the current time.
///
/// Backends read time through this trait so that window expiry can be driven
/// deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// True once `window_secs` have fully elapsed since `window_start`.
///
/// Windows too long for a `Duration` never expire.
pub fn window_expired(now: DateTime<Utc>, window_start: DateTime<Utc>, window_secs: u64) -> bool {
    let window = i64::try_from(window_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    now.signed_duration_since(window_start) >= window
}

/// Quota left after `requests`, never negative.
pub fn remaining(limit: u64, requests: u64) -> u64 {
    limit.saturating_sub(requests)
}

/// Epoch second at which a window with `ttl_secs` left will reset.
pub fn reset_at(now: DateTime<Utc>, ttl_secs: u64) -> i64 {
    now.timestamp()
        .saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
}

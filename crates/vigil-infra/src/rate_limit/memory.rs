//! In-memory fixed-window rate limit store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vigil_core::ports::{RateLimitError, RateLimitStore, WindowCount};
use vigil_core::window::{self, Clock, SystemClock};

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    window_start: DateTime<Utc>,
    window_secs: u64,
    count: u64,
}

/// Process-local fixed-window counters keyed by client.
///
/// This is the fallback when Redis is not available.
/// Note: Counts are per-process, not shared across instances, so the reset
/// time is never reported (`reset_time` is always `None`).
pub struct InMemoryRateLimitStore {
    windows: Mutex<HashMap<String, WindowRecord>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowRecord>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop every record whose window has already elapsed.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, rec| !window::window_expired(now, rec.window_start, rec.window_secs));
        before - windows.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<WindowCount, RateLimitError> {
        let now = self.clock.now();
        let mut windows = self.lock();

        let record = windows.entry(key.to_string()).or_insert(WindowRecord {
            window_start: now,
            window_secs,
            count: 0,
        });

        if window::window_expired(now, record.window_start, window_secs) {
            record.window_start = now;
            record.count = 0;
        }
        record.window_secs = window_secs;
        record.count = record.count.saturating_add(1);

        Ok(WindowCount {
            count: record.count,
            reset_time: None,
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

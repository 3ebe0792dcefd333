//! Rate limiting implementations.

mod limiter;
mod memory;

pub use limiter::RateLimiter;
pub use memory::InMemoryRateLimitStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisRateLimitConfig, RedisRateLimitStore};

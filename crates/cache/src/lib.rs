//! Key-value cache shared by the revocation store and the rate limiter.

pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use std::time::Duration;

use app_error::AppResult;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Operations every cache backend must provide. Each call is atomic on its own
/// key; failures surface as `AppError::DependencyUnavailable`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Increment the counter at `key` and return the new value. The TTL is
    /// attached only when the increment created the key.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> AppResult<i64>;

    async fn exists(&self, key: &str) -> AppResult<bool>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Read and remove `key` in one step. Of two concurrent callers at most
    /// one receives the value.
    async fn take(&self, key: &str) -> AppResult<Option<String>>;
}

/// Joins the configured namespace and a logical key.
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

// Redis rejects a zero expiry
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_optional() {
        assert_eq!(prefixed_key("auth", "jwt:blacklist:1"), "auth:jwt:blacklist:1");
        assert_eq!(prefixed_key("", "jwt:blacklist:1"), "jwt:blacklist:1");
    }

    #[test]
    fn sub_second_ttl_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_millis(200)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(900)), 900);
    }
}

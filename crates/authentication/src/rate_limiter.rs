use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use app_cache::Cache;
use app_config::RateLimitingConfig;
use app_error::{AppError, AppResult};
use app_utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u64 },
    Denied { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Fixed-window limiter over cache counters, shared by every instance using
/// the same cache.
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    config: RateLimitingConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>, clock: Arc<dyn Clock>, config: RateLimitingConfig) -> Self {
        Self {
            cache,
            clock,
            config,
        }
    }

    /// Count one attempt of `action` by `key` against the configured limit.
    pub async fn try_acquire(&self, key: &str, action: &str) -> AppResult<RateDecision> {
        let settings = self.config.for_action(action).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "No rate limit configured for action '{}'",
                action
            ))
        })?;

        self.try_acquire_with(
            key,
            action,
            settings.max_attempts,
            Duration::from_secs(settings.window_secs),
        )
        .await
    }

    /// Like `try_acquire` with an explicit limit. Denied attempts are counted
    /// as well, so hammering a closed window does not reopen it early.
    pub async fn try_acquire_with(
        &self,
        key: &str,
        action: &str,
        limit: u64,
        window: Duration,
    ) -> AppResult<RateDecision> {
        let window_secs = window.as_secs().max(1) as i64;
        let now = self.clock.timestamp();
        let bucket = now.div_euclid(window_secs);
        let counter_key = format!("ratelimit:{}:{}:{}", action, key, bucket);

        let count = match self.cache.incr_with_expiry(&counter_key, window).await {
            Ok(count) => count.max(0) as u64,
            Err(e) if self.config.fail_open => {
                warn!(action, error = %e, "rate limiter unavailable, allowing request");
                return Ok(RateDecision::Allowed { remaining: limit });
            }
            Err(e) => return Err(e),
        };

        if count > limit {
            let retry_after_secs = ((bucket + 1) * window_secs - now).max(1) as u64;
            warn!(action, key, count, limit, retry_after_secs, "rate limit exceeded");
            return Ok(RateDecision::Denied { retry_after_secs });
        }

        debug!(action, key, count, limit, "rate limit check passed");
        Ok(RateDecision::Allowed {
            remaining: limit - count,
        })
    }

    /// `try_acquire` turned into a `RateLimited` error on denial.
    pub async fn enforce(&self, key: &str, action: &str) -> AppResult<()> {
        match self.try_acquire(key, action).await? {
            RateDecision::Allowed { .. } => Ok(()),
            RateDecision::Denied { retry_after_secs } => {
                Err(AppError::RateLimited { retry_after_secs })
            }
        }
    }
}

use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use app_cache::Cache;
use app_error::AppResult;
use app_models::Claims;
use app_utils::Clock;

const BLACKLIST_PREFIX: &str = "jwt:blacklist:";

/// Cache-backed record of tokens invalidated before their natural expiry.
/// Entries carry a TTL so nothing outlives the token it refers to.
pub struct RevocationStore {
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    leeway_secs: i64,
}

impl RevocationStore {
    /// `leeway_secs` must match the validator's expiry tolerance, so an entry
    /// lives exactly as long as the token can still pass validation.
    pub fn new(cache: Arc<dyn Cache>, clock: Arc<dyn Clock>, leeway_secs: u64) -> Self {
        Self {
            cache,
            clock,
            leeway_secs: leeway_secs as i64,
        }
    }

    fn blacklist_key(jti: &str) -> String {
        format!("{}{}", BLACKLIST_PREFIX, jti)
    }

    /// Blacklist one token. Returns `false` when the token can no longer be
    /// accepted anyway and nothing was written.
    pub async fn revoke(&self, claims: &Claims) -> AppResult<bool> {
        let remaining = claims.remaining_secs(self.clock.timestamp()) + self.leeway_secs;
        if remaining <= 0 {
            debug!(jti = %claims.jti, "token already expired, nothing to revoke");
            return Ok(false);
        }

        self.cache
            .set(
                &Self::blacklist_key(&claims.jti),
                "1",
                Duration::from_secs(remaining as u64),
            )
            .await?;
        info!(jti = %claims.jti, sub = %claims.sub, kind = %claims.kind, ttl_secs = remaining, "token revoked");
        Ok(true)
    }

    pub async fn is_revoked(&self, jti: &str) -> AppResult<bool> {
        self.cache.exists(&Self::blacklist_key(jti)).await
    }
}

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult, Script, aio::ConnectionManager};
use std::{future::Future, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use app_config::CacheConfig;
use app_error::{AppError, AppErrorExt, AppResult};

use crate::{Cache, prefixed_key, ttl_secs};

// INCR and the first EXPIRE must happen as one step, otherwise a crash in
// between leaves a counter that never expires.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Redis-backed cache shared by every service instance.
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
    operation_timeout: Duration,
    incr_script: Script,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.url.as_str()).dependency_err("redis")?;

        if config.url.starts_with("rediss://") {
            info!("Using secure TLS connection to cache");
        } else {
            warn!("Using non-secure cache connection");
        }

        let conn = timeout(config.connection_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| AppError::timeout("redis", "connect"))?
            .dependency_err("redis")?;

        info!(prefix = %config.prefix, "Connected to redis cache");

        Ok(Self {
            conn,
            prefix: config.prefix.clone(),
            operation_timeout: config.operation_timeout(),
            incr_script: Script::new(INCR_WITH_EXPIRY),
        })
    }

    fn key(&self, key: &str) -> String {
        prefixed_key(&self.prefix, key)
    }

    // Bounds every round trip by the configured operation timeout
    async fn run<T, F>(&self, operation: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.operation_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                warn!(operation, error = %e, "redis command failed");
                AppError::dependency("redis", e)
            }),
            Err(_) => {
                warn!(operation, "redis command timed out");
                Err(AppError::timeout("redis", operation))
            }
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        self.run("get", async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let secs = ttl_secs(ttl);
        debug!(key = %key, ttl_secs = secs, "cache set");
        self.run("set", async move { conn.set_ex::<_, _, ()>(key, value, secs).await })
            .await
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> AppResult<i64> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let secs = ttl_secs(ttl);
        let script = &self.incr_script;
        self.run("incr", async move {
            let count: i64 = script.key(key).arg(secs).invoke_async(&mut conn).await?;
            Ok(count)
        })
        .await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        self.run("exists", async move { conn.exists::<_, bool>(key).await })
            .await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        self.run("delete", async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn take(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        self.run("getdel", async move { conn.get_del::<_, Option<String>>(key).await })
            .await
    }
}

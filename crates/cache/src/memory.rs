use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::RwLock;

use app_error::{AppError, AppResult};
use app_utils::{Clock, SystemClock};

use crate::{Cache, ttl_secs};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Single-process cache with clock-driven expiry. Suitable for development and
/// tests; it is not shared between instances.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every following call fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining TTL of a key in whole seconds.
    pub async fn ttl(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| (e.expires_at - now).num_seconds())
    }

    fn check_available(&self, operation: &str) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::dependency(
                "memory-cache",
                format!("backend unavailable during '{}'", operation),
            ));
        }
        Ok(())
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::seconds(ttl_secs(ttl) as i64)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check_available("get")?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.check_available("set")?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: self.expiry(ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> AppResult<i64> {
        self.check_available("incr")?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let current = match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.clone()),
            _ => None,
        };

        let (count, expires_at) = match current {
            Some(entry) => {
                let count = entry.value.parse::<i64>().map_err(|_| {
                    AppError::dependency("memory-cache", "value is not an integer")
                })?;
                (count + 1, entry.expires_at)
            }
            None => (1, self.expiry(ttl)),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check_available("delete")?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> AppResult<Option<String>> {
        self.check_available("take")?;
        let now = self.clock.now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value))
    }
}

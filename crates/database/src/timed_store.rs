use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::timeout;

use app_error::{AppError, AppResult};
use app_models::CredentialRecord;

use crate::UserStore;

/// Bounds the latency of every call on the wrapped store. An elapsed call is
/// reported as `DependencyUnavailable`.
pub struct TimedUserStore {
    inner: Arc<dyn UserStore>,
    operation_timeout: Duration,
}

impl TimedUserStore {
    pub fn new(inner: Arc<dyn UserStore>, operation_timeout: Duration) -> Self {
        Self {
            inner,
            operation_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = AppResult<T>> + Send,
    ) -> AppResult<T> {
        match timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(operation, "user store call timed out");
                Err(AppError::timeout("user-store", operation))
            }
        }
    }
}

#[async_trait]
impl UserStore for TimedUserStore {
    async fn get_credential_record(&self, username: &str) -> AppResult<Option<CredentialRecord>> {
        self.bounded("get_credential_record", self.inner.get_credential_record(username))
            .await
    }

    async fn get_credential_record_by_id(&self, id: &str) -> AppResult<Option<CredentialRecord>> {
        self.bounded(
            "get_credential_record_by_id",
            self.inner.get_credential_record_by_id(id),
        )
        .await
    }

    async fn update_attempts(
        &self,
        username: &str,
        failed_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        self.bounded(
            "update_attempts",
            self.inner
                .update_attempts(username, failed_attempts, locked_until),
        )
        .await
    }

    async fn lock_account(&self, username: &str, locked_until: DateTime<Utc>) -> AppResult<()> {
        self.bounded("lock_account", self.inner.lock_account(username, locked_until))
            .await
    }

    async fn clear_lockout(&self, username: &str) -> AppResult<()> {
        self.bounded("clear_lockout", self.inner.clear_lockout(username))
            .await
    }

    async fn clear_expired_lockout(
        &self,
        username: &str,
        observed_until: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.bounded(
            "clear_expired_lockout",
            self.inner.clear_expired_lockout(username, observed_until),
        )
        .await
    }

    async fn increment_failed_attempts(&self, username: &str) -> AppResult<u32> {
        self.bounded(
            "increment_failed_attempts",
            self.inner.increment_failed_attempts(username),
        )
        .await
    }

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> AppResult<()> {
        self.bounded(
            "update_password_hash",
            self.inner.update_password_hash(username, password_hash),
        )
        .await
    }

    async fn increment_token_version(&self, username: &str) -> AppResult<u32> {
        self.bounded(
            "increment_token_version",
            self.inner.increment_token_version(username),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryUserStore;

    struct StalledStore;

    #[async_trait]
    impl UserStore for StalledStore {
        async fn get_credential_record(&self, _: &str) -> AppResult<Option<CredentialRecord>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn get_credential_record_by_id(&self, _: &str) -> AppResult<Option<CredentialRecord>> {
            Ok(None)
        }

        async fn update_attempts(
            &self,
            _: &str,
            _: u32,
            _: Option<DateTime<Utc>>,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn lock_account(&self, _: &str, _: DateTime<Utc>) -> AppResult<()> {
            Ok(())
        }

        async fn clear_lockout(&self, _: &str) -> AppResult<()> {
            Ok(())
        }

        async fn increment_failed_attempts(&self, _: &str) -> AppResult<u32> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        }

        async fn clear_expired_lockout(&self, _: &str, _: DateTime<Utc>) -> AppResult<bool> {
            Ok(true)
        }

        async fn update_password_hash(&self, _: &str, _: &str) -> AppResult<()> {
            Ok(())
        }

        async fn increment_token_version(&self, _: &str) -> AppResult<u32> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn stalled_calls_time_out() {
        let store = TimedUserStore::new(Arc::new(StalledStore), Duration::from_millis(50));
        let err = store.get_credential_record("alice").await.unwrap_err();
        assert!(matches!(err, AppError::DependencyUnavailable(_)));

        let err = store.increment_failed_attempts("alice").await.unwrap_err();
        assert!(err.to_string().contains("increment_failed_attempts"));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let inner = Arc::new(MemoryUserStore::new());
        inner
            .insert(CredentialRecord::new("u-1", "alice", "hash".to_string()))
            .await;
        let store = TimedUserStore::new(inner, Duration::from_secs(1));

        assert_eq!(store.increment_failed_attempts("alice").await.unwrap(), 1);
        assert!(store.get_credential_record("alice").await.unwrap().is_some());
    }
}

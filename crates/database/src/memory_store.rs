use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;

use app_error::{AppError, AppResult};
use app_models::CredentialRecord;

use crate::UserStore;

/// User store held in process memory, keyed by username.
#[derive(Default)]
pub struct MemoryUserStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
    unavailable: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub async fn insert(&self, record: CredentialRecord) {
        tracing::debug!(username = %record.username, "storing credential record");
        self.records
            .write()
            .await
            .insert(record.username.clone(), record);
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.records.read().await.contains_key(username)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Make every following call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::dependency("user-store", "backend unavailable"));
        }
        Ok(())
    }

    // Applies `update` to an existing record under the write lock
    async fn modify<T>(
        &self,
        username: &str,
        update: impl FnOnce(&mut CredentialRecord) -> T,
    ) -> AppResult<T> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(username)
            .ok_or_else(|| AppError::NotFoundError(format!("User '{}' not found", username)))?;
        Ok(update(record))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_credential_record(&self, username: &str) -> AppResult<Option<CredentialRecord>> {
        self.check_available()?;
        Ok(self.records.read().await.get(username).cloned())
    }

    async fn get_credential_record_by_id(&self, id: &str) -> AppResult<Option<CredentialRecord>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records.values().find(|record| record.id == id).cloned())
    }

    async fn update_attempts(
        &self,
        username: &str,
        failed_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        self.modify(username, |record| {
            record.failed_attempts = failed_attempts;
            record.locked_until = locked_until;
        })
        .await
    }

    async fn lock_account(&self, username: &str, locked_until: DateTime<Utc>) -> AppResult<()> {
        self.modify(username, |record| {
            record.locked_until = Some(locked_until);
        })
        .await
    }

    async fn clear_lockout(&self, username: &str) -> AppResult<()> {
        self.modify(username, |record| {
            record.failed_attempts = 0;
            record.locked_until = None;
        })
        .await
    }

    async fn clear_expired_lockout(
        &self,
        username: &str,
        observed_until: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.modify(username, |record| {
            if record.locked_until != Some(observed_until) {
                return false;
            }
            record.failed_attempts = 0;
            record.locked_until = None;
            true
        })
        .await
    }

    async fn increment_failed_attempts(&self, username: &str) -> AppResult<u32> {
        self.modify(username, |record| {
            record.failed_attempts = record.failed_attempts.saturating_add(1);
            record.failed_attempts
        })
        .await
    }

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> AppResult<()> {
        self.modify(username, |record| {
            record.password_hash = password_hash.to_string();
        })
        .await
    }

    async fn increment_token_version(&self, username: &str) -> AppResult<u32> {
        self.modify(username, |record| {
            record.token_version = record.token_version.wrapping_add(1);
            record.token_version
        })
        .await
    }
}

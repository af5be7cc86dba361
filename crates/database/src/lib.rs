pub mod memory_store;
pub mod timed_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use app_error::AppResult;
use app_models::CredentialRecord;

pub use memory_store::MemoryUserStore;
pub use timed_store::TimedUserStore;

/// Access to account credentials. The lockout tracker only ever touches the
/// counter and lockout fields; password changes only touch the hash.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_credential_record(&self, username: &str) -> AppResult<Option<CredentialRecord>>;

    /// Lookup by stable subject id, as carried in token claims.
    async fn get_credential_record_by_id(&self, id: &str) -> AppResult<Option<CredentialRecord>>;

    async fn update_attempts(
        &self,
        username: &str,
        failed_attempts: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    /// Set `locked_until` without touching the failure counter.
    async fn lock_account(&self, username: &str, locked_until: DateTime<Utc>) -> AppResult<()>;

    /// Reset the counter to 0 and clear `locked_until`.
    async fn clear_lockout(&self, username: &str) -> AppResult<()>;

    /// Reset the counter and lock only while `locked_until` still equals
    /// `observed_until`. Returns false when the lock changed in between.
    async fn clear_expired_lockout(
        &self,
        username: &str,
        observed_until: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Atomically add one failed attempt and return the new count.
    async fn increment_failed_attempts(&self, username: &str) -> AppResult<u32>;

    async fn update_password_hash(&self, username: &str, password_hash: &str) -> AppResult<()>;

    /// Atomically bump the account's token version and return the new value.
    /// Tokens carrying an older version stop being accepted.
    async fn increment_token_version(&self, username: &str) -> AppResult<u32>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential state of one account as held by the user store.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    /// Bumped on password change; tokens minted under an older value are dead.
    #[serde(default)]
    pub token_version: u32,
}

impl CredentialRecord {
    pub fn new(id: impl Into<String>, username: impl Into<String>, password_hash: String) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            password_hash,
            is_active: true,
            is_superuser: false,
            failed_attempts: 0,
            locked_until: None,
            token_version: 0,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

// Keep the hash out of logs
impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .field("is_superuser", &self.is_superuser)
            .field("failed_attempts", &self.failed_attempts)
            .field("locked_until", &self.locked_until)
            .field("token_version", &self.token_version)
            .finish()
    }
}

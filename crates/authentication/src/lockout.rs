use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use app_config::LockoutConfig;
use app_database::UserStore;
use app_error::AppResult;
use app_models::CredentialRecord;
use app_utils::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Locked { until: DateTime<Utc> },
}

impl Admission {
    pub fn is_locked(&self) -> bool {
        matches!(self, Admission::Locked { .. })
    }

    /// Whole seconds until the lockout ends, rounded up.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        match self {
            Admission::Allowed => 0,
            Admission::Locked { until } => {
                let millis = (*until - now).num_milliseconds().max(0) as u64;
                millis.div_ceil(1000).max(1)
            }
        }
    }
}

/// Per-account brute-force protection backed by the user store.
pub struct LockoutTracker {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    threshold: u32,
    duration: Duration,
}

impl LockoutTracker {
    pub fn new(store: Arc<dyn UserStore>, clock: Arc<dyn Clock>, config: &LockoutConfig) -> Self {
        Self {
            store,
            clock,
            threshold: config.threshold,
            duration: Duration::seconds(config.duration_secs as i64),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Decide whether a login may proceed for `record`. An elapsed lockout is
    /// cleared here, together with the failure counter, unless the account was
    /// locked again after `record` was read.
    pub async fn check_admission(&self, record: &CredentialRecord) -> AppResult<Admission> {
        let now = self.clock.now();
        match record.locked_until {
            Some(until) if until > now => Ok(Admission::Locked { until }),
            Some(until) => {
                if self
                    .store
                    .clear_expired_lockout(&record.username, until)
                    .await?
                {
                    info!(username = %record.username, "lockout expired, counter reset");
                    return Ok(Admission::Allowed);
                }
                // Lock moved on since the read; judge the current one
                let current = self.store.get_credential_record(&record.username).await?;
                match current.and_then(|r| r.locked_until).filter(|u| *u > now) {
                    Some(until) => Ok(Admission::Locked { until }),
                    None => Ok(Admission::Allowed),
                }
            }
            None => Ok(Admission::Allowed),
        }
    }

    /// Count one failed verification. Only the caller whose increment reaches
    /// the threshold writes `locked_until`.
    pub async fn record_failure(&self, username: &str) -> AppResult<Admission> {
        let count = self.store.increment_failed_attempts(username).await?;

        if count < self.threshold {
            warn!(username, failed_attempts = count, "failed login attempt");
            return Ok(Admission::Allowed);
        }

        if count > self.threshold {
            // Someone else crossed the threshold; report their lockout
            if let Some(record) = self.store.get_credential_record(username).await? {
                if let Some(until) = record.locked_until.filter(|u| *u > self.clock.now()) {
                    return Ok(Admission::Locked { until });
                }
            }
        }

        let until = self.clock.now() + self.duration;
        self.store.lock_account(username, until).await?;
        warn!(
            username,
            failed_attempts = count,
            locked_until = %until,
            "account locked after repeated failures"
        );
        Ok(Admission::Locked { until })
    }

    /// Reset the counter after a verified login.
    pub async fn record_success(&self, record: &CredentialRecord) -> AppResult<()> {
        if record.failed_attempts == 0 && record.locked_until.is_none() {
            return Ok(());
        }
        self.store.clear_lockout(&record.username).await
    }
}

use app_error::AppError;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginOutcome {
    Success,
    InvalidCredentials,
    AccountLocked,
    RateLimited,
    InvalidCaptcha,
    Error,
}

impl LoginOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginOutcome::Success => "success",
            LoginOutcome::InvalidCredentials => "invalid_credentials",
            LoginOutcome::AccountLocked => "account_locked",
            LoginOutcome::RateLimited => "rate_limited",
            LoginOutcome::InvalidCaptcha => "invalid_captcha",
            LoginOutcome::Error => "error",
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        match error {
            AppError::InvalidCredentials => LoginOutcome::InvalidCredentials,
            AppError::AccountLocked { .. } => LoginOutcome::AccountLocked,
            AppError::RateLimited { .. } => LoginOutcome::RateLimited,
            AppError::InvalidCaptcha => LoginOutcome::InvalidCaptcha,
            _ => LoginOutcome::Error,
        }
    }
}

/// One login attempt as written to the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct LoginEvent<'a> {
    pub username: &'a str,
    pub client_key: &'a str,
    pub outcome: LoginOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<&'a str>,
}

impl<'a> LoginEvent<'a> {
    pub fn new(username: &'a str, client_key: &'a str, outcome: LoginOutcome) -> Self {
        Self {
            username,
            client_key,
            outcome,
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: &'a str) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn emit(&self) {
        let outcome = self.outcome.as_str();
        if self.outcome == LoginOutcome::Success {
            info!(
                target: "audit",
                username = self.username,
                client = self.client_key,
                subject = self.subject.unwrap_or_default(),
                outcome,
                "login"
            );
        } else {
            warn!(
                target: "audit",
                username = self.username,
                client = self.client_key,
                outcome,
                "login"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_follow_errors() {
        assert_eq!(
            LoginOutcome::from_error(&AppError::InvalidCredentials),
            LoginOutcome::InvalidCredentials
        );
        assert_eq!(
            LoginOutcome::from_error(&AppError::AccountLocked {
                retry_after_secs: 10
            }),
            LoginOutcome::AccountLocked
        );
        assert_eq!(
            LoginOutcome::from_error(&AppError::InvalidCaptcha),
            LoginOutcome::InvalidCaptcha
        );
        assert_eq!(
            LoginOutcome::from_error(&AppError::dependency("redis", "down")),
            LoginOutcome::Error
        );
    }

    #[test]
    fn event_serializes_without_secrets() {
        let event = LoginEvent::new("alice", "10.0.0.1", LoginOutcome::Success).with_subject("u-1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["outcome"], "success");
        assert_eq!(value["subject"], "u-1");
        assert!(value.get("password").is_none());
        event.emit();
    }
}

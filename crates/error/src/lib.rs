use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shared by every login rejection so callers cannot tell an unknown
/// account, a wrong password and a locked account apart.
pub const GENERIC_LOGIN_FAILURE: &str = "Invalid username or password.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked for another {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Captcha missing, expired or incorrect")]
    InvalidCaptcha,

    #[error("Rate limit exceeded, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Token expired")]
    TokenExpired,

    #[error("Token signature or structure is invalid")]
    TokenInvalidSignature,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Wrong token type: expected {expected}, found {found}")]
    WrongTokenType { expected: String, found: String },

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Server error: {0}")]
    ServerError(anyhow::Error),
}

impl AppError {
    pub fn dependency(component: &str, detail: impl std::fmt::Display) -> Self {
        Self::DependencyUnavailable(format!("{}: {}", component, detail))
    }

    pub fn timeout(component: &str, operation: &str) -> Self {
        Self::DependencyUnavailable(format!("{} timed out during '{}'", component, operation))
    }

    pub fn validation(field: &str, message: &str) -> Self {
        Self::ValidationError(format!("Validation failed for '{}': {}", field, message))
    }

    /// Stable machine-readable code used in responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials | Self::AccountLocked { .. } => "LOGIN_FAILED",
            Self::InvalidCaptcha => "INVALID_CAPTCHA",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalidSignature => "TOKEN_INVALID",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::WrongTokenType { .. } => "TOKEN_WRONG_TYPE",
            Self::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::NotFoundError(_) => "NOT_FOUND",
            Self::ServerError(_) => "SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::AccountLocked { .. }
            | Self::TokenExpired
            | Self::TokenInvalidSignature
            | Self::TokenRevoked
            | Self::WrongTokenType { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ValidationError(_) | Self::InvalidCaptcha => StatusCode::BAD_REQUEST,
            Self::NotFoundError(_) => StatusCode::NOT_FOUND,
            Self::ConfigError(_) | Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired
                | Self::TokenInvalidSignature
                | Self::TokenRevoked
                | Self::WrongTokenType { .. }
        )
    }

    // Client-facing text; never includes internal details.
    fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials | Self::AccountLocked { .. } => {
                GENERIC_LOGIN_FAILURE.to_string()
            }
            Self::InvalidCaptcha => "Invalid or expired captcha.".to_string(),
            Self::RateLimited { .. } => "Too many attempts. Please try again later.".to_string(),
            Self::TokenExpired => {
                "Your session has expired. Please log in again to continue.".to_string()
            }
            Self::TokenInvalidSignature | Self::WrongTokenType { .. } => {
                "Invalid authentication token. Please log in again.".to_string()
            }
            Self::TokenRevoked => "This session has been signed out.".to_string(),
            Self::DependencyUnavailable(_) => {
                "Authentication is temporarily unavailable.".to_string()
            }
            Self::ValidationError(msg) | Self::NotFoundError(msg) => msg.clone(),
            Self::ConfigError(_) | Self::ServerError(_) => "Internal server error".to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::ServerError(error)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            tracing::error!(error_code = code, status_code = %status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(error_code = code, status_code = %status.as_u16(), error = %self, "request rejected");
        }

        let help = match &self {
            Self::InvalidCredentials | Self::AccountLocked { .. } => {
                Some("Check your credentials and try again later.")
            }
            e if e.is_token_error() => Some("Please log in to access this resource."),
            Self::ValidationError(_) => Some("Please review your input and try again."),
            Self::InvalidCaptcha => Some("Request a new captcha and try again."),
            _ => None,
        };

        let retry_after = match &self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let bearer_challenge = self.is_token_error();

        let body = Json(ErrorResponse {
            status: status.to_string(),
            message: self.public_message(),
            code: code.to_string(),
            help: help.map(String::from),
        });

        let mut response = (status, body).into_response();
        if bearer_challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

// Extension trait to wrap foreign errors with specific context
pub trait AppErrorExt<T> {
    fn config_err(self) -> AppResult<T>;
    fn server_err(self) -> AppResult<T>;
    fn dependency_err(self, component: &str) -> AppResult<T>;
}

impl<T, E> AppErrorExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn config_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::ConfigError(e.into()))
    }

    fn server_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::ServerError(e.into()))
    }

    fn dependency_err(self, component: &str) -> AppResult<T> {
        self.map_err(|e| AppError::dependency(component, e.into()))
    }
}

use app_error::{AppError, AppResult};

mod config_loader;
pub use config_loader::*;

/// Signing algorithms accepted for the HMAC-signed session tokens.
pub const SUPPORTED_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

/// Name of the login action for rate limiting.
pub const ACTION_LOGIN: &str = "login";
/// Name of the token-refresh action for rate limiting.
pub const ACTION_REFRESH: &str = "refresh";
/// Name of the captcha-issue action for rate limiting.
pub const ACTION_CAPTCHA: &str = "captcha";

pub(crate) fn config_error(message: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.into()))
}

pub(crate) fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| config_error(format!("Invalid value for {}: {}", key, e)))
}

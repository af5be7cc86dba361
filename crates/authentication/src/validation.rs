use app_config::PasswordConfig;
use app_error::{AppError, AppResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Letters, digits and the separators used in e-mail style logins
    static ref USERNAME_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9_.@-]{1,64}$").expect("username pattern is valid");
}

const SPECIAL_CHARACTERS: &str = "@$!%*?&#^-_+=.,:;";

/// Validates a username before it reaches the user store
pub fn validate_username(username: &str) -> AppResult<()> {
    if username.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(AppError::ValidationError(
            "Username must be 1-64 characters long and can only contain letters, numbers and . _ @ -"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validates a new password against the configured policy
pub fn validate_password(password: &str, policy: &PasswordConfig) -> AppResult<()> {
    if password.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }

    if password.chars().count() < policy.min_length {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {} characters long",
            policy.min_length
        )));
    }

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    let mut missing = Vec::new();

    if policy.require_lowercase && !has_lowercase {
        missing.push("lowercase letter");
    }

    if policy.require_uppercase && !has_uppercase {
        missing.push("uppercase letter");
    }

    if policy.require_number && !has_digit {
        missing.push("number");
    }

    if policy.require_special && !has_special {
        missing.push("special character (@$!%*?&#^-_+=.,:;)");
    }

    if !missing.is_empty() {
        return Err(AppError::ValidationError(format!(
            "Password must contain at least one {}",
            missing.join(", one ")
        )));
    }

    Ok(())
}

/// Sanitizes a string input by trimming whitespace
pub fn sanitize_string(input: &str) -> String {
    input.trim().to_string()
}

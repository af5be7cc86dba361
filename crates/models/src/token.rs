use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claim holding the account's token version at issue time.
pub const VERSION_CLAIM: &str = "ver";

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a signed session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub jti: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn username(&self) -> Option<&str> {
        self.extra.get("username").and_then(Value::as_str)
    }

    pub fn is_superuser(&self) -> bool {
        self.extra
            .get("is_superuser")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Account token version the token was minted under; 0 when absent.
    pub fn token_version(&self) -> u32 {
        self.extra
            .get(VERSION_CLAIM)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    }

    /// Seconds of validity left at `now`; negative once expired.
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.exp - now
    }
}

/// An encoded token together with the claims it was signed from.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

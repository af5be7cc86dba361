use serde::{Deserialize, Serialize};

use crate::token::{Claims, IssuedToken, TokenPair};

#[derive(Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub captcha_id: Option<String>,
    #[serde(default)]
    pub captcha_code: Option<String>,
    /// Ask for a refresh token as well.
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutInput {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(access: &IssuedToken, refresh: Option<&IssuedToken>) -> Self {
        Self {
            access_token: access.token.clone(),
            refresh_token: refresh.map(|token| token.token.clone()),
            token_type: "bearer".to_string(),
            expires_in: access.claims.exp - access.claims.iat,
        }
    }

    pub fn from_pair(pair: &TokenPair) -> Self {
        Self::new(&pair.access, Some(&pair.refresh))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptchaResponse {
    pub captcha_id: String,
    /// `data:` URI of the challenge image.
    pub captcha_image: String,
    pub expire_in: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: String,
    pub username: Option<String>,
    pub is_superuser: bool,
    pub expires_at: i64,
}

impl From<&Claims> for MeResponse {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub.clone(),
            username: claims.username().map(str::to_string),
            is_superuser: claims.is_superuser(),
            expires_at: claims.exp,
        }
    }
}

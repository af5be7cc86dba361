use app_config::JwtConfig;
use app_error::{AppError, AppResult};
use app_models::{Claims, CredentialRecord, IssuedToken, TokenKind, TokenPair, VERSION_CLAIM};
use app_utils::{Clock, generate_token_id};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde_json::{Map, Value};
use std::{str::FromStr, sync::Arc};
use tracing::{debug, error, warn};

// Written by `issue`; caller-supplied claims may not shadow them
const RESERVED_CLAIMS: [&str; 5] = ["sub", "iat", "exp", "type", "jti"];

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Mints and decodes session tokens. Access and refresh tokens are signed with
/// separate secrets and carry separate lifetimes.
pub struct JwtService {
    access: SigningKeys,
    refresh: SigningKeys,
    algorithm: Algorithm,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl JwtService {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let algorithm = Algorithm::from_str(&config.algorithm).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Unsupported JWT algorithm '{}': {}",
                config.algorithm,
                e
            ))
        })?;

        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Only HMAC algorithms are supported for shared-secret signing"
            )));
        }

        Ok(Self {
            access: SigningKeys::from_secret(config.access_secret.as_bytes()),
            refresh: SigningKeys::from_secret(config.refresh_secret.as_bytes()),
            algorithm,
            access_ttl_secs: config.access_ttl_secs()?,
            refresh_ttl_secs: config.refresh_ttl_secs()?,
            clock,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn ttl_secs(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        }
    }

    fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        extra: Map<String, Value>,
    ) -> AppResult<IssuedToken> {
        let now = self.clock.timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_secs(kind)),
            kind,
            jti: generate_token_id(),
            extra,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.keys(kind).encoding)
            .map_err(|e| {
                error!("Failed to sign {} token: {}", kind, e);
                AppError::ServerError(anyhow::anyhow!("Failed to generate token: {}", e))
            })?;

        debug!(sub = %claims.sub, jti = %claims.jti, kind = %kind, "token issued");
        Ok(IssuedToken { token, claims })
    }

    /// Access token with caller-supplied claims. Keys that the token itself
    /// sets (`sub`, `iat`, `exp`, `type`, `jti`) are refused.
    pub fn issue_access_token(
        &self,
        subject: &str,
        extra: Map<String, Value>,
    ) -> AppResult<IssuedToken> {
        if let Some(key) = RESERVED_CLAIMS.iter().find(|key| extra.contains_key(**key)) {
            warn!(claim = *key, "extra claims tried to override a registered claim");
            return Err(AppError::validation(
                "claims",
                &format!("'{}' is set by the issuer and cannot be supplied", key),
            ));
        }
        self.issue(subject, TokenKind::Access, extra)
    }

    pub fn issue_refresh_token(&self, subject: &str) -> AppResult<IssuedToken> {
        self.issue(subject, TokenKind::Refresh, Map::new())
    }

    /// Access token carrying the account's public attributes.
    pub fn issue_access_for(&self, record: &CredentialRecord) -> AppResult<IssuedToken> {
        self.issue_access_token(&record.id, account_claims(record))
    }

    /// Refresh token bound to the account's current token version.
    pub fn issue_refresh_for(&self, record: &CredentialRecord) -> AppResult<IssuedToken> {
        let mut extra = Map::new();
        extra.insert(VERSION_CLAIM.to_string(), Value::from(record.token_version));
        self.issue(&record.id, TokenKind::Refresh, extra)
    }

    pub fn issue_pair(&self, record: &CredentialRecord) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue_access_for(record)?,
            refresh: self.issue_refresh_for(record)?,
        })
    }

    /// Verify the signature with the secret of `kind` and return the claims.
    /// Expiry, kind and revocation are left to the validator.
    pub fn decode(&self, token: &str, kind: TokenKind) -> AppResult<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => debug!("Token signature mismatch"),
                    other => debug!("Token rejected: {:?}", other),
                }
                AppError::TokenInvalidSignature
            })
    }
}

fn account_claims(record: &CredentialRecord) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("username".to_string(), Value::from(record.username.clone()));
    extra.insert("is_superuser".to_string(), Value::from(record.is_superuser));
    extra.insert(VERSION_CLAIM.to_string(), Value::from(record.token_version));
    extra
}

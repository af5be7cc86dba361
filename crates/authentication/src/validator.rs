use std::sync::Arc;
use tracing::{debug, warn};

use app_error::{AppError, AppResult};
use app_models::{Claims, TokenKind};
use app_utils::Clock;

use crate::{jwt::JwtService, revocation::RevocationStore};

/// Runs the four token checks in a fixed order: signature, expiry, kind,
/// revocation. A forged token never reaches the cache.
pub struct TokenValidator {
    jwt: Arc<JwtService>,
    revocation: Arc<RevocationStore>,
    clock: Arc<dyn Clock>,
    leeway_secs: i64,
}

impl TokenValidator {
    pub fn new(
        jwt: Arc<JwtService>,
        revocation: Arc<RevocationStore>,
        clock: Arc<dyn Clock>,
        leeway_secs: u64,
    ) -> Self {
        Self {
            jwt,
            revocation,
            clock,
            leeway_secs: leeway_secs as i64,
        }
    }

    /// Signature, expiry and kind only. No I/O.
    pub fn verify(&self, token: &str, expected: TokenKind) -> AppResult<Claims> {
        let claims = self.jwt.decode(token, expected)?;

        if self.clock.timestamp() >= claims.exp.saturating_add(self.leeway_secs) {
            debug!(jti = %claims.jti, "token expired");
            return Err(AppError::TokenExpired);
        }

        if claims.kind != expected {
            warn!(jti = %claims.jti, found = %claims.kind, expected = %expected, "token used as wrong kind");
            return Err(AppError::WrongTokenType {
                expected: expected.to_string(),
                found: claims.kind.to_string(),
            });
        }

        Ok(claims)
    }

    pub async fn validate(&self, token: &str, expected: TokenKind) -> AppResult<Claims> {
        let claims = self.verify(token, expected)?;

        // Cache errors propagate; an unknown revocation state is never "valid"
        if self.revocation.is_revoked(&claims.jti).await? {
            debug!(jti = %claims.jti, "token revoked");
            return Err(AppError::TokenRevoked);
        }

        Ok(claims)
    }
}

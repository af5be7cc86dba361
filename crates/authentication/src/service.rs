use std::sync::Arc;
use tracing::{debug, info, warn};

use app_cache::Cache;
use app_config::{ACTION_CAPTCHA, ACTION_LOGIN, ACTION_REFRESH, AuthConfig, PasswordConfig};
use app_database::UserStore;
use app_error::{AppError, AppResult};
use app_models::{Claims, CredentialRecord, IssuedToken, TokenKind, TokenPair};
use app_utils::Clock;

use crate::{
    audit::{LoginEvent, LoginOutcome},
    captcha::{CaptchaChallenge, CaptchaStore},
    jwt::JwtService,
    lockout::LockoutTracker,
    password::PasswordHasher,
    rate_limiter::RateLimiter,
    revocation::RevocationStore,
    validation,
    validator::TokenValidator,
};

/// One login request as received from a client.
#[derive(Debug, Clone, Copy)]
pub struct LoginAttempt<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub client_key: &'a str,
    /// Challenge id and the code the user typed.
    pub captcha: Option<(&'a str, &'a str)>,
    /// Also issue a refresh token.
    pub remember: bool,
}

impl<'a> LoginAttempt<'a> {
    pub fn new(username: &'a str, password: &'a str, client_key: &'a str) -> Self {
        Self {
            username,
            password,
            client_key,
            captcha: None,
            remember: false,
        }
    }

    pub fn with_captcha(mut self, id: &'a str, code: &'a str) -> Self {
        self.captcha = Some((id, code));
        self
    }

    pub fn remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }
}

/// Tokens handed out by a login. `refresh` is only set for remembered logins.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub access: IssuedToken,
    pub refresh: Option<IssuedToken>,
}

/// Entry point of the authentication core. Holds only configuration and
/// handles to the injected store, cache and clock.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    hasher: Arc<PasswordHasher>,
    lockout: LockoutTracker,
    jwt: Arc<JwtService>,
    revocation: Arc<RevocationStore>,
    validator: TokenValidator,
    rate_limiter: RateLimiter,
    captcha: Option<CaptchaStore>,
    password_policy: PasswordConfig,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn UserStore>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let hasher = Arc::new(PasswordHasher::new(&config.password.argon2)?);
        Self::with_hasher(config, store, cache, clock, hasher)
    }

    /// Build with an existing hasher, e.g. one shared with account seeding.
    pub fn with_hasher(
        config: &AuthConfig,
        store: Arc<dyn UserStore>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        hasher: Arc<PasswordHasher>,
    ) -> AppResult<Self> {
        let leeway = config.jwt.leeway_secs;
        let jwt = Arc::new(JwtService::new(&config.jwt, clock.clone())?);
        let revocation = Arc::new(RevocationStore::new(cache.clone(), clock.clone(), leeway));
        let validator = TokenValidator::new(jwt.clone(), revocation.clone(), clock.clone(), leeway);
        let lockout = LockoutTracker::new(store.clone(), clock.clone(), &config.lockout);
        let captcha = config
            .captcha
            .enabled
            .then(|| CaptchaStore::new(cache.clone(), &config.captcha));
        let rate_limiter = RateLimiter::new(cache, clock.clone(), config.rate_limiting.clone());

        info!(
            algorithm = ?jwt.algorithm(),
            lockout_threshold = config.lockout.threshold,
            captcha = captcha.is_some(),
            "authentication service ready"
        );

        Ok(Self {
            store,
            clock,
            hasher,
            lockout,
            jwt,
            revocation,
            validator,
            rate_limiter,
            captcha,
            password_policy: config.password.clone(),
        })
    }

    pub fn jwt(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt)
    }

    pub fn revocation(&self) -> Arc<RevocationStore> {
        Arc::clone(&self.revocation)
    }

    pub fn hasher(&self) -> Arc<PasswordHasher> {
        Arc::clone(&self.hasher)
    }

    pub fn captcha_enabled(&self) -> bool {
        self.captcha.is_some()
    }

    /// Verify credentials and mint a token pair. Every attempt is audited.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client_key: &str,
    ) -> AppResult<TokenPair> {
        let attempt = LoginAttempt::new(username, password, client_key);
        let record = self.verify_login(&attempt).await?;
        self.jwt.issue_pair(&record)
    }

    /// Full login: captcha gate when enabled, and a refresh token only for
    /// remembered sessions.
    pub async fn login_with(&self, attempt: &LoginAttempt<'_>) -> AppResult<LoginSession> {
        let record = self.verify_login(attempt).await?;
        let access = self.jwt.issue_access_for(&record)?;
        let refresh = if attempt.remember {
            Some(self.jwt.issue_refresh_for(&record)?)
        } else {
            None
        };
        Ok(LoginSession { access, refresh })
    }

    /// Issue a captcha challenge. Not found while the gate is disabled.
    pub async fn issue_captcha(&self, client_key: &str) -> AppResult<CaptchaChallenge> {
        let Some(captcha) = &self.captcha else {
            return Err(AppError::NotFoundError("Captcha is not enabled".to_string()));
        };
        self.rate_limiter.enforce(client_key, ACTION_CAPTCHA).await?;
        captcha.issue().await
    }

    async fn verify_login(&self, attempt: &LoginAttempt<'_>) -> AppResult<CredentialRecord> {
        let username = validation::sanitize_string(attempt.username);
        let result = self.login_inner(&username, attempt).await;

        match &result {
            Ok(record) => LoginEvent::new(&username, attempt.client_key, LoginOutcome::Success)
                .with_subject(&record.id)
                .emit(),
            Err(e) => {
                LoginEvent::new(&username, attempt.client_key, LoginOutcome::from_error(e)).emit()
            }
        }
        result
    }

    async fn login_inner(
        &self,
        username: &str,
        attempt: &LoginAttempt<'_>,
    ) -> AppResult<CredentialRecord> {
        let password = attempt.password;
        self.rate_limiter
            .enforce(attempt.client_key, ACTION_LOGIN)
            .await?;

        if let Some(captcha) = &self.captcha {
            let (id, code) = attempt.captcha.unwrap_or(("", ""));
            if !captcha.verify(id, code).await? {
                return Err(AppError::InvalidCaptcha);
            }
        }

        validation::validate_username(username)?;

        let Some(record) = self.store.get_credential_record(username).await? else {
            self.hasher.dummy_verify(password);
            return Err(AppError::InvalidCredentials);
        };

        let admission = self.lockout.check_admission(&record).await?;
        if admission.is_locked() {
            // Same argon2 cost as a real check
            self.hasher.dummy_verify(password);
            return Err(AppError::AccountLocked {
                retry_after_secs: admission.retry_after_secs(self.clock.now()),
            });
        }

        if !record.is_active {
            self.hasher.dummy_verify(password);
            warn!(username, "login attempt on inactive account");
            return Err(AppError::InvalidCredentials);
        }

        if !self.hasher.verify(password, &record.password_hash) {
            self.lockout.record_failure(&record.username).await?;
            return Err(AppError::InvalidCredentials);
        }

        self.lockout.record_success(&record).await?;
        info!(username, sub = %record.id, "login succeeded");
        Ok(record)
    }

    /// Validate a bearer access token against the revocation list and the
    /// account's current token version.
    pub async fn authenticate(&self, access_token: &str) -> AppResult<Claims> {
        let claims = self.validator.validate(access_token, TokenKind::Access).await?;
        self.current_account(&claims).await?;
        Ok(claims)
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str, client_key: &str) -> AppResult<IssuedToken> {
        self.rate_limiter.enforce(client_key, ACTION_REFRESH).await?;
        let claims = self
            .validator
            .validate(refresh_token, TokenKind::Refresh)
            .await?;

        let record = self.current_account(&claims).await?;
        let access = self.jwt.issue_access_for(&record)?;
        info!(sub = %claims.sub, "access token refreshed");
        Ok(access)
    }

    /// Validate the access token, then revoke it and the optional refresh
    /// token.
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> AppResult<()> {
        let claims = self.authenticate(access_token).await?;
        self.logout_session(&claims, refresh_token).await
    }

    /// Logout for an access token that was already validated.
    pub async fn logout_session(
        &self,
        access: &Claims,
        refresh_token: Option<&str>,
    ) -> AppResult<()> {
        self.revocation.revoke(access).await?;

        if let Some(token) = refresh_token {
            match self.validator.verify(token, TokenKind::Refresh) {
                Ok(refresh) if refresh.sub == access.sub => {
                    self.revocation.revoke(&refresh).await?;
                }
                Ok(_) => {
                    warn!(sub = %access.sub, "refresh token of another subject presented at logout");
                    return Err(AppError::validation(
                        "refresh_token",
                        "token does not belong to this session",
                    ));
                }
                // Nothing left to revoke
                Err(AppError::TokenExpired) => {}
                Err(e) => return Err(e),
            }
        }

        info!(sub = %access.sub, "logged out");
        Ok(())
    }

    /// Invalidate every token issued to `subject` so far by bumping the
    /// account's token version.
    pub async fn revoke_all(&self, subject: &str) -> AppResult<()> {
        let record = self
            .store
            .get_credential_record_by_id(subject)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("Subject '{}' not found", subject)))?;
        let version = self
            .store
            .increment_token_version(&record.username)
            .await?;
        info!(sub = subject, token_version = version, "all tokens of subject revoked");
        Ok(())
    }

    /// Replace the caller's password and sign out all of their sessions.
    pub async fn change_password(
        &self,
        claims: &Claims,
        old_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let record = self.current_account(claims).await?;

        if !self.hasher.verify(old_password, &record.password_hash) {
            warn!(sub = %claims.sub, "password change rejected, old password mismatch");
            return Err(AppError::InvalidCredentials);
        }

        validation::validate_password(new_password, &self.password_policy)?;
        if old_password == new_password {
            return Err(AppError::validation(
                "new_password",
                "must differ from the current password",
            ));
        }

        let hash = self.hasher.hash(new_password)?;
        self.store
            .update_password_hash(&record.username, &hash)
            .await?;
        self.revoke_all(&claims.sub).await?;

        info!(sub = %claims.sub, "password changed, sessions revoked");
        Ok(())
    }

    // The token's account must still exist, be active and be on the version
    // the token was minted under
    async fn current_account(&self, claims: &Claims) -> AppResult<CredentialRecord> {
        match self.store.get_credential_record_by_id(&claims.sub).await? {
            Some(record) if record.is_active && record.token_version == claims.token_version() => {
                Ok(record)
            }
            Some(record) if record.is_active => {
                debug!(
                    sub = %claims.sub,
                    token_version = claims.token_version(),
                    current = record.token_version,
                    "token minted under an older version"
                );
                Err(AppError::TokenRevoked)
            }
            _ => {
                warn!(sub = %claims.sub, "token subject missing or inactive");
                Err(AppError::TokenRevoked)
            }
        }
    }
}

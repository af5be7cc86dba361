use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, fs, net::IpAddr, path::Path, time::Duration};
use tracing::{debug, info, warn};

use app_error::{AppErrorExt, AppResult};

use crate::{
    ACTION_CAPTCHA, ACTION_LOGIN, ACTION_REFRESH, SUPPORTED_ALGORITHMS, config_error, parse_value,
};

/// Complete configuration of the authentication core
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub environment: String,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub rate_limiting: RateLimitingConfig,
    pub password: PasswordConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed.
    /// Empty means the socket address is the client.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub algorithm: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    /// Clock-skew tolerance applied to the expiry check.
    pub leeway_secs: u64,
}

// Don't accidentally log signing secrets
impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl JwtConfig {
    pub fn access_ttl_secs(&self) -> AppResult<i64> {
        self.access_ttl_minutes
            .checked_mul(60)
            .ok_or_else(|| config_error("Access token TTL is too large"))
    }

    pub fn refresh_ttl_secs(&self) -> AppResult<i64> {
        self.refresh_ttl_days
            .checked_mul(24 * 60 * 60)
            .ok_or_else(|| config_error("Refresh token TTL is too large"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LockoutConfig {
    /// Consecutive failures that trigger a lockout.
    pub threshold: u32,
    pub duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_attempts: u64,
    pub window_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitingConfig {
    pub login: RateLimitSettings,
    pub refresh: RateLimitSettings,
    #[serde(default = "default_captcha_rate")]
    pub captcha: RateLimitSettings,
    /// Extra named actions beyond login and refresh.
    #[serde(default)]
    pub actions: HashMap<String, RateLimitSettings>,
    /// Allow requests through when the counter store is unreachable.
    pub fail_open: bool,
}

impl RateLimitingConfig {
    pub fn for_action(&self, action: &str) -> Option<RateLimitSettings> {
        match action {
            ACTION_LOGIN => Some(self.login),
            ACTION_REFRESH => Some(self.refresh),
            ACTION_CAPTCHA => Some(self.captcha),
            other => self.actions.get(other).copied(),
        }
    }
}

fn default_captcha_rate() -> RateLimitSettings {
    RateLimitSettings {
        max_attempts: 20,
        window_secs: 60,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
    pub argon2: Argon2Config,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Argon2Config {
    /// Memory cost in KiB.
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// `redis://`, `rediss://` or `memory`.
    pub url: String,
    pub prefix: String,
    pub connection_timeout_ms: u64,
    pub operation_timeout_ms: u64,
}

impl CacheConfig {
    pub fn is_memory(&self) -> bool {
        self.url.trim() == "memory"
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub operation_timeout_ms: u64,
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    pub log_level: String,
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

/// Image captcha gate in front of login. Off unless enabled.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptchaConfig {
    pub enabled: bool,
    /// Characters per challenge.
    pub length: usize,
    pub ttl_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            length: 4,
            ttl_secs: 300,
        }
    }
}

impl CaptchaConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl AuthConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let content = fs::read_to_string(path).config_err()?;
        let config: AuthConfig = serde_json::from_str(&content).config_err()?;
        debug!("Configuration loaded from file");
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the process environment, reading `.env` first.
    pub fn from_env() -> AppResult<Self> {
        // Load .env file only once per process
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup; unset keys keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        macro_rules! read {
            ($key:expr, $target:expr) => {
                if let Some(raw) = lookup($key) {
                    $target = parse_value($key, &raw)?;
                }
            };
        }

        read!("AUTH_ENV", config.environment);
        read!("AUTH_HOST", config.server.host);
        read!("AUTH_PORT", config.server.port);
        read!("AUTH_REQUEST_TIMEOUT_SECS", config.server.request_timeout_secs);
        if let Some(raw) = lookup("AUTH_TRUSTED_PROXIES") {
            config.server.trusted_proxies = raw
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| parse_value("AUTH_TRUSTED_PROXIES", entry))
                .collect::<AppResult<Vec<IpAddr>>>()?;
        }

        read!("AUTH_JWT_ACCESS_SECRET", config.jwt.access_secret);
        read!("AUTH_JWT_REFRESH_SECRET", config.jwt.refresh_secret);
        read!("AUTH_JWT_ALGORITHM", config.jwt.algorithm);
        read!("AUTH_ACCESS_TOKEN_TTL_MINUTES", config.jwt.access_ttl_minutes);
        read!("AUTH_REFRESH_TOKEN_TTL_DAYS", config.jwt.refresh_ttl_days);
        read!("AUTH_JWT_LEEWAY_SECS", config.jwt.leeway_secs);

        read!("AUTH_LOCKOUT_THRESHOLD", config.lockout.threshold);
        read!("AUTH_LOCKOUT_DURATION_SECS", config.lockout.duration_secs);

        read!("AUTH_LOGIN_RATE_LIMIT", config.rate_limiting.login.max_attempts);
        read!("AUTH_LOGIN_RATE_WINDOW_SECS", config.rate_limiting.login.window_secs);
        read!("AUTH_REFRESH_RATE_LIMIT", config.rate_limiting.refresh.max_attempts);
        read!("AUTH_REFRESH_RATE_WINDOW_SECS", config.rate_limiting.refresh.window_secs);
        read!("AUTH_CAPTCHA_RATE_LIMIT", config.rate_limiting.captcha.max_attempts);
        read!("AUTH_RATE_LIMIT_FAIL_OPEN", config.rate_limiting.fail_open);

        read!("AUTH_PASSWORD_MIN_LENGTH", config.password.min_length);
        read!("AUTH_ARGON2_MEMORY_KIB", config.password.argon2.memory);
        read!("AUTH_ARGON2_ITERATIONS", config.password.argon2.iterations);
        read!("AUTH_ARGON2_PARALLELISM", config.password.argon2.parallelism);

        read!("AUTH_CACHE_URL", config.cache.url);
        read!("AUTH_CACHE_PREFIX", config.cache.prefix);
        read!("AUTH_CACHE_CONNECT_TIMEOUT_MS", config.cache.connection_timeout_ms);
        read!("AUTH_CACHE_TIMEOUT_MS", config.cache.operation_timeout_ms);
        read!("AUTH_STORE_TIMEOUT_MS", config.store.operation_timeout_ms);

        read!("AUTH_CAPTCHA_ENABLED", config.captcha.enabled);
        read!("AUTH_CAPTCHA_LENGTH", config.captcha.length);
        read!("AUTH_CAPTCHA_TTL_SECS", config.captcha.ttl_secs);

        read!("AUTH_LOG_LEVEL", config.monitoring.log_level);
        config.monitoring.sentry_dsn = lookup("SENTRY_DSN").filter(|dsn| !dsn.trim().is_empty());

        if let (Some(username), Some(password)) = (
            lookup("AUTH_BOOTSTRAP_ADMIN_USERNAME"),
            lookup("AUTH_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            config.bootstrap_admin = Some(BootstrapAdmin { username, password });
        }

        info!("Loaded configuration for environment: {}", config.environment);
        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Validate the configuration
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        let is_production = self.is_production();

        if self.server.host.trim().is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }

        if self.server.port == 0 {
            errors.push("Server port cannot be 0".to_string());
        }

        self.validate_jwt(is_production, &mut errors);

        if self.lockout.threshold == 0 {
            errors.push("Lockout threshold must be greater than 0".to_string());
        }

        if self.lockout.duration_secs == 0 {
            errors.push("Lockout duration must be greater than 0".to_string());
        }

        for (action, settings) in [
            (ACTION_LOGIN, &self.rate_limiting.login),
            (ACTION_REFRESH, &self.rate_limiting.refresh),
            (ACTION_CAPTCHA, &self.rate_limiting.captcha),
        ]
        .into_iter()
        .chain(self.rate_limiting.actions.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if settings.max_attempts == 0 {
                errors.push(format!("Rate limit for '{}' must allow at least 1 attempt", action));
            }
            if settings.window_secs == 0 {
                errors.push(format!("Rate limit window for '{}' cannot be 0", action));
            }
        }

        if self.captcha.enabled
            && (!(4..=8).contains(&self.captcha.length) || self.captcha.ttl_secs == 0)
        {
            errors.push("Captcha needs 4 to 8 characters and a positive TTL".to_string());
        }

        let argon2 = &self.password.argon2;
        if argon2.iterations == 0 || argon2.parallelism == 0 || argon2.memory < 8 * argon2.parallelism
        {
            errors.push("Argon2 parameters are out of range".to_string());
        }

        if self.cache.url.trim().is_empty() {
            errors.push("Cache URL cannot be empty".to_string());
        } else if is_production && self.cache.is_memory() {
            errors.push("In-memory cache cannot be shared between instances in production".to_string());
        } else if is_production && !self.cache.url.starts_with("rediss://") {
            errors.push("Production should use a secure 'rediss://' cache connection".to_string());
        } else if !self.cache.is_memory() && !self.cache.url.starts_with("redis") {
            errors.push(format!("Unsupported cache URL scheme: {}", self.cache.url));
        }

        if self.cache.operation_timeout_ms == 0 || self.store.operation_timeout_ms == 0 {
            errors.push("Dependency timeouts must be greater than 0".to_string());
        }

        if !errors.is_empty() {
            return Err(config_error(format!(
                "Invalid configuration: {}",
                errors.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_jwt(&self, is_production: bool, errors: &mut Vec<String>) {
        let jwt = &self.jwt;

        if jwt.access_secret.is_empty() || jwt.refresh_secret.is_empty() {
            errors.push("JWT secrets cannot be empty".to_string());
        } else if jwt.access_secret == jwt.refresh_secret {
            errors.push("Access and refresh tokens must use different secrets".to_string());
        }

        if is_production
            && (jwt.access_secret.len() < 32
                || jwt.refresh_secret.len() < 32
                || jwt.access_secret.starts_with("dev-")
                || jwt.refresh_secret.starts_with("dev-"))
        {
            errors.push("JWT secrets are not secure for production use".to_string());
        } else if jwt.access_secret.starts_with("dev-") {
            warn!("Using development JWT secrets");
        }

        if !SUPPORTED_ALGORITHMS.contains(&jwt.algorithm.as_str()) {
            errors.push(format!(
                "Unsupported JWT algorithm '{}', expected one of {}",
                jwt.algorithm,
                SUPPORTED_ALGORITHMS.join("/")
            ));
        }

        if jwt.access_ttl_minutes <= 0 {
            errors.push("Access token TTL must be positive".to_string());
        }

        if jwt.refresh_ttl_days <= 0 {
            errors.push("Refresh token TTL must be positive".to_string());
        }

        match (jwt.access_ttl_secs(), jwt.refresh_ttl_secs()) {
            (Ok(access), Ok(refresh)) => {
                if access > 0 && refresh > 0 && access >= refresh {
                    errors.push(
                        "Access token TTL must be shorter than refresh token TTL".to_string(),
                    );
                }
            }
            (Err(e), _) | (_, Err(e)) => errors.push(e.to_string()),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                request_timeout_secs: 30,
                trusted_proxies: Vec::new(),
            },
            jwt: JwtConfig {
                access_secret: "dev-access-secret-do-not-use-in-production".to_string(),
                refresh_secret: "dev-refresh-secret-do-not-use-in-production".to_string(),
                algorithm: "HS256".to_string(),
                access_ttl_minutes: 30,
                refresh_ttl_days: 7,
                leeway_secs: 5,
            },
            lockout: LockoutConfig {
                threshold: 5,
                duration_secs: 15 * 60,
            },
            rate_limiting: RateLimitingConfig {
                login: RateLimitSettings {
                    max_attempts: 10,
                    window_secs: 60,
                },
                refresh: RateLimitSettings {
                    max_attempts: 30,
                    window_secs: 60,
                },
                captcha: default_captcha_rate(),
                actions: HashMap::new(),
                fail_open: true,
            },
            password: PasswordConfig {
                min_length: 8,
                require_uppercase: true,
                require_lowercase: true,
                require_number: true,
                require_special: false,
                argon2: Argon2Config {
                    memory: 19 * 1024,
                    iterations: 2,
                    parallelism: 1,
                },
            },
            cache: CacheConfig {
                url: "redis://localhost:6379".to_string(),
                prefix: "auth".to_string(),
                connection_timeout_ms: 5000,
                operation_timeout_ms: 500,
            },
            store: StoreConfig {
                operation_timeout_ms: 2000,
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
                sentry_dsn: None,
            },
            captcha: CaptchaConfig::default(),
            bootstrap_admin: None,
        }
    }
}

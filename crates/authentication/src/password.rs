use app_config::Argon2Config;
use app_error::{AppError, AppResult};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

// Verified against when the account does not exist
const DUMMY_PASSWORD: &str = "dummy-password-for-unknown-accounts";

/// Hash a password using Argon2id with the library defaults
pub fn hash_password(password: &str) -> AppResult<String> {
    hash_with(&Argon2::default(), password)
}

/// Verify a password against a stored PHC hash. A hash that cannot be parsed
/// counts as a mismatch.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify_with(&Argon2::default(), password, password_hash)
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    debug!("Hashing password");
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            AppError::ServerError(anyhow::anyhow!("Failed to hash password: {}", e))
        })?
        .to_string();

    Ok(password_hash)
}

fn verify_with(argon2: &Argon2<'_>, password: &str, password_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    let is_valid = argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok();

    debug!("Password verification result: {}", is_valid);
    is_valid
}

/// Argon2id hasher carrying the configured cost parameters.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
    verifications: AtomicU64,
}

impl PasswordHasher {
    pub fn new(config: &Argon2Config) -> AppResult<Self> {
        let params = Params::new(config.memory, config.iterations, config.parallelism, None)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid argon2 parameters: {}", e))
            })?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, DUMMY_PASSWORD)?;

        Ok(Self {
            argon2,
            dummy_hash,
            verifications: AtomicU64::new(0),
        })
    }

    pub fn hash(&self, password: &str) -> AppResult<String> {
        hash_with(&self.argon2, password)
    }

    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        verify_with(&self.argon2, password, password_hash)
    }

    /// Spend the same work as a real verification so unknown or locked
    /// accounts are not distinguishable by response time.
    pub fn dummy_verify(&self, password: &str) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let _ = verify_with(&self.argon2, password, &self.dummy_hash);
    }

    /// Number of argon2 verifications run so far, real or dummy.
    pub fn verification_count(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) fn fast_hasher() -> PasswordHasher {
    PasswordHasher::new(&Argon2Config {
        memory: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test argon2 parameters are valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let password = "secure_password123";

        let hash = hash_password(password).expect("Should hash password");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash), "Password verification should succeed");
        assert!(
            !verify_password("wrong_password", &hash),
            "Wrong password verification should fail"
        );
    }

    #[test]
    fn same_password_hashes_differently() {
        let hasher = fast_hasher();
        let first = hasher.hash("P@ssw0rd").unwrap();
        let second = hasher.hash("P@ssw0rd").unwrap();
        assert_ne!(first, second);
        assert!(hasher.verify("P@ssw0rd", &first));
        assert!(hasher.verify("P@ssw0rd", &second));
    }

    #[test]
    fn empty_password_is_hashable() {
        let hasher = fast_hasher();
        let hash = hasher.hash("").unwrap();
        assert!(hasher.verify("", &hash));
        assert!(!hasher.verify(" ", &hash));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("P@ssw0rd", "not-a-phc-string"));
        assert!(!hasher.verify("P@ssw0rd", ""));
    }

    #[test]
    fn hashes_carry_configured_cost() {
        let hasher = fast_hasher();
        let hash = hasher.hash("P@ssw0rd").unwrap();
        assert!(hash.contains("m=1024,t=1,p=1"));
        // Hashes made elsewhere with other params still verify
        let default_hash = hash_password("P@ssw0rd").unwrap();
        assert!(hasher.verify("P@ssw0rd", &default_hash));
    }

    #[test]
    fn invalid_params_are_config_errors() {
        let result = PasswordHasher::new(&Argon2Config {
            memory: 1,
            iterations: 0,
            parallelism: 1,
        });
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn dummy_verify_runs_without_a_record() {
        let hasher = fast_hasher();
        hasher.dummy_verify("anything");
        hasher.verify("anything", "not-a-phc-string");
        assert_eq!(hasher.verification_count(), 2);
    }
}

pub mod audit;
pub mod bootstrap;
pub mod captcha;
pub mod jwt;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod rate_limiter;
pub mod revocation;
pub mod routes;
pub mod service;
pub mod validation;
pub mod validator;

// Re-export key items for convenience
pub use captcha::{CaptchaChallenge, CaptchaStore};
pub use jwt::JwtService;
pub use lockout::{Admission, LockoutTracker};
pub use middleware::{ClientIp, ClientIpResolver};
pub use password::{PasswordHasher, hash_password, verify_password};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use revocation::RevocationStore;
pub use service::{AuthService, LoginAttempt, LoginSession};
pub use validator::TokenValidator;

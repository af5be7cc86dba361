pub mod api;
pub mod credential;
pub mod token;

pub use api::{
    CaptchaResponse, ChangePasswordInput, LoginInput, LogoutInput, MeResponse, RefreshInput,
    RefreshResponse, TokenResponse,
};
pub use credential::CredentialRecord;
pub use token::{Claims, IssuedToken, TokenKind, TokenPair, VERSION_CLAIM};

//! Credentials, tokens and sessions.

pub mod context;
pub mod password;
pub mod refresh_token;
pub mod session;
pub mod token;

pub use context::AuthInfo;
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use refresh_token::{
    ClientMetadata, DeadlineRefreshTokenStore, InMemoryRefreshTokenStore, NewRefreshToken,
    RefreshToken, RefreshTokenId, RefreshTokenStore,
};
#[cfg(feature = "database")]
pub use refresh_token::PostgresRefreshTokenStore;
pub use session::{AuthSessionManager, LoginResponse};
pub use token::{
    IssuedToken, RefreshTokenPolicy, StatelessRefreshTokens, StoredRefreshTokens, TokenClaims,
    TokenCodec, TokenService,
};

/// Name of the cookie that may carry an access token in place of the
/// `Authorization` header.
pub const AUTH_COOKIE_NAME: &str = "auth_token";

use std::{any::type_name_of_val, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    auth::{password::PasswordHasher, refresh_token::ClientMetadata, token::TokenService},
    error::{AuthError, AuthResult, ErrorKind},
    user::{User, UserRepository},
};

/// Result of a successful login or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    /// Expiry of the access token.
    pub expires_at: DateTime<Utc>,
}

/// Orchestrates login, token validation, refresh and logout.
///
/// Username lookup failures and password mismatches produce the same
/// unauthorized error so callers cannot probe which usernames exist.
#[derive(Clone)]
pub struct AuthSessionManager {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    hasher: Arc<dyn PasswordHasher>,
}

impl fmt::Debug for AuthSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSessionManager")
            .field("users", &type_name_of_val(self.users.as_ref()))
            .field("tokens", &self.tokens)
            .field("hasher", &self.hasher)
            .finish()
    }
}

impl AuthSessionManager {
    const INVALID_CREDENTIALS: &'static str = "invalid username or password";

    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub async fn login(&self, username: &str, password: &str) -> AuthResult<LoginResponse> {
        self.login_with_client(username, password, ClientMetadata::default())
            .await
    }

    pub async fn login_with_client(
        &self,
        username: &str,
        password: &str,
        client: ClientMetadata,
    ) -> AuthResult<LoginResponse> {
        let mut user = match self.users.find_by_username(username).await {
            Ok(user) => user,
            Err(e) => {
                debug!(username, error = %e, "login rejected: user lookup failed");
                return Err(AuthError::unauthorized(Self::INVALID_CREDENTIALS));
            }
        };

        if let Err(e) = self.hasher.verify_password(password, &user.password_hash) {
            debug!(user_id = %user.id, error = %e, "login rejected: password check failed");
            return Err(AuthError::unauthorized(Self::INVALID_CREDENTIALS));
        }

        match self.users.update_last_login(&user.id).await {
            Ok(()) => user.mark_logged_in(Utc::now()),
            Err(e) => warn!(user_id = %user.id, error = %e, "failed to update last login"),
        }

        let response = self.issue(user, client).await?;
        info!(user_id = %response.user.id, "user logged in");
        Ok(response)
    }

    /// Resolve an access token to the user it was issued to.
    pub async fn validate_token(&self, token: &str) -> AuthResult<User> {
        let user_id = self.tokens.validate_token(token).map_err(|e| match e.kind() {
            ErrorKind::Unauthorized => e,
            _ => {
                debug!(error = %e, "access token rejected");
                AuthError::unauthorized("invalid token")
            }
        })?;

        self.users.find_by_id(&user_id).await.map_err(|e| {
            debug!(user_id = %user_id, error = %e, "token names an unknown user");
            AuthError::unauthorized("user not found")
        })
    }

    /// Exchange a refresh token for a fresh access and refresh token pair.
    ///
    /// The presented refresh token stays valid; it is not revoked here.
    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<LoginResponse> {
        self.refresh_token_with_client(refresh_token, ClientMetadata::default())
            .await
    }

    pub async fn refresh_token_with_client(
        &self,
        refresh_token: &str,
        client: ClientMetadata,
    ) -> AuthResult<LoginResponse> {
        let user_id = self
            .tokens
            .validate_refresh_token(refresh_token)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::System => e,
                _ => {
                    debug!(error = %e, "refresh token rejected");
                    AuthError::unauthorized("invalid refresh token")
                }
            })?;

        let user = self.users.find_by_id(&user_id).await.map_err(|e| {
            debug!(user_id = %user_id, error = %e, "refresh token names an unknown user");
            AuthError::unauthorized("user not found")
        })?;

        let response = self.issue(user, client).await?;
        debug!(user_id = %response.user.id, "tokens refreshed");
        Ok(response)
    }

    /// Revoke a refresh token. Unknown tokens and repeated calls succeed,
    /// as does every call when refresh tokens are stateless.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        self.tokens.revoke_refresh_token(refresh_token).await
    }

    async fn issue(&self, user: User, client: ClientMetadata) -> AuthResult<LoginResponse> {
        let access = self
            .tokens
            .generate_token(&user)
            .map_err(|e| Self::issuance_failure("access", &user.id, e))?;

        let refresh = self
            .tokens
            .generate_refresh_token_for(&user.id, client)
            .await
            .map_err(|e| Self::issuance_failure("refresh", &user.id, e))?;

        Ok(LoginResponse {
            access_token: access.token,
            refresh_token: refresh.token,
            user,
            expires_at: access.expires_at,
        })
    }

    fn issuance_failure(kind: &'static str, user_id: &str, e: AuthError) -> AuthError {
        error!(token = kind, user_id, error = %e.detailed(), "token issuance failed");
        AuthError::system_with(format!("failed to issue {kind} token"), e)
    }
}

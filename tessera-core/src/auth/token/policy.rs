use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::claims::TokenCodec;
use crate::auth::refresh_token::{NewRefreshToken, RefreshTokenStore};
use crate::error::{AuthError, AuthResult};

/// How refresh tokens are tracked after they are signed.
///
/// Chosen once when the [`TokenService`](super::TokenService) is built.
#[async_trait]
pub trait RefreshTokenPolicy: Send + Sync + std::fmt::Debug {
    /// Called with every freshly signed refresh token. An error fails the
    /// issuance as a whole.
    async fn on_issued(&self, token: NewRefreshToken) -> AuthResult<()>;

    /// Resolve a presented refresh token to the user it was issued to.
    async fn validate(&self, token: &str, codec: &TokenCodec) -> AuthResult<String>;

    /// Revoke a presented refresh token. Tokens that are unknown or already
    /// revoked succeed.
    async fn revoke(&self, token: &str) -> AuthResult<()>;

    /// Whether tokens can be revoked before they expire.
    fn is_stateful(&self) -> bool;

    /// Store backing the policy, if any.
    fn refresh_store(&self) -> Option<&Arc<dyn RefreshTokenStore>>;
}

/// Refresh tokens are self-contained: validation checks only the signature
/// and expiry, and nothing is recorded at issuance. Such tokens cannot be
/// revoked early.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatelessRefreshTokens;

#[async_trait]
impl RefreshTokenPolicy for StatelessRefreshTokens {
    async fn on_issued(&self, _token: NewRefreshToken) -> AuthResult<()> {
        Ok(())
    }

    async fn validate(&self, token: &str, codec: &TokenCodec) -> AuthResult<String> {
        codec.validate(token)
    }

    /// Nothing is recorded, so there is nothing to revoke.
    async fn revoke(&self, _token: &str) -> AuthResult<()> {
        Ok(())
    }

    fn is_stateful(&self) -> bool {
        false
    }

    fn refresh_store(&self) -> Option<&Arc<dyn RefreshTokenStore>> {
        None
    }
}

/// Every refresh token is persisted, and the stored record is the authority
/// on validity.
#[derive(Debug, Clone)]
pub struct StoredRefreshTokens {
    store: Arc<dyn RefreshTokenStore>,
}

impl StoredRefreshTokens {
    pub fn new(store: Arc<dyn RefreshTokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RefreshTokenPolicy for StoredRefreshTokens {
    async fn on_issued(&self, token: NewRefreshToken) -> AuthResult<()> {
        let user_id = token.user_id.clone();
        let stored = self
            .store
            .store(token)
            .await
            .map_err(|e| AuthError::system_with("failed to store refresh token", e))?;

        debug!(user_id = %user_id, token_id = %stored.id, "refresh token stored");
        Ok(())
    }

    async fn validate(&self, token: &str, _codec: &TokenCodec) -> AuthResult<String> {
        if token.is_empty() {
            return Err(AuthError::validation("token cannot be empty"));
        }

        let record = match self.store.get_by_token(token).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Err(AuthError::not_found("refresh token not found"));
            }
            Err(e) => {
                return Err(AuthError::system_with(
                    "failed to retrieve refresh token",
                    e,
                ));
            }
        };

        let now = Utc::now();
        if !record.is_valid_at(now) {
            debug!(
                token_id = %record.id,
                revoked = record.is_revoked,
                "refresh token rejected"
            );
            return Err(AuthError::unauthorized(
                "refresh token is invalid or expired",
            ));
        }

        if let Err(e) = self.store.update_last_used(&record.id, now).await {
            warn!(token_id = %record.id, error = %e, "failed to record refresh token use");
        }

        Ok(record.user_id)
    }

    async fn revoke(&self, token: &str) -> AuthResult<()> {
        let record = match self.store.get_by_token(token).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                error!(error = %e.detailed(), "failed to look up refresh token for revocation");
                return Err(AuthError::system_with("failed to look up refresh token", e));
            }
        };

        self.store.revoke(&record.id).await.map_err(|e| {
            error!(token_id = %record.id, error = %e.detailed(), "failed to revoke refresh token");
            AuthError::system_with("failed to revoke refresh token", e)
        })?;

        info!(user_id = %record.user_id, token_id = %record.id, "refresh token revoked");
        Ok(())
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn refresh_store(&self) -> Option<&Arc<dyn RefreshTokenStore>> {
        Some(&self.store)
    }
}

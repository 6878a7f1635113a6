use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::{NewRefreshToken, RefreshToken, RefreshTokenId, RefreshTokenStore};
use crate::error::{AuthError, AuthResult};

/// Bounds every call on the wrapped store by a fixed deadline.
///
/// When the deadline elapses the pending call is dropped and the caller sees
/// a system error.
#[derive(Debug, Clone)]
pub struct DeadlineRefreshTokenStore {
    inner: Arc<dyn RefreshTokenStore>,
    deadline: Duration,
}

impl DeadlineRefreshTokenStore {
    pub fn new(inner: Arc<dyn RefreshTokenStore>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn guard<T, F>(&self, operation: &'static str, call: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>> + Send,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "refresh token store call timed out"
                );
                Err(AuthError::system(format!(
                    "refresh token store {operation} timed out"
                )))
            }
        }
    }
}

#[async_trait]
impl RefreshTokenStore for DeadlineRefreshTokenStore {
    async fn store(&self, token: NewRefreshToken) -> AuthResult<RefreshToken> {
        self.guard("store", self.inner.store(token)).await
    }

    async fn get_by_token(&self, token: &str) -> AuthResult<RefreshToken> {
        self.guard("get_by_token", self.inner.get_by_token(token))
            .await
    }

    async fn revoke(&self, id: &RefreshTokenId) -> AuthResult<()> {
        self.guard("revoke", self.inner.revoke(id)).await
    }

    async fn get_by_user_id(&self, user_id: &str) -> AuthResult<Vec<RefreshToken>> {
        self.guard("get_by_user_id", self.inner.get_by_user_id(user_id))
            .await
    }

    async fn update_last_used(&self, id: &RefreshTokenId, at: DateTime<Utc>) -> AuthResult<()> {
        self.guard("update_last_used", self.inner.update_last_used(id, at))
            .await
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<()> {
        self.guard(
            "revoke_all_for_user",
            self.inner.revoke_all_for_user(user_id),
        )
        .await
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        self.guard("delete_expired", self.inner.delete_expired())
            .await
    }

    async fn count(&self, user_id: &str) -> AuthResult<usize> {
        self.guard("count", self.inner.count(user_id)).await
    }
}

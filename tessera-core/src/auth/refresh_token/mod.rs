//! Refresh-token records and the storage contract shared by every backend.
//!
//! A record moves from active to revoked (explicitly, terminal) or to expired
//! (by the passage of time, also terminal). Expired records are never
//! auto-revoked; they fail [`RefreshToken::is_valid`] until a sweep through
//! [`RefreshTokenStore::delete_expired`] removes them.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthResult;

pub mod deadline;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use deadline::DeadlineRefreshTokenStore;
pub use memory::InMemoryRefreshTokenStore;
#[cfg(feature = "database")]
pub use postgres::PostgresRefreshTokenStore;

/// Store-assigned identifier. Opaque to callers: the in-memory backend uses
/// UUIDs, the Postgres backend a serial integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshTokenId(String);

impl RefreshTokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefreshTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a refresh token was issued to. Both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_info: Option<String>,
    pub ip: Option<String>,
}

/// A refresh token that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshToken {
    pub token: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client: ClientMetadata,
}

impl NewRefreshToken {
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            issued_at,
            expires_at,
            client: ClientMetadata::default(),
        }
    }

    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
        self
    }

    pub(crate) fn into_record(self, id: RefreshTokenId) -> RefreshToken {
        RefreshToken {
            id,
            token: self.token,
            user_id: self.user_id,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            last_used_at: None,
            is_revoked: false,
            client_info: self.client.client_info,
            ip: self.client.ip,
        }
    }
}

/// A persisted refresh token. Values handed out by a store are copies;
/// mutating them never changes the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: RefreshTokenId,
    pub token: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
    pub client_info: Option<String>,
    pub ip: Option<String>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Derived on every call, never stored.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Storage contract for refresh-token records.
///
/// Every backend must keep `token` unique (a duplicate insert is
/// [`AuthError::Conflict`](crate::error::AuthError::Conflict), never an
/// overwrite) and must never clear a revocation. Dropping a returned future
/// abandons the call.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync + fmt::Debug {
    /// Persist a record and assign its id.
    async fn store(&self, token: NewRefreshToken) -> AuthResult<RefreshToken>;

    /// `NotFound` when no record carries `token`.
    async fn get_by_token(&self, token: &str) -> AuthResult<RefreshToken>;

    /// Idempotently mark a record revoked. `NotFound` for an unknown id.
    async fn revoke(&self, id: &RefreshTokenId) -> AuthResult<()>;

    /// All records for a user, oldest first. Empty when there are none.
    async fn get_by_user_id(&self, user_id: &str) -> AuthResult<Vec<RefreshToken>>;

    /// `NotFound` for an unknown id. Succeeds without effect when the backing
    /// schema has no last-used column.
    async fn update_last_used(&self, id: &RefreshTokenId, at: DateTime<Utc>) -> AuthResult<()>;

    /// Revoke every record of a user. Succeeds when the user has none.
    async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<()>;

    /// Remove every record whose expiry lies in the past, returning how many
    /// were removed.
    async fn delete_expired(&self) -> AuthResult<u64>;

    /// Number of a user's records that are valid right now.
    async fn count(&self, user_id: &str) -> AuthResult<usize>;
}

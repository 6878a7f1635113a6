//! User records as seen by the authentication subsystem.
//!
//! Users are owned by an external store; this crate only reads them through
//! [`UserRepository`] and bumps the last-login timestamp after a successful
//! password check.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AuthError, AuthResult};

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::InMemoryUserRepository;
#[cfg(feature = "database")]
pub use postgres::PostgresUserRepository;

/// Role assigned to a user. Role checks are exact matches; there is no
/// hierarchy between variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Manager,
    Tester,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Manager => "Manager",
            Self::Tester => "Tester",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = UserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Self::Admin),
            "Manager" => Ok(Self::Manager),
            "Tester" => Ok(Self::Tester),
            other => Err(UserError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("user id is required")]
    EmptyId,
    #[error("username is required")]
    EmptyUsername,
    #[error("password hash is required")]
    EmptyPasswordHash,
    #[error("invalid user role: {0:?}")]
    InvalidRole(String),
}

impl From<UserError> for AuthError {
    fn from(err: UserError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

/// A system user. The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: UserRole,
    ) -> Result<Self, UserError> {
        let id = id.into();
        let username = username.into();
        let password_hash = password_hash.into();

        if id.is_empty() {
            return Err(UserError::EmptyId);
        }
        if username.is_empty() {
            return Err(UserError::EmptyUsername);
        }
        if password_hash.is_empty() {
            return Err(UserError::EmptyPasswordHash);
        }

        let now = Utc::now();
        Ok(Self {
            id,
            username,
            password_hash,
            role,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        })
    }

    /// Build a user from a stored role string, rejecting unknown roles.
    pub fn with_role_name(
        id: impl Into<String>,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: &str,
    ) -> Result<Self, UserError> {
        let role = role.parse::<UserRole>()?;
        Self::new(id, username, password_hash, role)
    }

    pub fn mark_logged_in(&mut self, at: DateTime<Utc>) {
        self.last_login_at = Some(at);
        self.updated_at = at;
    }
}

/// Read access to the external user store.
///
/// Lookups report a missing user as [`AuthError::NotFound`]; callers that
/// face credential holders translate that before it escapes.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> AuthResult<User>;
    async fn find_by_id(&self, id: &str) -> AuthResult<User>;
    async fn update_last_login(&self, id: &str) -> AuthResult<()>;
}

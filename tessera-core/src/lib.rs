//! # Tessera Core
//!
//! Authentication and token lifecycle for Tessera services.
//!
//! ## Overview
//!
//! - **Password hashing**: salted Argon2id hashes behind the [`auth::PasswordHasher`] trait
//! - **Access tokens**: short-lived HMAC-signed tokens, validated without any server state
//! - **Refresh tokens**: either self-contained or persisted in a [`auth::RefreshTokenStore`]
//!   so they can be revoked before they expire
//! - **Sessions**: [`auth::AuthSessionManager`] ties login, refresh and logout together
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL user repository and refresh-token store (SQLx)
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chrono::Duration;
//! use tessera_core::{
//!     auth::{
//!         Argon2PasswordHasher, AuthSessionManager, InMemoryRefreshTokenStore, RefreshTokenStore,
//!         TokenService,
//!     },
//!     user::InMemoryUserRepository,
//! };
//!
//! async fn sign_in() -> Result<(), tessera_core::error::AuthError> {
//!     let store: Arc<dyn RefreshTokenStore> = Arc::new(InMemoryRefreshTokenStore::new());
//!     let tokens = Arc::new(TokenService::with_store(
//!         "change-me",
//!         Duration::minutes(15),
//!         Duration::hours(24),
//!         store,
//!     ));
//!     let sessions = AuthSessionManager::new(
//!         Arc::new(InMemoryUserRepository::new()),
//!         tokens,
//!         Arc::new(Argon2PasswordHasher::default()),
//!     );
//!
//!     let login = sessions.login("alice", "correct horse").await?;
//!     println!("access token expires at {}", login.expires_at);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Access tokens, refresh tokens, password hashing and sessions
pub mod auth;

/// Error types shared by every component
pub mod error;

/// User records and repositories
pub mod user;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use error::{AuthError, AuthResult, ErrorKind};

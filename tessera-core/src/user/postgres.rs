use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{User, UserRepository, UserRole};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed implementation of [`UserRepository`] over the `users`
/// table.
#[derive(Debug, Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> AuthResult<User> {
        let id: String = row
            .try_get("id")
            .map_err(|e| AuthError::system_with("failed to read user id", e))?;
        let username: String = row
            .try_get("username")
            .map_err(|e| AuthError::system_with("failed to read username", e))?;
        let password_hash: String = row
            .try_get("password_hash")
            .map_err(|e| AuthError::system_with("failed to read password hash", e))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| AuthError::system_with("failed to read role", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::system_with("failed to read created_at", e))?;
        let updated_at: DateTime<Utc> = row
            .try_get("updated_at")
            .map_err(|e| AuthError::system_with("failed to read updated_at", e))?;
        let last_login_at: Option<DateTime<Utc>> = row
            .try_get("last_login_at")
            .map_err(|e| AuthError::system_with("failed to read last_login_at", e))?;

        let role = role
            .parse::<UserRole>()
            .map_err(|e| AuthError::system_with("stored user has an invalid role", e))?;

        Ok(User {
            id,
            username,
            password_hash,
            role,
            created_at,
            updated_at,
            last_login_at,
        })
    }

    /// Insert a user row. A duplicate id or username is a conflict.
    pub async fn create(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, password_hash, role,
                created_at, updated_at, last_login_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.is_unique_violation()
            {
                return AuthError::conflict("user already exists");
            }
            AuthError::system_with("failed to create user", e)
        })?;

        Ok(())
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_username(&self, username: &str) -> AuthResult<User> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to load user by username", e))?
        .ok_or_else(|| AuthError::not_found("user not found"))?;

        Self::map_row(&row)
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<User> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, role,
                   created_at, updated_at, last_login_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to load user by id", e))?
        .ok_or_else(|| AuthError::not_found("user not found"))?;

        Self::map_row(&row)
    }

    async fn update_last_login(&self, id: &str) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to update last login", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::not_found("user not found"));
        }

        Ok(())
    }
}

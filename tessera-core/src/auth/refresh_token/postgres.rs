use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{NewRefreshToken, RefreshToken, RefreshTokenId, RefreshTokenStore};
use crate::error::{AuthError, AuthResult};

const BASE_COLUMNS: &str = "id, token, user_id, expires_at, revoked, created_at";

/// Columns added by later migrations. Databases that predate them still work;
/// the store simply neither reads nor writes what is not there.
#[derive(Debug, Clone, Copy, Default)]
struct OptionalColumns {
    issued_at: bool,
    last_used_at: bool,
    client_info: bool,
    ip_address: bool,
}

impl OptionalColumns {
    fn from_names(names: &HashSet<String>) -> Self {
        Self {
            issued_at: names.contains("issued_at"),
            last_used_at: names.contains("last_used_at"),
            client_info: names.contains("client_info"),
            ip_address: names.contains("ip_address"),
        }
    }

    fn select_list(&self) -> String {
        let mut columns = String::from(BASE_COLUMNS);
        for (present, name) in [
            (self.issued_at, "issued_at"),
            (self.last_used_at, "last_used_at"),
            (self.client_info, "client_info"),
            (self.ip_address, "ip_address"),
        ] {
            if present {
                columns.push_str(", ");
                columns.push_str(name);
            }
        }
        columns
    }
}

/// PostgreSQL-backed [`RefreshTokenStore`] over the `refresh_tokens` table.
///
/// Uniqueness of `token` is enforced by the table's unique constraint; the
/// store inserts directly and translates the violation into a conflict.
#[derive(Debug)]
pub struct PostgresRefreshTokenStore {
    pool: PgPool,
    columns: OnceCell<OptionalColumns>,
}

impl PostgresRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            columns: OnceCell::new(),
        }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn columns(&self) -> AuthResult<OptionalColumns> {
        self.columns
            .get_or_try_init(|| async {
                let rows = sqlx::query(
                    r#"
                    SELECT column_name::text AS column_name
                    FROM information_schema.columns
                    WHERE table_schema = current_schema()
                      AND table_name = 'refresh_tokens'
                    "#,
                )
                .fetch_all(self.pool())
                .await
                .map_err(|e| AuthError::system_with("failed to inspect refresh_tokens schema", e))?;

                let names = rows
                    .iter()
                    .map(|row| row.try_get::<String, _>("column_name"))
                    .collect::<Result<HashSet<_>, _>>()
                    .map_err(|e| AuthError::system_with("failed to read column name", e))?;

                let columns = OptionalColumns::from_names(&names);
                debug!(?columns, "resolved refresh_tokens optional columns");
                Ok(columns)
            })
            .await
            .copied()
    }

    fn parse_id(id: &RefreshTokenId) -> AuthResult<i64> {
        id.as_str()
            .parse::<i64>()
            .map_err(|_| AuthError::validation("invalid token id format"))
    }

    fn map_row(row: &PgRow, columns: OptionalColumns) -> AuthResult<RefreshToken> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| AuthError::system_with("failed to read refresh token id", e))?;
        let token: String = row
            .try_get("token")
            .map_err(|e| AuthError::system_with("failed to read refresh token", e))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| AuthError::system_with("failed to read user_id", e))?;
        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .map_err(|e| AuthError::system_with("failed to read expires_at", e))?;
        let is_revoked: bool = row
            .try_get("revoked")
            .map_err(|e| AuthError::system_with("failed to read revoked", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::system_with("failed to read created_at", e))?;

        let issued_at = if columns.issued_at {
            row.try_get::<Option<DateTime<Utc>>, _>("issued_at")
                .map_err(|e| AuthError::system_with("failed to read issued_at", e))?
                .unwrap_or(created_at)
        } else {
            created_at
        };
        let last_used_at = if columns.last_used_at {
            row.try_get("last_used_at")
                .map_err(|e| AuthError::system_with("failed to read last_used_at", e))?
        } else {
            None
        };
        let client_info = if columns.client_info {
            row.try_get("client_info")
                .map_err(|e| AuthError::system_with("failed to read client_info", e))?
        } else {
            None
        };
        let ip = if columns.ip_address {
            row.try_get("ip_address")
                .map_err(|e| AuthError::system_with("failed to read ip_address", e))?
        } else {
            None
        };

        Ok(RefreshToken {
            id: RefreshTokenId::new(id.to_string()),
            token,
            user_id,
            issued_at,
            expires_at,
            last_used_at,
            is_revoked,
            client_info,
            ip,
        })
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresRefreshTokenStore {
    async fn store(&self, token: NewRefreshToken) -> AuthResult<RefreshToken> {
        let columns = self.columns().await?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, revoked, created_at",
        );
        if columns.issued_at {
            builder.push(", issued_at");
        }
        if columns.client_info {
            builder.push(", client_info");
        }
        if columns.ip_address {
            builder.push(", ip_address");
        }
        builder.push(") VALUES (");

        let mut values = builder.separated(", ");
        values.push_bind(token.token.clone());
        values.push_bind(token.user_id.clone());
        values.push_bind(token.expires_at);
        values.push_bind(false);
        values.push_bind(token.issued_at);
        if columns.issued_at {
            values.push_bind(token.issued_at);
        }
        if columns.client_info {
            values.push_bind(token.client.client_info.clone());
        }
        if columns.ip_address {
            values.push_bind(token.client.ip.clone());
        }
        values.push_unseparated(") RETURNING id");

        let row = builder
            .build()
            .fetch_one(self.pool())
            .await
            .map_err(|e| {
                if let Some(db_err) = e.as_database_error()
                    && db_err.is_unique_violation()
                {
                    return AuthError::conflict("token already exists");
                }
                AuthError::system_with("failed to store refresh token", e)
            })?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| AuthError::system_with("failed to read refresh token id", e))?;

        let mut record = token.into_record(RefreshTokenId::new(id.to_string()));
        if !columns.client_info {
            record.client_info = None;
        }
        if !columns.ip_address {
            record.ip = None;
        }
        Ok(record)
    }

    async fn get_by_token(&self, token: &str) -> AuthResult<RefreshToken> {
        let columns = self.columns().await?;
        let sql = format!(
            "SELECT {} FROM refresh_tokens WHERE token = $1",
            columns.select_list()
        );

        let row = sqlx::query(&sql)
            .bind(token)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| AuthError::system_with("failed to get refresh token", e))?
            .ok_or_else(|| AuthError::not_found("token not found"))?;

        Self::map_row(&row, columns)
    }

    async fn revoke(&self, id: &RefreshTokenId) -> AuthResult<()> {
        let id = Self::parse_id(id)?;

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to revoke refresh token", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::not_found("token not found"));
        }

        Ok(())
    }

    async fn get_by_user_id(&self, user_id: &str) -> AuthResult<Vec<RefreshToken>> {
        let columns = self.columns().await?;
        let sql = format!(
            "SELECT {} FROM refresh_tokens WHERE user_id = $1 ORDER BY id ASC",
            columns.select_list()
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await
            .map_err(|e| AuthError::system_with("failed to get refresh tokens for user", e))?;

        rows.iter()
            .map(|row| Self::map_row(row, columns))
            .collect()
    }

    async fn update_last_used(&self, id: &RefreshTokenId, at: DateTime<Utc>) -> AuthResult<()> {
        let id = Self::parse_id(id)?;

        if !self.columns().await?.last_used_at {
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET last_used_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to update last used timestamp", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::not_found("token not found"));
        }

        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: &str) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE user_id = $1
              AND NOT revoked
            "#,
        )
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to revoke all tokens for user", e))?;

        Ok(())
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE expires_at < $1
            "#,
        )
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to delete expired tokens", e))?;

        debug!(removed = result.rows_affected(), "swept expired refresh tokens");
        Ok(result.rows_affected())
    }

    async fn count(&self, user_id: &str) -> AuthResult<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM refresh_tokens
            WHERE user_id = $1
              AND NOT revoked
              AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await
        .map_err(|e| AuthError::system_with("failed to count active tokens", e))?;

        usize::try_from(count).map_err(|e| AuthError::system_with("invalid token count", e))
    }
}

//! PostgreSQL refresh-token store and user repository behaviour.
//!
//! These need a reachable `DATABASE_URL`; run with `cargo test -- --ignored`.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tessera_core::{
    ErrorKind,
    auth::{ClientMetadata, NewRefreshToken, PostgresRefreshTokenStore, RefreshTokenId, RefreshTokenStore},
    user::{PostgresUserRepository, User, UserRepository, UserRole},
};

fn new_token(token: &str, user_id: &str, ttl: Duration) -> NewRefreshToken {
    let now = Utc::now();
    NewRefreshToken::new(token, user_id, now, now + ttl)
}

#[sqlx::test(migrator = "tessera_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn stores_and_revokes(pool: PgPool) -> Result<()> {
    let store = PostgresRefreshTokenStore::new(pool);

    let client = ClientMetadata {
        client_info: Some("integration".into()),
        ip: Some("127.0.0.1".into()),
    };
    let stored = store
        .store(new_token("pg-token", "u1", Duration::hours(1)).with_client(client))
        .await?;
    assert!(stored.id.as_str().parse::<i64>().is_ok());

    let fetched = store.get_by_token("pg-token").await?;
    assert_eq!(fetched.user_id, "u1");
    assert_eq!(fetched.client_info.as_deref(), Some("integration"));
    assert_eq!(fetched.ip.as_deref(), Some("127.0.0.1"));
    assert!(fetched.is_valid());

    store.revoke(&stored.id).await?;
    store.revoke(&stored.id).await?;
    assert!(store.get_by_token("pg-token").await?.is_revoked);
    assert_eq!(store.count("u1").await?, 0);
    Ok(())
}

#[sqlx::test(migrator = "tessera_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_token_is_a_conflict(pool: PgPool) -> Result<()> {
    let store = PostgresRefreshTokenStore::new(pool);
    store
        .store(new_token("dup", "u1", Duration::hours(1)))
        .await?;

    let err = store
        .store(new_token("dup", "u2", Duration::hours(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(store.get_by_user_id("u2").await?.is_empty());
    Ok(())
}

#[sqlx::test(migrator = "tessera_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn unknown_and_malformed_ids(pool: PgPool) -> Result<()> {
    let store = PostgresRefreshTokenStore::new(pool);

    let err = store.revoke(&RefreshTokenId::new("999999")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store
        .revoke(&RefreshTokenId::new("not-a-number"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = store
        .update_last_used(&RefreshTokenId::new("999999"), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert!(store.get_by_token("missing").await.unwrap_err().is_not_found());
    Ok(())
}

#[sqlx::test(migrator = "tessera_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn sweep_and_count(pool: PgPool) -> Result<()> {
    let store = PostgresRefreshTokenStore::new(pool);
    store
        .store(new_token("expired", "u1", Duration::seconds(-10)))
        .await?;
    let live = store
        .store(new_token("live", "u1", Duration::hours(1)))
        .await?;
    store
        .store(new_token("other", "u2", Duration::hours(1)))
        .await?;

    assert_eq!(store.count("u1").await?, 1);
    assert_eq!(store.delete_expired().await?, 1);
    assert!(store.get_by_token("expired").await.unwrap_err().is_not_found());

    let remaining = store.get_by_user_id("u1").await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, live.id);

    let at = Utc::now();
    store.update_last_used(&live.id, at).await?;
    let touched = store.get_by_token("live").await?;
    assert!(touched.last_used_at.is_some());

    store.revoke_all_for_user("u1").await?;
    store.revoke_all_for_user("nobody").await?;
    assert_eq!(store.count("u1").await?, 0);
    assert_eq!(store.count("u2").await?, 1);
    Ok(())
}

#[sqlx::test(migrator = "tessera_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn tolerates_missing_optional_columns(pool: PgPool) -> Result<()> {
    sqlx::query(
        r#"
        ALTER TABLE refresh_tokens
            DROP COLUMN issued_at,
            DROP COLUMN last_used_at,
            DROP COLUMN client_info,
            DROP COLUMN ip_address
        "#,
    )
    .execute(&pool)
    .await?;

    let store = PostgresRefreshTokenStore::new(pool);
    let stored = store
        .store(new_token("legacy", "u1", Duration::hours(1)))
        .await?;

    store.update_last_used(&stored.id, Utc::now()).await?;
    let fetched = store.get_by_token("legacy").await?;
    assert!(fetched.last_used_at.is_none());
    assert!(fetched.client_info.is_none());
    Ok(())
}

#[sqlx::test(migrator = "tessera_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn user_repository_round_trip(pool: PgPool) -> Result<()> {
    let users = PostgresUserRepository::new(pool);
    let user = User::new("u1", "dave", "$argon2id$stub", UserRole::Manager)?;
    users.create(&user).await?;

    let err = users.create(&user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let by_name = users.find_by_username("dave").await?;
    assert_eq!(by_name.id, "u1");
    assert_eq!(by_name.role, UserRole::Manager);
    assert!(by_name.last_login_at.is_none());

    users.update_last_login("u1").await?;
    assert!(users.find_by_id("u1").await?.last_login_at.is_some());

    assert!(users.find_by_id("ghost").await.unwrap_err().is_not_found());
    assert!(users.update_last_login("ghost").await.unwrap_err().is_not_found());
    Ok(())
}

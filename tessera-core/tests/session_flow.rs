//! End-to-end session lifecycle over the in-memory backends.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use argon2::Params;
use chrono::Duration;
use tessera_core::{
    ErrorKind,
    auth::{
        Argon2PasswordHasher, AuthSessionManager, DeadlineRefreshTokenStore,
        InMemoryRefreshTokenStore, PasswordHasher, RefreshTokenStore, TokenService,
    },
    user::{InMemoryUserRepository, User, UserRole},
};

const TEST_USERNAME: &str = "carol";
const TEST_PASSWORD: &str = "CorrectHorseBattery1!";

struct Harness {
    sessions: AuthSessionManager,
    users: Arc<InMemoryUserRepository>,
    store: Arc<InMemoryRefreshTokenStore>,
}

fn build(refresh_ttl: Duration) -> Result<Harness> {
    let hasher = Arc::new(Argon2PasswordHasher::with_params(
        Params::new(1024, 1, 1, None).map_err(|e| anyhow::anyhow!("{e}"))?,
    ));

    let users = Arc::new(InMemoryUserRepository::new());
    users.insert(User::new(
        "user-1",
        TEST_USERNAME,
        hasher.hash_password(TEST_PASSWORD)?,
        UserRole::Tester,
    )?)?;

    let store = Arc::new(InMemoryRefreshTokenStore::new());
    let guarded: Arc<dyn RefreshTokenStore> = Arc::new(DeadlineRefreshTokenStore::new(
        store.clone(),
        StdDuration::from_secs(5),
    ));
    let tokens = Arc::new(TokenService::with_store(
        "integration-secret",
        Duration::minutes(15),
        refresh_ttl,
        guarded,
    ));
    let sessions = AuthSessionManager::new(users.clone(), tokens, hasher);

    Ok(Harness {
        sessions,
        users,
        store,
    })
}

#[tokio::test]
async fn login_refresh_logout_cycle() -> Result<()> {
    let h = build(Duration::hours(24))?;

    let login = h.sessions.login(TEST_USERNAME, TEST_PASSWORD).await?;
    let me = h.sessions.validate_token(&login.access_token).await?;
    assert_eq!(me.id, "user-1");

    let refreshed = h.sessions.refresh_token(&login.refresh_token).await?;
    assert_eq!(refreshed.user.id, "user-1");
    assert_eq!(h.store.count("user-1").await?, 2);

    h.sessions.logout(&refreshed.refresh_token).await?;
    assert_eq!(h.store.count("user-1").await?, 1);

    let err = h
        .sessions
        .refresh_token(&refreshed.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // The original refresh token was never rotated out.
    h.sessions.refresh_token(&login.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn revoking_every_session_for_a_user() -> Result<()> {
    let h = build(Duration::hours(24))?;

    let first = h.sessions.login(TEST_USERNAME, TEST_PASSWORD).await?;
    let second = h.sessions.login(TEST_USERNAME, TEST_PASSWORD).await?;
    assert_eq!(h.store.count("user-1").await?, 2);

    h.store.revoke_all_for_user("user-1").await?;

    for token in [&first.refresh_token, &second.refresh_token] {
        let err = h.sessions.refresh_token(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
    assert_eq!(h.store.count("user-1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn sweep_clears_expired_sessions() -> Result<()> {
    let h = build(Duration::seconds(-1))?;

    let login = h.sessions.login(TEST_USERNAME, TEST_PASSWORD).await?;
    assert_eq!(h.store.len(), 1);

    let err = h
        .sessions
        .refresh_token(&login.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    assert_eq!(h.store.delete_expired().await?, 1);
    assert!(h.store.get_by_user_id("user-1").await?.is_empty());

    // Logging out with a swept token still succeeds.
    h.sessions.logout(&login.refresh_token).await?;
    Ok(())
}

#[tokio::test]
async fn deleted_user_loses_access() -> Result<()> {
    let h = build(Duration::hours(24))?;
    let login = h.sessions.login(TEST_USERNAME, TEST_PASSWORD).await?;

    h.users.remove("user-1");

    let err = h
        .sessions
        .validate_token(&login.access_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = h
        .sessions
        .refresh_token(&login.refresh_token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    Ok(())
}

#[tokio::test]
async fn system_failures_hide_their_detail() -> Result<()> {
    let h = build(Duration::hours(24))?;
    let broken = TokenService::new("", Duration::minutes(15), Duration::hours(1));

    let user = h.users.remove("user-1").expect("seeded user");
    let err = broken.generate_token(&user).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::System);
    assert_eq!(err.public_message(), "internal server error");
    assert!(err.detailed().contains("signing secret"));
    Ok(())
}

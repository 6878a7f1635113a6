use std::{fmt, sync::Arc};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tessera_core::{
    ErrorKind,
    auth::{
        Argon2PasswordHasher, AuthSessionManager, DeadlineRefreshTokenStore,
        InMemoryRefreshTokenStore, PasswordHasher, PostgresRefreshTokenStore, RefreshTokenStore,
        TokenService,
    },
    user::{InMemoryUserRepository, PostgresUserRepository, User, UserRepository, UserRole},
};
use tracing::info;
use uuid::Uuid;

use crate::infra::config::{BootstrapAdmin, Config, RefreshTokenMode};

fn bootstrap_user(admin: &BootstrapAdmin) -> anyhow::Result<User> {
    User::new(
        Uuid::new_v4().to_string(),
        admin.username.clone(),
        admin.password_hash.clone(),
        UserRole::Admin,
    )
    .context("invalid bootstrap admin")
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<AuthSessionManager>,
    /// The token service's refresh-token store; absent when stateless.
    pub refresh_tokens: Option<Arc<dyn RefreshTokenStore>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the session manager from already-built parts. A store, when
    /// given, is wrapped so each call honours `config.store_timeout`.
    pub fn from_parts(
        config: Config,
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        store: Option<Arc<dyn RefreshTokenStore>>,
    ) -> anyhow::Result<Self> {
        let access_ttl = config.access_token_ttl()?;
        let refresh_ttl = config.refresh_token_ttl()?;

        let store: Option<Arc<dyn RefreshTokenStore>> = store.map(|inner| {
            Arc::new(DeadlineRefreshTokenStore::new(inner, config.store_timeout))
                as Arc<dyn RefreshTokenStore>
        });

        let tokens = Arc::new(match store {
            Some(store) => TokenService::with_store(
                config.jwt_secret.as_bytes(),
                access_ttl,
                refresh_ttl,
                store,
            ),
            None => TokenService::new(config.jwt_secret.as_bytes(), access_ttl, refresh_ttl),
        });
        let refresh_tokens = tokens.refresh_token_store().cloned();

        let sessions = Arc::new(AuthSessionManager::new(users, tokens, hasher));

        Ok(Self {
            config: Arc::new(config),
            sessions,
            refresh_tokens,
        })
    }

    /// Build the state the configured deployment mode calls for.
    ///
    /// Postgres mode reads users from the database and runs migrations on
    /// startup. The other modes serve users from an in-memory repository,
    /// `users` when given. A configured bootstrap admin is added to either.
    pub async fn from_config(
        config: Config,
        users: Option<Arc<InMemoryUserRepository>>,
    ) -> anyhow::Result<Self> {
        let hasher: Arc<dyn PasswordHasher> =
            Arc::new(Argon2PasswordHasher::new(config.password_hash_cost));

        match config.refresh_token_mode {
            RefreshTokenMode::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL must be set when REFRESH_TOKEN_MODE=postgres")?;

                let pool = PgPoolOptions::new()
                    .acquire_timeout(config.store_timeout)
                    .connect(url)
                    .await
                    .context("failed to connect to PostgreSQL")?;
                tessera_core::MIGRATOR
                    .run(&pool)
                    .await
                    .context("failed to apply database migrations")?;
                info!("database migrations applied");

                let repository = PostgresUserRepository::new(pool.clone());
                if let Some(admin) = &config.bootstrap_admin {
                    match repository.create(&bootstrap_user(admin)?).await {
                        Ok(()) => info!(username = %admin.username, "bootstrap admin created"),
                        Err(err) if err.kind() == ErrorKind::Conflict => {
                            info!(username = %admin.username, "bootstrap admin already present")
                        }
                        Err(err) => {
                            return Err(anyhow::Error::new(err).context("failed to seed admin"));
                        }
                    }
                }

                let users: Arc<dyn UserRepository> = Arc::new(repository);
                let store: Arc<dyn RefreshTokenStore> =
                    Arc::new(PostgresRefreshTokenStore::new(pool));
                Self::from_parts(config, users, hasher, Some(store))
            }
            RefreshTokenMode::Memory => {
                let users: Arc<dyn UserRepository> = seed_memory_users(&config, users)?;
                let store: Arc<dyn RefreshTokenStore> =
                    Arc::new(InMemoryRefreshTokenStore::new());
                Self::from_parts(config, users, hasher, Some(store))
            }
            RefreshTokenMode::Stateless => {
                let users: Arc<dyn UserRepository> = seed_memory_users(&config, users)?;
                Self::from_parts(config, users, hasher, None)
            }
        }
    }
}

fn seed_memory_users(
    config: &Config,
    users: Option<Arc<InMemoryUserRepository>>,
) -> anyhow::Result<Arc<InMemoryUserRepository>> {
    let users = users.unwrap_or_default();
    if let Some(admin) = &config.bootstrap_admin {
        users
            .insert(bootstrap_user(admin)?)
            .context("failed to register bootstrap admin")?;
        info!(username = %admin.username, "bootstrap admin registered");
    }
    Ok(users)
}

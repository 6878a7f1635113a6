use anyhow::{Context, anyhow, bail};
use std::{env, fmt, str::FromStr, time::Duration};
use tessera_core::auth::Argon2PasswordHasher;

/// Where refresh tokens are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenMode {
    /// Process-local store; revocable, lost on restart.
    Memory,
    /// `refresh_tokens` table in PostgreSQL.
    Postgres,
    /// Nothing is stored; tokens cannot be revoked before they expire.
    Stateless,
}

impl FromStr for RefreshTokenMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            "stateless" => Ok(Self::Stateless),
            other => Err(anyhow!(
                "unknown refresh token mode {other:?} (expected memory, postgres or stateless)"
            )),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,

    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub password_hash_cost: u32,

    pub refresh_token_mode: RefreshTokenMode,
    pub database_url: Option<String>,
    /// Upper bound on any single refresh-token store call.
    pub store_timeout: Duration,
    /// Zero disables the periodic expiry sweep.
    pub token_sweep_interval: Duration,

    /// Admin seeded into the in-memory user repository at startup.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// Username and pre-computed password hash (see `hash-password`).
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password_hash: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("password_hash_cost", &self.password_hash_cost)
            .field("refresh_token_mode", &self.refresh_token_mode)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("store_timeout", &self.store_timeout)
            .field("token_sweep_interval", &self.token_sweep_interval)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` is this over
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let server_port = match var("SERVER_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid SERVER_PORT {raw:?}"))?,
            None => 3000,
        };

        let password_hash_cost = match var("PASSWORD_HASH_COST") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid PASSWORD_HASH_COST {raw:?}"))?,
            None => Argon2PasswordHasher::DEFAULT_COST,
        };

        let refresh_token_mode = match var("REFRESH_TOKEN_MODE") {
            Some(raw) => raw.parse()?,
            None => RefreshTokenMode::Memory,
        };

        let database_url = var("DATABASE_URL");
        if refresh_token_mode == RefreshTokenMode::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when REFRESH_TOKEN_MODE=postgres");
        }

        let bootstrap_admin = match (var("ADMIN_USERNAME"), var("ADMIN_PASSWORD_HASH")) {
            (Some(username), Some(password_hash)) => Some(BootstrapAdmin {
                username,
                password_hash,
            }),
            (None, None) => None,
            _ => bail!("ADMIN_USERNAME and ADMIN_PASSWORD_HASH must be set together"),
        };

        Ok(Self {
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            jwt_secret,
            access_token_ttl: duration(&var, "ACCESS_TOKEN_TTL", "15m")?,
            refresh_token_ttl: duration(&var, "REFRESH_TOKEN_TTL", "24h")?,
            password_hash_cost,
            refresh_token_mode,
            database_url,
            store_timeout: duration(&var, "STORE_TIMEOUT", "5s")?,
            token_sweep_interval: duration(&var, "TOKEN_SWEEP_INTERVAL", "10m")?,
            bootstrap_admin,
        })
    }

    pub fn access_token_ttl(&self) -> anyhow::Result<chrono::Duration> {
        chrono::Duration::from_std(self.access_token_ttl).context("ACCESS_TOKEN_TTL is too large")
    }

    pub fn refresh_token_ttl(&self) -> anyhow::Result<chrono::Duration> {
        chrono::Duration::from_std(self.refresh_token_ttl)
            .context("REFRESH_TOKEN_TTL is too large")
    }
}

fn duration<F>(var: &F, key: &str, default: &str) -> anyhow::Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(key).unwrap_or_else(|| default.to_string());
    humantime::parse_duration(raw.trim()).with_context(|| format!("invalid {key} {raw:?}"))
}

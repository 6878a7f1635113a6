use std::net::SocketAddr;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tessera_core::auth::{Argon2PasswordHasher, PasswordHasher};
use tessera_server::{
    infra::{app_state::AppState, config::Config, sweeper::spawn_token_sweeper},
    routes,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "tessera-server")]
#[command(about = "Authentication server issuing access and refresh tokens")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print an Argon2 hash for seeding a user record, then exit
    HashPassword {
        password: String,

        /// Argon2 iteration count; out-of-range values use the default
        #[arg(long, default_value_t = Argon2PasswordHasher::DEFAULT_COST)]
        cost: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::HashPassword { password, cost }) => {
            let hash = Argon2PasswordHasher::new(cost)
                .hash_password(&password)
                .context("failed to hash password")?;
            println!("{hash}");
            Ok(())
        }
        Some(Command::Serve) | None => run_server(cli.serve).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    init_tracing();

    if let Some(host) = args.host {
        config.server_host = host;
    }
    if let Some(port) = args.port {
        config.server_port = port;
    }

    info!(
        mode = ?config.refresh_token_mode,
        access_ttl = ?config.access_token_ttl,
        refresh_ttl = ?config.refresh_token_ttl,
        "starting tessera-server"
    );

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server_host, config.server_port
            )
        })?;
    let sweep_interval = config.token_sweep_interval;

    let state = AppState::from_config(config, None).await?;

    let sweeper = match &state.refresh_tokens {
        Some(store) => spawn_token_sweeper(store.clone(), sweep_interval),
        None => {
            warn!("refresh tokens are stateless; logout cannot revoke them");
            None
        }
    };

    let router = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

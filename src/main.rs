use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agora::config::{Cli, Config};
use agora::state::AppState;
use agora::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    if config.auth.jwt_secret == agora::config::AuthConfig::default().jwt_secret {
        tracing::warn!("Using the built-in JWT secret; set AGORA_AUTH__JWT_SECRET in production");
    }

    // Initialize database
    let db_path = config.db_path();
    tracing::info!("Database: {}", db_path.display());
    let pool = db::create_pool(&db_path)?;
    db::run_migrations(&pool)?;

    let state = AppState::new(pool, config.clone())?;
    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

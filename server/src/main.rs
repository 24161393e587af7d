//! Storysync Server binary.

use storysync_server::config::Config;
use storysync_server::db;
use storysync_server::repository::Repository;
use storysync_server::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storysync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Storysync Server on {}:{}", config.host, config.port);

    let repository = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            Repository::postgres(pool, config.snapshot_retention)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; documents are kept in memory");
            Repository::memory(config.snapshot_retention)
        }
    };

    let addr = format!("{}:{}", config.host, config.port);
    let app = app(AppState::new(repository, config));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

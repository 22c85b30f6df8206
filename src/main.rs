use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trainhub::api::routes::create_routes;
use trainhub::config::{run_migrations, AppConfig, DatabaseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;

    let db = db_config.create_pool().await?;
    run_migrations(&db).await?;

    let app = create_routes(db, &config);

    let listener = TcpListener::bind(config.server_address()).await?;
    info!(
        "TrainHub server starting on http://{}",
        config.server_address()
    );

    axum::serve(listener, app).await?;

    Ok(())
}

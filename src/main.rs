use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use reviewdesk::config::AppConfig;
use reviewdesk::db;
use reviewdesk::routes;
use reviewdesk::state::AppState;
use reviewdesk::storage::{MemoryObjectStorage, ObjectStorage, S3Storage};
use reviewdesk::store::{DocumentStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        s3_bucket = config.s3_bucket.as_deref().unwrap_or("memory"),
        "loaded configuration"
    );

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool_with_size(url, config.database_max_pool_size)?;
            db::run_migrations(&pool)?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let storage: Arc<dyn ObjectStorage> = match &config.s3_bucket {
        Some(_) => Arc::new(S3Storage::from_config(&config).await?),
        None => {
            tracing::warn!("S3_BUCKET not set; uploaded files are kept in memory");
            Arc::new(MemoryObjectStorage::new())
        }
    };

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::new(config, store, storage)?;
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

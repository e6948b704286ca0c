//! Serve contact submissions and paged reads over HTTP.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use config::{Config, StorageBackend};
use contacts_common::metrics::setup_metrics_routes;
use contacts_common::store::{ContactStore, MemoryContactStore, PgContactStore};
use handlers::AppState;

mod config;
mod handlers;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn create_store(config: &Config) -> Result<Arc<dyn ContactStore>> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let store = PgContactStore::connect(
                &config.database_url,
                config.max_pg_connections,
                config.acquire_timeout(),
            )
            .await
            .wrap_err("failed to connect to postgres")?;

            tracing::info!("using postgres storage backend");
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage backend, contacts will not survive a restart");
            Ok(Arc::new(MemoryContactStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::init_from_env().wrap_err("failed to load configuration from env")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .wrap_err_with(|| format!("failed to create upload dir {}", config.upload_dir.display()))?;

    let store = create_store(&config).await?;
    let state = AppState::new(store, config.upload_dir.clone());

    let app = handlers::add_routes(
        Router::new(),
        state,
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = setup_metrics_routes(app);

    tracing::info!("listening on {}", config.bind());
    match listen(app, config.bind()).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start contacts-api http server, {}", e),
    }

    Ok(())
}

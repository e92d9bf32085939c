use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_utils;

use services::{chunk_store::ChunkStore, store_handle::StoreHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-store with config: {:?}", cfg);

    // --- Handle migration mode ---
    if migrate {
        let db = connect(&cfg.database_url).await?;
        services::chunk_store::MIGRATOR.run(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Store comes up in the background; handlers see it once ready ---
    let store = StoreHandle::new();
    tokio::spawn(initialize_store(cfg.clone(), store.clone()));

    // --- Build router ---
    let state = state::AppState::new(store).with_download_content_type(cfg.download_content_type);
    let app = routes::routes::app(state, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the database, apply the schema and publish the store.
///
/// Failure is logged and the service keeps answering with "not ready".
async fn initialize_store(cfg: config::AppConfig, handle: StoreHandle) {
    let result = async {
        let db = Arc::new(connect(&cfg.database_url).await?);
        tracing::info!("Database connected");
        let store = ChunkStore::initialize(db, cfg.bucket.clone(), cfg.chunk_size).await?;
        anyhow::Ok(store)
    }
    .await;

    match result {
        Ok(store) => {
            tracing::info!(
                bucket = store.bucket(),
                chunk_size = store.chunk_size(),
                "Chunk store initialized"
            );
            handle.mark_ready(store);
        }
        Err(err) => tracing::error!("Chunk store initialization failed: {:#}", err),
    }
}

/// Connect to SQLite, creating the database file and its directory if needed.
async fn connect(db_url: &str) -> Result<SqlitePool> {
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if !db_path.starts_with(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {:?}", parent))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database URL `{}`", db_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

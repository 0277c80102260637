use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, Backend};
use services::{
    blob_store::BlobStore, disk_store::DiskStore, memory_store::MemoryBlobStore,
    sniffer::InferSniffer, upload_service::UploadService,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting upload-gateway with config: {:?}", cfg);
    if cfg.upload.allowed_usernames.is_empty() {
        tracing::warn!("USERNAME_ALLOW_LIST is empty, every upload will be refused");
    }

    // --- Initialize blob store ---
    let store: Arc<dyn BlobStore> = match cfg.backend {
        Backend::Disk => {
            let disk = open_disk_store(&cfg).await?;
            disk.migrate().await.context("applying metadata schema")?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            Arc::new(disk)
        }
        Backend::Memory => {
            if migrate {
                tracing::info!("Memory backend has no schema, nothing to migrate.");
                return Ok(());
            }
            Arc::new(MemoryBlobStore::new(cfg.public_endpoint.clone()))
        }
    };

    // --- Initialize core service ---
    let uploads = UploadService::new(cfg.upload.clone(), store.clone(), Arc::new(InferSniffer));

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState { uploads, store });

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

/// Prepare the storage directory and SQLite file, then open the disk store.
async fn open_disk_store(cfg: &AppConfig) -> Result<DiskStore> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = Path::new(db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // SQLite will not create the file itself unless asked to.
    if let Err(e) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(db_path)
    {
        tracing::warn!("Failed to open database file {:?}: {}", db_path, e);
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("connecting to {}", db_url))?;

    Ok(DiskStore::new(
        Arc::new(db),
        cfg.storage_dir.clone(),
        cfg.public_endpoint.clone(),
    ))
}

use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    auth::JwtVerifier,
    services::{
        analysis::{GeminiClient, ImageAnalyzer},
        blob_store::LocalBlobStore,
        chat::ChatAssistant,
        fetcher::HttpContentFetcher,
        upload_service::{DEFAULT_FOLDER, UploadService, UploadSettings},
    },
    state::AppState,
};

mod auth;
mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

/// Per-request budget for pulling a stored image back for analysis.
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting study-buddy with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Blob metadata database ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Collaborators, built once and injected ---
    let blobs = LocalBlobStore::new(db.clone(), cfg.storage_dir.clone(), cfg.public_url.clone());
    let fetcher = Arc::new(HttpContentFetcher::new(
        FETCH_TIMEOUT,
        cfg.max_upload_bytes,
    )?);
    let generator = Arc::new(
        GeminiClient::new(
            cfg.gemini_api_key.clone(),
            cfg.gemini_model.clone(),
            cfg.analysis_timeout,
        )?
        .with_base_url(cfg.gemini_base_url.clone()),
    );
    if cfg.gemini_api_key.is_none() {
        tracing::warn!(
            "GEMINI_API_KEY is not set; image uploads will skip AI analysis and chat is unavailable"
        );
    }
    let chat = ChatAssistant::new(generator.clone());
    let analyzer = ImageAnalyzer::new(fetcher, generator);

    let uploads = UploadService::new(
        Arc::new(blobs.clone()),
        analyzer.clone(),
        UploadSettings {
            folder: DEFAULT_FOLDER.to_string(),
            max_upload_bytes: cfg.max_upload_bytes,
            analysis_timeout: cfg.analysis_timeout,
        },
    );

    let state = AppState {
        uploads,
        blobs,
        analyzer,
        chat,
        auth: Arc::new(JwtVerifier::new(&cfg.jwt_secret)),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(state);

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

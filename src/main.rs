use anyhow::{Context, Result};
use std::{io::ErrorKind, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{
    AppState,
    auth::JwtAuthenticator,
    keys::OsRandom,
    object_storage::S3ObjectStorage,
    probe::FfProbe,
    thumbnail::ThumbnailIngestor,
    transcode::FfMpeg,
    video_pipeline::VideoPipeline,
    video_repo::SqliteVideoRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting reelhouse with config: {:?}", cfg);

    // --- Ensure local directories exist ---
    for dir in [&cfg.assets_root, &cfg.staging_dir] {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            fs::create_dir_all(dir).await?;
            tracing::info!("Created directory at {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db, db::MIGRATION_PATH).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize collaborators and pipelines ---
    let repo = Arc::new(SqliteVideoRepository::new(db.clone()));
    let auth = Arc::new(JwtAuthenticator::new(&cfg.jwt_secret));
    let random = Arc::new(OsRandom);
    let storage = S3ObjectStorage::new(
        cfg.s3_bucket.clone(),
        cfg.s3_region.clone(),
        cfg.s3_endpoint.clone(),
    )
    .context("building S3 client")?;

    let videos = VideoPipeline {
        repo: repo.clone(),
        auth: auth.clone(),
        prober: Arc::new(FfProbe::new(cfg.ffprobe_path.clone())),
        transcoder: Arc::new(FfMpeg::new(cfg.ffmpeg_path.clone())),
        storage: Arc::new(storage),
        random: random.clone(),
        staging_dir: cfg.staging_dir.clone(),
        max_upload_bytes: cfg.max_upload_bytes,
    };
    let thumbnails = ThumbnailIngestor {
        repo: repo.clone(),
        auth: auth.clone(),
        random,
        assets_root: cfg.assets_root.clone(),
        public_base_url: cfg.public_base_url.clone(),
        max_thumbnail_bytes: cfg.max_thumbnail_bytes,
    };

    let state = AppState {
        db,
        repo,
        auth,
        videos,
        thumbnails,
        assets_root: cfg.assets_root.clone(),
    };

    // --- Build router ---
    let app = routes::routes::routes(state);

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

//! Ingestion services and the collaborators they drive.

pub mod aspect;
pub mod auth;
#[cfg(test)]
pub mod fakes;
pub mod keys;
pub mod media_type;
pub mod object_storage;
pub mod probe;
pub mod staging;
pub mod thumbnail;
pub mod transcode;
pub mod video_pipeline;
pub mod video_repo;

use self::{
    auth::Authenticator, thumbnail::ThumbnailIngestor, video_pipeline::VideoPipeline,
    video_repo::VideoRepository,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite connection pool, also used by the readiness probe.
    pub db: Arc<SqlitePool>,
    pub repo: Arc<dyn VideoRepository>,
    pub auth: Arc<dyn Authenticator>,
    pub videos: VideoPipeline,
    pub thumbnails: ThumbnailIngestor,
    /// Directory served under `/assets`.
    pub assets_root: PathBuf,
}

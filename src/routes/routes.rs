//! Defines routes for video records, uploads and locally served assets.
//!
//! ## Structure
//! - **Health**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Video records**
//!   - `POST /api/videos`: create a draft video
//!   - `GET  /api/videos/{video_id}`: fetch a video
//!
//! - **Uploads** (multipart, bearer authenticated)
//!   - `POST /api/video_upload/{video_id}`: field `video`
//!   - `POST /api/thumbnail_upload/{video_id}`: field `thumbnail`
//!
//! - **Assets**
//!   - `GET  /assets/*`: files from the local asset directory

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        video_handlers::{create_video, get_video, upload_thumbnail, upload_video},
    },
    services::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::services::ServeDir;

/// Room for multipart boundaries and part headers on top of the payload cap.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Build the router. Upload routes get body limits matching the configured
/// payload caps; the services enforce the exact cap on the part itself.
pub fn routes(state: AppState) -> Router {
    let video_limit = body_limit(state.videos.max_upload_bytes);
    let thumbnail_limit = body_limit(state.thumbnails.max_thumbnail_bytes);
    let assets = ServeDir::new(&state.assets_root);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/videos", post(create_video))
        .route("/api/videos/{video_id}", get(get_video))
        .route(
            "/api/video_upload/{video_id}",
            post(upload_video).layer(DefaultBodyLimit::max(video_limit)),
        )
        .route(
            "/api/thumbnail_upload/{video_id}",
            post(upload_thumbnail).layer(DefaultBodyLimit::max(thumbnail_limit)),
        )
        .nest_service("/assets", assets)
        .with_state(state)
}

fn body_limit(payload_cap: u64) -> usize {
    usize::try_from(payload_cap.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX)
}

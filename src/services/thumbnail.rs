//! Thumbnail ingestion: small images written straight into the local asset
//! directory and served back by this process.

use crate::{
    errors::{PipelineError, PipelineResult},
    models::video::Video,
    services::{
        auth::Authenticator,
        keys::{RandomSource, asset_name},
        media_type::{IMAGE_JPEG, IMAGE_PNG, validate_media_type},
        video_repo::{VideoRepository, fetch_owned},
    },
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{io, path::PathBuf, sync::Arc};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

const ALLOWED: [&str; 2] = [IMAGE_JPEG, IMAGE_PNG];

#[derive(Clone)]
pub struct ThumbnailIngestor {
    pub repo: Arc<dyn VideoRepository>,
    pub auth: Arc<dyn Authenticator>,
    pub random: Arc<dyn RandomSource>,
    pub assets_root: PathBuf,
    /// Externally reachable base URL; assets live under `/assets`.
    pub public_base_url: String,
    pub max_thumbnail_bytes: u64,
}

fn extension_for(essence: &str) -> Option<&'static str> {
    match essence {
        IMAGE_JPEG => Some("jpg"),
        IMAGE_PNG => Some("png"),
        _ => None,
    }
}

impl ThumbnailIngestor {
    #[tracing::instrument(skip_all, fields(video_id = %video_id))]
    pub async fn upload_thumbnail<S>(
        &self,
        video_id: Uuid,
        token: &str,
        content_type: Option<&str>,
        body: S,
    ) -> PipelineResult<Video>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let user_id = self.auth.authenticate(token)?;
        let mut video = fetch_owned(self.repo.as_ref(), video_id, user_id).await?;

        let media_type = validate_media_type(content_type, &ALLOWED)?;
        let ext = extension_for(media_type.essence_str()).ok_or_else(|| {
            PipelineError::Validation(format!("invalid file type `{}`", media_type))
        })?;

        let image = self.read_capped(body).await?;

        let filename = format!("{}.{}", asset_name(self.random.as_ref()), ext);
        let path = self.assets_root.join(&filename);
        if let Err(err) = fs::write(&path, &image).await {
            remove_best_effort(&path).await;
            return Err(PipelineError::Staging(err));
        }

        video.thumbnail_url = Some(format!(
            "{}/assets/{}",
            self.public_base_url.trim_end_matches('/'),
            filename
        ));
        video.updated_at = Utc::now();
        if let Err(err) = self.repo.update_video(&video).await {
            remove_best_effort(&path).await;
            return Err(err.into());
        }

        info!(%user_id, file = %filename, size = image.len(), "thumbnail stored");
        Ok(video)
    }

    async fn read_capped<S>(&self, body: S) -> PipelineResult<Bytes>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut buffer = BytesMut::new();
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                PipelineError::Validation(format!("unable to read image: {}", err))
            })?;
            if (buffer.len() + chunk.len()) as u64 > self.max_thumbnail_bytes {
                return Err(PipelineError::Validation(format!(
                    "thumbnail exceeds the {} byte limit",
                    self.max_thumbnail_bytes
                )));
            }
            buffer.extend_from_slice(&chunk);
        }
        if buffer.is_empty() {
            return Err(PipelineError::Validation("thumbnail is empty".into()));
        }
        Ok(buffer.freeze())
    }
}

async fn remove_best_effort(path: &std::path::Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("couldn't remove {}: {}", path.display(), err),
    }
}

//! Video metadata persistence backed by SQLite.

use crate::{
    errors::{PipelineError, PipelineResult},
    models::video::{NewVideo, Video},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create_video(&self, user_id: Uuid, new: NewVideo) -> RepoResult<Video>;

    async fn get_video(&self, id: Uuid) -> RepoResult<Video>;

    /// Replace the stored record with `video` as a whole.
    async fn update_video(&self, video: &Video) -> RepoResult<()>;
}

/// Fetch `video_id` and check that `user_id` owns it.
pub async fn fetch_owned(
    repo: &dyn VideoRepository,
    video_id: Uuid,
    user_id: Uuid,
) -> PipelineResult<Video> {
    let video = repo.get_video(video_id).await?;
    if video.user_id != user_id {
        tracing::warn!(%video_id, %user_id, "upload attempted by non-owner");
        return Err(PipelineError::Authorization(video_id));
    }
    Ok(video)
}

#[derive(Clone)]
pub struct SqliteVideoRepository {
    db: Arc<SqlitePool>,
}

impl SqliteVideoRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoRepository for SqliteVideoRepository {
    async fn create_video(&self, user_id: Uuid, new: NewVideo) -> RepoResult<Video> {
        let now = Utc::now();
        let video = sqlx::query_as::<_, Video>(
            r#"
            INSERT INTO videos (
                id, user_id, title, description, thumbnail_url, video_url,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, NULL, NULL, ?, ?)
            RETURNING id, user_id, title, description, thumbnail_url, video_url,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;
        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> RepoResult<Video> {
        sqlx::query_as::<_, Video>(
            "SELECT id, user_id, title, description, thumbnail_url, video_url,
                    created_at, updated_at
             FROM videos WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => RepoError::NotFound(id),
            other => RepoError::Sqlx(other),
        })
    }

    async fn update_video(&self, video: &Video) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE videos
             SET user_id = ?, title = ?, description = ?, thumbnail_url = ?,
                 video_url = ?, created_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(video.user_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_url)
        .bind(&video.video_url)
        .bind(video.created_at)
        .bind(video.updated_at)
        .bind(video.id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(video.id));
        }
        Ok(())
    }
}

//! Represents a video record owned by a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user's video and the locations of its processed assets.
///
/// `video_url` is only ever written after a complete, successful upload
/// pipeline run; there are no intermediate states.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Video {
    /// Unique identifier for this video.
    pub id: Uuid,

    /// ID of the user that owns this video.
    pub user_id: Uuid,

    pub title: String,

    pub description: Option<String>,

    /// Locally served thumbnail URL.
    pub thumbnail_url: Option<String>,

    /// Object storage URL of the fast-start processed video.
    pub video_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a user registers a new draft video.
#[derive(Deserialize, Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
}

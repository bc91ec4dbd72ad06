use crate::services::{
    auth::AuthError, object_storage::ObjectStorageError, probe::ProbeError,
    transcode::TranscodeError, video_repo::RepoError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;
use uuid::Uuid;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Every way an ingestion pipeline can stop short of `Done`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("user is not the owner of video `{0}`")]
    Authorization(Uuid),
    #[error("{0}")]
    Validation(String),
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Storage(#[from] ObjectStorageError),
    #[error(transparent)]
    Persistence(RepoError),
    #[error("staging failed: {0}")]
    Staging(#[source] io::Error),
}

impl From<RepoError> for PipelineError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Persistence(other),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Auth(err) => AppError::unauthorized(err.to_string()),
            // Same status as a bad credential so ownership never leaks existence.
            PipelineError::Authorization(_) => {
                AppError::unauthorized("user is not the owner of the video")
            }
            PipelineError::Validation(msg) => AppError::bad_request(msg),
            PipelineError::NotFound(_) => AppError::not_found("video not found"),
            PipelineError::Probe(err) => {
                tracing::error!("probe failed: {}", err);
                AppError::internal("couldn't read video metadata")
            }
            PipelineError::Transcode(err) => {
                tracing::error!("transcode failed: {}", err);
                AppError::internal("couldn't process video")
            }
            PipelineError::Storage(err) => {
                tracing::error!("object storage failed: {}", err);
                AppError::internal("couldn't store video")
            }
            PipelineError::Persistence(err) => {
                tracing::error!("persistence failed: {}", err);
                AppError::internal("couldn't update video")
            }
            PipelineError::Staging(err) => {
                tracing::error!("staging failed: {}", err);
                AppError::internal("couldn't stage upload")
            }
        }
    }
}

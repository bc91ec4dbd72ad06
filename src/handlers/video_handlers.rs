//! HTTP handlers for video records and their uploads.
//! Multipart bodies are streamed into the ingestion services; nothing is
//! buffered in memory here.

use crate::{
    errors::{AppError, PipelineError},
    models::video::{NewVideo, Video},
    services::{
        AppState,
        auth::bearer_token,
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
    http::{HeaderMap, StatusCode},
};
use futures::StreamExt;
use std::io;
use uuid::Uuid;

/// `POST /api/videos`: register a draft video owned by the caller.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewVideo>,
) -> Result<(StatusCode, Json<Video>), AppError> {
    let token = bearer_token(&headers).map_err(PipelineError::from)?;
    let user_id = state
        .auth
        .authenticate(token)
        .map_err(PipelineError::from)?;

    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    let video = state
        .repo
        .create_video(user_id, payload)
        .await
        .map_err(PipelineError::from)?;
    tracing::info!(video_id = %video.id, %user_id, "created video");
    Ok((StatusCode::CREATED, Json(video)))
}

/// `GET /api/videos/{video_id}`
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let video = state
        .repo
        .get_video(video_id)
        .await
        .map_err(PipelineError::from)?;
    Ok(Json(video))
}

/// `POST /api/video_upload/{video_id}`: multipart field `video`.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let token = bearer_token(&headers).map_err(PipelineError::from)?;

    let field = loop {
        let field = next_field(&mut multipart, "video").await?;
        if field.name() == Some("video") {
            break field;
        }
    };
    let content_type = field.content_type().map(str::to_owned);
    let stream = field.map(|chunk| chunk.map_err(io::Error::other));

    let video = state
        .videos
        .upload_video(video_id, token, content_type.as_deref(), stream)
        .await?;
    Ok(Json(video))
}

/// `POST /api/thumbnail_upload/{video_id}`: multipart field `thumbnail`.
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Video>, AppError> {
    let video_id = parse_video_id(&video_id)?;
    let token = bearer_token(&headers).map_err(PipelineError::from)?;

    let field = loop {
        let field = next_field(&mut multipart, "thumbnail").await?;
        if field.name() == Some("thumbnail") {
            break field;
        }
    };
    let content_type = field.content_type().map(str::to_owned);
    let stream = field.map(|chunk| chunk.map_err(io::Error::other));

    let video = state
        .thumbnails
        .upload_thumbnail(video_id, token, content_type.as_deref(), stream)
        .await?;
    Ok(Json(video))
}

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::bad_request("invalid video id"))
}

/// Next multipart field; running out of fields before `wanted` is a bad request.
async fn next_field<'a>(
    multipart: &'a mut Multipart,
    wanted: &str,
) -> Result<Field<'a>, AppError> {
    match multipart.next_field().await {
        Ok(Some(field)) => Ok(field),
        Ok(None) => Err(AppError::bad_request(format!(
            "missing multipart field `{}`",
            wanted
        ))),
        Err(err) => Err(AppError::bad_request(format!(
            "unable to parse form: {}",
            err.body_text()
        ))),
    }
}

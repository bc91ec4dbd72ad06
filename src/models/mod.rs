//! Core data models for the video ingestion service.
//!
//! Records map to database tables via `sqlx::FromRow` and serialize as JSON
//! via `serde`.

pub mod video;

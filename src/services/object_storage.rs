//! Remote object storage for processed videos.
//!
//! The pipeline only ever writes: one `put` per successful upload under a
//! fresh random key, so there is no contention on the bucket.

use async_trait::async_trait;
use bytes::BytesMut;
use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload,
    aws::{AmazonS3, AmazonS3Builder},
    path::Path as ObjectPath,
};
use std::{io, pin::Pin, time::Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum ObjectStorageError {
    #[error("upload of `{key}` failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: object_store::Error,
    },
    #[error("reading upload body for `{key}` failed: {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("upload body for `{key}` was {actual} bytes, expected {expected}")]
    LengthMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("object storage configuration error: {0}")]
    Config(String),
}

pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store exactly `content_length` bytes from `body` under `key`.
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        body: ObjectReader,
    ) -> Result<(), ObjectStorageError>;

    /// Publicly reachable URL for `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Read `body` to the end, requiring exactly `expected` bytes.
async fn read_exact_body(
    key: &str,
    mut body: ObjectReader,
    expected: u64,
) -> Result<BytesMut, ObjectStorageError> {
    let mut buffer = BytesMut::with_capacity(expected as usize);
    loop {
        let n = body
            .read_buf(&mut buffer)
            .await
            .map_err(|source| ObjectStorageError::Read {
                key: key.to_string(),
                source,
            })?;
        if n == 0 {
            break;
        }
        if buffer.len() as u64 > expected {
            break;
        }
    }

    if buffer.len() as u64 != expected {
        return Err(ObjectStorageError::LengthMismatch {
            key: key.to_string(),
            expected,
            actual: buffer.len() as u64,
        });
    }
    Ok(buffer)
}

/// S3 (or S3-compatible) bucket.
#[derive(Debug)]
pub struct S3ObjectStorage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3ObjectStorage {
    /// Build a client from the environment's AWS credentials plus explicit
    /// bucket and region. `endpoint` targets S3-compatible services such as
    /// MinIO.
    pub fn new(
        bucket: String,
        region: String,
        endpoint: Option<String>,
    ) -> Result<Self, ObjectStorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket.clone())
            .with_region(region.clone());
        if let Some(endpoint) = endpoint.as_ref() {
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| ObjectStorageError::Config(e.to_string()))?;

        Ok(Self {
            store,
            bucket,
            region,
            endpoint,
        })
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        body: ObjectReader,
    ) -> Result<(), ObjectStorageError> {
        let start = Instant::now();
        // Single-part put: the whole processed file is held in memory here,
        // so staging to disk does not bound memory for this step.
        let bytes = read_exact_body(key, body, content_length).await?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(
                &ObjectPath::from(key),
                PutPayload::from(bytes.freeze()),
                opts,
            )
            .await
            .map_err(|source| {
                tracing::error!(
                    error = %source,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = content_length,
                    "S3 upload failed"
                );
                ObjectStorageError::Upload {
                    key: key.to_string(),
                    source,
                }
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = content_length,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        object_url(&self.bucket, &self.region, self.endpoint.as_deref(), key)
    }
}

/// Virtual-hosted AWS URL, or path-style under a custom endpoint.
pub fn object_url(bucket: &str, region: &str, endpoint: Option<&str>, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

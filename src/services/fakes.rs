//! In-process stand-ins for the pipeline collaborators, used by tests.

use crate::{
    models::video::{NewVideo, Video},
    services::{
        auth::{AuthError, Authenticator},
        keys::RandomSource,
        object_storage::{ObjectReader, ObjectStorage, ObjectStorageError},
        probe::{MediaProber, ProbeError, ProbeResult},
        staging::StagedFile,
        transcode::{TranscodeError, Transcoder, processing_path},
        video_repo::{RepoError, RepoResult, VideoRepository},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

/// Body stream yielding `chunks` in order.
pub fn body<C: AsRef<[u8]>>(chunks: &[C]) -> impl Stream<Item = io::Result<Bytes>> + use<C> {
    let chunks: Vec<io::Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::copy_from_slice(c.as_ref())))
        .collect();
    futures::stream::iter(chunks)
}

/// Names of everything currently inside `dir`.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Accepts one fixed token for one user.
pub struct StaticAuth {
    token: String,
    user_id: Uuid,
}

impl StaticAuth {
    pub fn new(token: &str, user_id: Uuid) -> Self {
        Self {
            token: token.to_string(),
            user_id,
        }
    }
}

impl Authenticator for StaticAuth {
    fn authenticate(&self, token: &str) -> Result<Uuid, AuthError> {
        if token == self.token {
            Ok(self.user_id)
        } else {
            Err(AuthError::MissingToken)
        }
    }
}

/// Deterministic bytes: every fill is distinct from the previous one.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl RandomSource for Counter {
    fn fill(&self, buf: &mut [u8]) {
        let n = self.0.fetch_add(1, Ordering::SeqCst).to_be_bytes();
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = n[i % n.len()];
        }
    }
}

#[derive(Default)]
pub struct MemoryRepo {
    videos: Mutex<HashMap<Uuid, Video>>,
    updates: AtomicUsize,
}

impl MemoryRepo {
    pub fn insert(&self, user_id: Uuid) -> Video {
        let now = Utc::now();
        let video = Video {
            id: Uuid::new_v4(),
            user_id,
            title: "draft".into(),
            description: None,
            thumbnail_url: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        };
        self.videos
            .lock()
            .unwrap()
            .insert(video.id, video.clone());
        video
    }

    pub fn get(&self, id: Uuid) -> Video {
        self.videos.lock().unwrap()[&id].clone()
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoRepository for MemoryRepo {
    async fn create_video(&self, user_id: Uuid, new: NewVideo) -> RepoResult<Video> {
        let mut video = self.insert(user_id);
        video.title = new.title;
        video.description = new.description;
        self.videos
            .lock()
            .unwrap()
            .insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_video(&self, id: Uuid) -> RepoResult<Video> {
        self.videos
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound(id))
    }

    async fn update_video(&self, video: &Video) -> RepoResult<()> {
        let mut videos = self.videos.lock().unwrap();
        let slot = videos.get_mut(&video.id).ok_or(RepoError::NotFound(video.id))?;
        *slot = video.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reads through to `inner` but every update fails.
pub struct FailingRepo {
    inner: Arc<MemoryRepo>,
}

impl FailingRepo {
    pub fn wrapping(inner: Arc<MemoryRepo>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl VideoRepository for FailingRepo {
    async fn create_video(&self, user_id: Uuid, new: NewVideo) -> RepoResult<Video> {
        self.inner.create_video(user_id, new).await
    }

    async fn get_video(&self, id: Uuid) -> RepoResult<Video> {
        self.inner.get_video(id).await
    }

    async fn update_video(&self, _video: &Video) -> RepoResult<()> {
        Err(RepoError::Sqlx(sqlx::Error::PoolClosed))
    }
}

pub struct FakeProber {
    dims: Option<ProbeResult>,
    error: Mutex<Option<ProbeError>>,
    calls: AtomicUsize,
}

impl FakeProber {
    pub fn new(outcome: Result<ProbeResult, ProbeError>) -> Self {
        let (dims, error) = match outcome {
            Ok(dims) => (Some(dims), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            dims,
            error: Mutex::new(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(path.exists(), "probe input must be staged");
        match self.dims {
            Some(dims) => Ok(dims),
            None => Err(self
                .error
                .lock()
                .unwrap()
                .take()
                .unwrap_or(ProbeError::NoStreams)),
        }
    }
}

/// Prefixes the input with `faststart:`; on failure leaves a partial
/// output behind so cleanup can be observed.
#[derive(Default)]
pub struct FakeTranscoder {
    error: Mutex<Option<TranscodeError>>,
    calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn failing(err: TranscodeError) -> Self {
        Self {
            error: Mutex::new(Some(err)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn fast_start(&self, input: &Path) -> Result<StagedFile, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = StagedFile::adopt(processing_path(input));
        let failure = self.error.lock().unwrap().take();

        if let Some(err) = failure {
            tokio::fs::write(output.path(), b"partial")
                .await
                .map_err(TranscodeError::Stat)?;
            return Err(err);
        }

        let mut data = b"faststart:".to_vec();
        data.extend(tokio::fs::read(input).await.map_err(TranscodeError::Stat)?);
        tokio::fs::write(output.path(), data)
            .await
            .map_err(TranscodeError::Stat)?;
        Ok(output)
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub content_length: u64,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct FakeStorage {
    fail: bool,
    puts: Mutex<Vec<StoredObject>>,
}

impl FakeStorage {
    pub fn failing() -> Self {
        Self {
            fail: true,
            puts: Mutex::default(),
        }
    }

    pub fn puts(&self) -> Vec<StoredObject> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        content_length: u64,
        mut body: ObjectReader,
    ) -> Result<(), ObjectStorageError> {
        if self.fail {
            return Err(ObjectStorageError::Config("bucket unreachable".into()));
        }
        let mut data = Vec::new();
        body.read_to_end(&mut data)
            .await
            .map_err(|source| ObjectStorageError::Read {
                key: key.to_string(),
                source,
            })?;
        self.puts.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            content_type: content_type.to_string(),
            content_length,
            body: data,
        });
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://reels.s3.us-east-1.amazonaws.com/{}", key)
    }
}

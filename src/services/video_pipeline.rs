//! Video upload orchestration.
//!
//! One call to [`VideoPipeline::upload_video`] runs the full sequence for a
//! single request:
//!
//! `authenticate -> authorize -> validate content type -> buffer -> probe ->
//! transcode -> derive key -> store -> persist`
//!
//! Every local file created on the way is held by a [`StagedFile`] guard, so
//! whichever stage stops the run, nothing staged outlives the call.

use crate::{
    errors::{PipelineError, PipelineResult},
    models::video::Video,
    services::{
        aspect::classify,
        auth::Authenticator,
        keys::{RandomSource, StorageKey},
        media_type::{VIDEO_MP4, validate_media_type},
        object_storage::ObjectStorage,
        probe::MediaProber,
        staging::StagedFile,
        transcode::Transcoder,
        video_repo::{VideoRepository, fetch_owned},
    },
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use std::{io, path::PathBuf, sync::Arc};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct VideoPipeline {
    pub repo: Arc<dyn VideoRepository>,
    pub auth: Arc<dyn Authenticator>,
    pub prober: Arc<dyn MediaProber>,
    pub transcoder: Arc<dyn Transcoder>,
    pub storage: Arc<dyn ObjectStorage>,
    pub random: Arc<dyn RandomSource>,
    /// Directory receiving raw upload buffers and transcoder output.
    pub staging_dir: PathBuf,
    /// Hard cap on the uploaded body.
    pub max_upload_bytes: u64,
}

impl VideoPipeline {
    /// Ingest one uploaded video for `video_id` and return the updated record.
    #[tracing::instrument(skip_all, fields(video_id = %video_id))]
    pub async fn upload_video<S>(
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
        info!(%user_id, "uploading video");

        let media_type = validate_media_type(content_type, &[VIDEO_MP4])?;

        let (raw, size) = self.buffer(body).await?;
        debug!("buffered {} bytes to {}", size, raw.display());

        let dims = self.prober.probe(&raw).await?;
        let aspect = classify(dims.width, dims.height);
        info!(
            width = dims.width,
            height = dims.height,
            aspect = %aspect,
            "probed upload"
        );

        let processed = self.transcoder.fast_start(&raw).await?;

        let key = StorageKey::derive(self.random.as_ref());
        let object_path = key.video_object_path();

        let content_length = fs::metadata(processed.path())
            .await
            .map_err(PipelineError::Staging)?
            .len();
        let file = File::open(processed.path())
            .await
            .map_err(PipelineError::Staging)?;
        self.storage
            .put_object(
                &object_path,
                media_type.essence_str(),
                content_length,
                Box::pin(file),
            )
            .await?;

        video.video_url = Some(self.storage.public_url(&object_path));
        video.updated_at = Utc::now();
        if let Err(err) = self.repo.update_video(&video).await {
            // No reconciliation across collaborators: the stored object stays
            // orphaned until someone removes it out of band.
            error!(
                object = %object_path,
                error = %err,
                "video stored but record update failed, remote object is orphaned"
            );
            return Err(err.into());
        }

        release(processed).await;
        release(raw).await;

        info!(object = %object_path, "video upload complete");
        Ok(video)
    }

    /// Stream `body` into a fresh staged file, enforcing the size cap before
    /// each chunk is written. The write handle is closed on return; later
    /// stages reopen the file by path from the start.
    async fn buffer<S>(&self, body: S) -> PipelineResult<(StagedFile, u64)>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let (staged, mut file) = StagedFile::create(&self.staging_dir, "mp4")
            .await
            .map_err(PipelineError::Staging)?;

        let mut written: u64 = 0;
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                PipelineError::Validation(format!("unable to read upload body: {}", err))
            })?;
            written += chunk.len() as u64;
            if written > self.max_upload_bytes {
                return Err(PipelineError::Validation(format!(
                    "upload exceeds the {} byte limit",
                    self.max_upload_bytes
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(PipelineError::Staging)?;
        }

        if written == 0 {
            return Err(PipelineError::Validation("upload body is empty".into()));
        }

        file.flush().await.map_err(PipelineError::Staging)?;
        file.sync_all().await.map_err(PipelineError::Staging)?;
        Ok((staged, written))
    }
}

async fn release(staged: StagedFile) {
    let path = staged.path().to_path_buf();
    if let Err(err) = staged.cleanup().await {
        warn!("failed to remove staged {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        fakes::{
            Counter, FailingRepo, FakeProber, FakeStorage, FakeTranscoder, MemoryRepo, StaticAuth,
            body, dir_entries,
        },
        object_storage::ObjectStorageError,
        probe::{ProbeError, ProbeResult},
        transcode::TranscodeError,
    };
    use std::collections::HashSet;
    use tempfile::TempDir;

    const TOKEN: &str = "token";

    struct Harness {
        pipeline: VideoPipeline,
        repo: Arc<MemoryRepo>,
        storage: Arc<FakeStorage>,
        prober: Arc<FakeProber>,
        transcoder: Arc<FakeTranscoder>,
        staging: TempDir,
        owner: Uuid,
        video: Video,
    }

    fn harness() -> Harness {
        let staging = tempfile::tempdir().unwrap();
        let owner = Uuid::new_v4();
        let repo = Arc::new(MemoryRepo::default());
        let video = repo.insert(owner);
        let storage = Arc::new(FakeStorage::default());
        let prober = Arc::new(FakeProber::new(Ok(ProbeResult {
            width: 1080,
            height: 1920,
        })));
        let transcoder = Arc::new(FakeTranscoder::default());

        let pipeline = VideoPipeline {
            repo: repo.clone(),
            auth: Arc::new(StaticAuth::new(TOKEN, owner)),
            prober: prober.clone(),
            transcoder: transcoder.clone(),
            storage: storage.clone(),
            random: Arc::new(Counter::default()),
            staging_dir: staging.path().to_path_buf(),
            max_upload_bytes: 1024,
        };

        Harness {
            pipeline,
            repo,
            storage,
            prober,
            transcoder,
            staging,
            owner,
            video,
        }
    }

    #[tokio::test]
    async fn portrait_upload_end_to_end() {
        let h = harness();
        let updated = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"moov", b"mdat"]))
            .await
            .unwrap();

        let url = updated.video_url.clone().unwrap();
        assert!(!url.is_empty());
        assert!(!url.contains(&h.video.id.to_string()));
        assert!(!url.contains(&h.owner.to_string()));

        assert_eq!(h.repo.updates(), 1);
        assert_eq!(h.repo.get(h.video.id).video_url, Some(url));

        let puts = h.storage.puts();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].content_type, "video/mp4");
        assert_eq!(puts[0].body, b"faststart:moovmdat");
        assert_eq!(puts[0].content_length, puts[0].body.len() as u64);
        assert!(dir_entries(h.staging.path()).is_empty());
    }

    #[tokio::test]
    async fn keys_are_never_reused() {
        let h = harness();
        let mut seen = HashSet::new();
        for _ in 0..3 {
            h.pipeline
                .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"data"]))
                .await
                .unwrap();
        }
        for put in h.storage.puts() {
            assert!(put.key.starts_with("videos/"));
            assert!(!put.key.contains(&h.video.id.to_string()));
            assert!(seen.insert(put.key));
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn wrong_owner_touches_nothing() {
        let mut h = harness();
        h.pipeline.auth = Arc::new(StaticAuth::new(TOKEN, Uuid::new_v4()));

        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Authorization(_)));
        assert!(dir_entries(h.staging.path()).is_empty());
        assert!(h.storage.puts().is_empty());
        assert_eq!(h.prober.calls(), 0);
        assert_eq!(h.transcoder.calls(), 0);
        assert_eq!(h.repo.updates(), 0);
    }

    #[tokio::test]
    async fn bad_token_is_an_auth_error() {
        let h = harness();
        let err = h
            .pipeline
            .upload_video(h.video.id, "forged", Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Auth(_)));
    }

    #[tokio::test]
    async fn unknown_video_is_not_found() {
        let h = harness();
        let err = h
            .pipeline
            .upload_video(Uuid::new_v4(), TOKEN, Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn quicktime_rejected_before_staging() {
        let h = harness();
        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/quicktime"), body(&[b"data"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(dir_entries(h.staging.path()).is_empty());
        assert_eq!(h.prober.calls(), 0);
    }

    #[tokio::test]
    async fn content_type_parameters_rejected() {
        let h = harness();
        let err = h
            .pipeline
            .upload_video(
                h.video.id,
                TOKEN,
                Some("video/mp4; codecs=avc1"),
                body(&[b"data"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(msg) if msg.contains("parameters")));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_and_cleaned_up() {
        let h = harness();
        let big = vec![0u8; 700];
        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[&big, &big]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(msg) if msg.contains("limit")));
        assert!(dir_entries(h.staging.path()).is_empty());
        assert_eq!(h.prober.calls(), 0);
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let h = harness();
        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body::<&[u8]>(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(dir_entries(h.staging.path()).is_empty());
    }

    #[tokio::test]
    async fn body_read_error_cleans_up() {
        let h = harness();
        let failing = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), failing)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(dir_entries(h.staging.path()).is_empty());
    }

    #[tokio::test]
    async fn probe_failure_cleans_up() {
        let mut h = harness();
        let prober = Arc::new(FakeProber::new(Err(ProbeError::NoStreams)));
        h.pipeline.prober = prober.clone();

        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Probe(_)));
        assert_eq!(prober.calls(), 1);
        assert_eq!(h.transcoder.calls(), 0);
        assert!(dir_entries(h.staging.path()).is_empty());
        assert_eq!(h.repo.updates(), 0);
    }

    #[tokio::test]
    async fn transcode_failure_removes_partial_output() {
        let mut h = harness();
        let transcoder = Arc::new(FakeTranscoder::failing(TranscodeError::EmptyOutput));
        h.pipeline.transcoder = transcoder.clone();

        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transcode(_)));
        assert_eq!(transcoder.calls(), 1);
        assert!(dir_entries(h.staging.path()).is_empty());
        assert!(h.storage.puts().is_empty());
        assert_eq!(h.repo.updates(), 0);
    }

    #[tokio::test]
    async fn storage_failure_leaves_record_untouched() {
        let mut h = harness();
        h.pipeline.storage = Arc::new(FakeStorage::failing());

        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Storage(ObjectStorageError::Config(_))
        ));
        assert!(dir_entries(h.staging.path()).is_empty());
        assert_eq!(h.repo.updates(), 0);
        assert!(h.repo.get(h.video.id).video_url.is_none());
    }

    #[tokio::test]
    async fn persistence_failure_after_upload_is_reported() {
        let mut h = harness();
        h.pipeline.repo = Arc::new(FailingRepo::wrapping(h.repo.clone()));

        let err = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), body(&[b"data"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        // The orphaned object is an accepted inconsistency.
        assert_eq!(h.storage.puts().len(), 1);
        assert!(h.repo.get(h.video.id).video_url.is_none());
        assert!(dir_entries(h.staging.path()).is_empty());
    }

    #[tokio::test]
    async fn dropped_request_releases_staged_files() {
        let h = harness();
        // A body that never finishes, like a stalled client.
        let stalled = futures::stream::iter(vec![Ok(Bytes::from_static(b"head"))])
            .chain(futures::stream::pending());

        let upload = h
            .pipeline
            .upload_video(h.video.id, TOKEN, Some("video/mp4"), stalled);
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), upload).await;

        assert!(timed_out.is_err());
        assert!(dir_entries(h.staging.path()).is_empty());
    }
}

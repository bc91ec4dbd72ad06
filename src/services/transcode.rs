//! Fast-start repackaging through `ffmpeg`.
//!
//! Codecs are copied bit-for-bit; only the container index (`moov` atom) is
//! moved to the front so playback can begin before the download finishes.

use super::staging::StagedFile;
use async_trait::async_trait;
use std::{
    io,
    path::Path,
    process::{ExitStatus, Stdio},
};
use thiserror::Error;
use tokio::{fs, process::Command};
use tracing::debug;

/// Appended to the input path to name the transcoder output.
pub const PROCESSING_SUFFIX: &str = ".processing";

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[source] io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Status { status: ExitStatus, stderr: String },
    #[error("could not stat processed file: {0}")]
    Stat(#[source] io::Error),
    #[error("processed file is empty")]
    EmptyOutput,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Rewrite `input` for fast start. The returned file belongs to the caller.
    async fn fast_start(&self, input: &Path) -> Result<StagedFile, TranscodeError>;
}

/// Output path for a given input: the input path plus [`PROCESSING_SUFFIX`].
pub fn processing_path(input: &Path) -> std::path::PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(PROCESSING_SUFFIX);
    name.into()
}

/// Verify the transcoder left a non-empty file behind. A zero-length output
/// means the tool failed silently.
pub async fn ensure_output(output: &StagedFile) -> Result<u64, TranscodeError> {
    let meta = fs::metadata(output.path())
        .await
        .map_err(TranscodeError::Stat)?;
    if meta.len() == 0 {
        return Err(TranscodeError::EmptyOutput);
    }
    Ok(meta.len())
}

#[derive(Debug, Clone)]
pub struct FfMpeg {
    program: String,
}

impl FfMpeg {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfMpeg {
    async fn fast_start(&self, input: &Path) -> Result<StagedFile, TranscodeError> {
        // Adopted before spawning so partial output is removed on any error.
        let output = StagedFile::adopt(processing_path(input));

        let result = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .args(["-movflags", "faststart", "-codec", "copy", "-f", "mp4"])
            .arg(output.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(TranscodeError::Spawn)?;

        if !result.status.success() {
            return Err(TranscodeError::Status {
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let len = ensure_output(&output).await?;
        debug!("fast start output {} ({} bytes)", output.display(), len);
        Ok(output)
    }
}

//! Stream geometry discovery through `ffprobe`.

use async_trait::async_trait;
use serde::Deserialize;
use std::{
    io,
    path::Path,
    process::{ExitStatus, Stdio},
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Dimensions of the first stream in a container. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[source] io::Error),
    #[error("ffprobe exited with {status}: {stderr}")]
    Status { status: ExitStatus, stderr: String },
    #[error("unexpected ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no streams found in media")]
    NoStreams,
    #[error("first stream reports no usable dimensions ({width}x{height})")]
    MissingDimensions { width: u32, height: u32 },
}

#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfProbeOutput {
    #[serde(default)]
    streams: Vec<FfProbeStream>,
}

#[derive(Debug, Deserialize)]
struct FfProbeStream {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// Extract the first stream's dimensions from `-print_format json -show_streams` output.
///
/// Only the first stream is read. Containers are assumed to list the video
/// stream first; when that assumption breaks (audio first, or a stream with
/// no geometry) the zero dimensions are rejected instead of classified.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ProbeResult, ProbeError> {
    let output: FfProbeOutput = serde_json::from_slice(stdout)?;
    let first = output.streams.first().ok_or(ProbeError::NoStreams)?;

    if first.width == 0 || first.height == 0 {
        warn!(
            width = first.width,
            height = first.height,
            streams = output.streams.len(),
            "first probed stream has no geometry, it is probably not the video stream"
        );
        return Err(ProbeError::MissingDimensions {
            width: first.width,
            height: first.height,
        });
    }

    Ok(ProbeResult {
        width: first.width,
        height: first.height,
    })
}

/// `ffprobe` process wrapper.
#[derive(Debug, Clone)]
pub struct FfProbe {
    program: String,
}

impl FfProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaProber for FfProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        debug!("probing {}", path.display());
        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Status {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout)
    }
}

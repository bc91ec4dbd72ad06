//! Declared content type checks for uploaded parts.

use crate::errors::PipelineError;
use mime::Mime;

pub const VIDEO_MP4: &str = "video/mp4";
pub const IMAGE_JPEG: &str = "image/jpeg";
pub const IMAGE_PNG: &str = "image/png";

/// Parse `declared` and require a bare type from `allowed`.
///
/// Parameters are rejected outright so that `video/mp4; codecs=...` and
/// friends cannot smuggle an alternate encoding past the allow-list.
pub fn validate_media_type(
    declared: Option<&str>,
    allowed: &[&str],
) -> Result<Mime, PipelineError> {
    let declared = declared
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::Validation("missing content type".into()))?;

    let parsed: Mime = declared.parse().map_err(|err| {
        PipelineError::Validation(format!("couldn't parse media type `{}`: {}", declared, err))
    })?;

    if parsed.params().next().is_some() {
        return Err(PipelineError::Validation(
            "unexpected media type parameters".into(),
        ));
    }

    if !allowed.contains(&parsed.essence_str()) {
        return Err(PipelineError::Validation(format!(
            "invalid file type `{}`",
            parsed.essence_str()
        )));
    }

    Ok(parsed)
}

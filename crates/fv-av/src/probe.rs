//! Duration and codec probing via ffprobe.
//!
//! The transcode path only needs two facts about a source: its total duration
//! (to turn a byte offset into a seek time) and the codec of its first video
//! stream (to decide between stream copy and re-encode). Both come from a
//! single ffprobe run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Timing facts about a media file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaTiming {
    /// Total duration in seconds, always finite and positive.
    pub duration_secs: f64,
    /// Codec name of the first video stream as ffprobe reports it.
    pub video_codec: Option<String>,
}

/// Something that can determine a file's duration.
#[async_trait::async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> fv_core::Result<MediaTiming>;
}

/// A [`DurationProbe`] backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeTimingProbe {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeTimingProbe {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl DurationProbe for FfprobeTimingProbe {
    async fn probe(&self, path: &Path) -> fv_core::Result<MediaTiming> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.timeout(self.timeout);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "format=duration:stream=codec_name",
            "-of",
            "json",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await?;
        parse_timing(&output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
}

/// Parse ffprobe's JSON into [`MediaTiming`].
///
/// A missing, non-numeric, non-finite or non-positive duration is a
/// [`fv_core::Error::Probe`].
pub fn parse_timing(json: &str) -> fv_core::Result<MediaTiming> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| fv_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let raw = output
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| fv_core::Error::Probe("ffprobe reported no duration".into()))?;

    let duration_secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| fv_core::Error::Probe(format!("unparseable duration '{raw}'")))?;

    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(fv_core::Error::Probe(format!(
            "invalid duration {duration_secs}"
        )));
    }

    let video_codec = output
        .streams
        .into_iter()
        .find_map(|s| s.codec_name)
        .map(|c| c.to_ascii_lowercase());

    Ok(MediaTiming {
        duration_secs,
        video_codec,
    })
}

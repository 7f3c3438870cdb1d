//! Live remux of non-browser containers to fragmented MP4.
//!
//! ffmpeg's stdout is the response body. The process is tied to the body:
//! when the client disconnects the body is dropped, which kills ffmpeg and
//! releases its registry entries.

use std::process::Stdio;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio_util::io::ReaderStream;

use fv_av::{RemuxInput, RemuxPlan, VideoMode};
use fv_core::{Error, Result};
use fv_media::range::first_byte_offset;
use fv_media::{FdLease, MediaAsset, ResourceKind};

use super::observe::StreamObserver;
use super::StreamRequest;
use crate::context::AppContext;

fn transcode_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers
}

/// Seek point in seconds for a byte offset, scaled linearly by duration.
pub fn start_time_for_offset(offset: Option<u64>, size: u64, duration_secs: Option<f64>) -> f64 {
    match (offset, duration_secs) {
        (Some(offset), Some(duration)) if size > 0 && duration.is_finite() && duration > 0.0 => {
            let fraction = (offset as f64 / size as f64).min(1.0);
            fraction * duration
        }
        _ => 0.0,
    }
}

/// Serve `asset` through an ffmpeg remux.
pub async fn serve_transcode(
    ctx: &AppContext,
    asset: MediaAsset,
    req: &StreamRequest,
) -> Result<Response> {
    asset.verify_containment()?;
    if req.head {
        return Ok((StatusCode::OK, transcode_headers(), unsized_empty_body()).into_response());
    }

    let ffmpeg = ctx.tools.require("ffmpeg")?.path.clone();
    let streaming = &ctx.config.streaming;

    let timing = ctx.durations.get(&asset.canonical_path).await;
    let start_secs = start_time_for_offset(
        first_byte_offset(req.range()),
        asset.size(),
        timing.as_ref().map(|t| t.duration_secs),
    );
    let video = VideoMode::choose(
        timing.as_ref().and_then(|t| t.video_codec.as_deref()),
        &streaming.copy_video_codecs,
        &streaming.fallback_video_encoder,
    );

    let path_label = asset.canonical_path.display().to_string();
    let MediaAsset {
        canonical_path,
        file,
        lease: file_lease,
        ..
    } = asset;

    let (input, stdin) = remux_input(file, canonical_path).await;
    let plan = RemuxPlan::new(input)
        .start_at(start_secs)
        .video(video.clone())
        .audio_codec(streaming.audio_codec.clone())
        .fragment_duration_us(streaming.fragment_duration_us);

    let mut child = plan.command(ffmpeg).spawn(stdin)?;
    let pid = child.id().unwrap_or(0);
    let process_lease = ctx
        .registry
        .register(ResourceKind::Process, format!("ffmpeg pid={pid} {path_label}"));

    tracing::info!(
        request_id = req.request_id(),
        pid,
        path = %path_label,
        start_secs = plan.start_secs(),
        video = ?video,
        "Transcode started"
    );

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            drain_stderr(stderr, pid).await;
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::tool("ffmpeg", "stdout was not captured"))?;

    let session = TranscodeSession {
        child: Some(child),
        pid,
        _leases: [file_lease, process_lease],
    };
    let observer = StreamObserver::new("transcode", req.request_id(), path_label);
    let body = Body::from_stream(stdout_stream(
        session,
        stdout,
        streaming.transcode_chunk(),
        observer,
    ));

    Ok((StatusCode::OK, transcode_headers(), body).into_response())
}

/// A HEAD body with no exact size, so no `Content-Length: 0` is added and
/// the headers match the chunked GET response.
fn unsized_empty_body() -> Body {
    Body::from_stream(futures::stream::empty::<std::result::Result<Bytes, std::io::Error>>())
}

/// Log ffmpeg's diagnostics line by line until EOF and return the line
/// count. Lines are raw bytes; tags in legacy encodings must not stop the
/// drain.
async fn drain_stderr<R>(stderr: R, pid: u32) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    let mut count = 0;
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                count += 1;
                let text = String::from_utf8_lossy(&line);
                tracing::debug!(pid, "ffmpeg: {}", text.trim_end());
            }
            Err(e) => {
                tracing::debug!(pid, "ffmpeg stderr closed: {e}");
                break;
            }
        }
    }
    count
}

/// Hand ffmpeg the already-verified descriptor as stdin so it reads the same
/// inode the checks ran against.
#[cfg(unix)]
async fn remux_input(
    file: tokio::fs::File,
    _path: std::path::PathBuf,
) -> (RemuxInput, Stdio) {
    let std_file = file.into_std().await;
    (RemuxInput::Stdin, Stdio::from(std_file))
}

#[cfg(not(unix))]
async fn remux_input(
    file: tokio::fs::File,
    path: std::path::PathBuf,
) -> (RemuxInput, Stdio) {
    drop(file);
    (RemuxInput::Path(path), Stdio::null())
}

/// A running ffmpeg plus the registry entries it holds.
///
/// Dropping an unfinished session kills the process.
struct TranscodeSession {
    child: Option<Child>,
    pid: u32,
    _leases: [FdLease; 2],
}

impl TranscodeSession {
    /// Reap the process after its output reached EOF.
    async fn finish(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.wait().await {
            Ok(status) if status.success() => {
                tracing::debug!(pid = self.pid, "ffmpeg exited cleanly");
            }
            Ok(status) => {
                tracing::warn!(pid = self.pid, %status, "ffmpeg exited with failure");
            }
            Err(e) => {
                tracing::warn!(pid = self.pid, "Failed to wait for ffmpeg: {e}");
            }
        }
    }
}

impl Drop for TranscodeSession {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = child.start_kill() {
            tracing::debug!(pid = self.pid, "ffmpeg already gone: {e}");
        } else {
            tracing::debug!(pid = self.pid, "Killed ffmpeg after client disconnect");
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = child.wait().await;
            });
        }
    }
}

fn stdout_stream(
    mut session: TranscodeSession,
    stdout: ChildStdout,
    chunk_size: usize,
    mut observer: StreamObserver,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
    async_stream::stream! {
        let mut reader = ReaderStream::with_capacity(stdout, chunk_size);
        let mut failed = false;
        while let Some(next) = reader.next().await {
            match next {
                Ok(bytes) => {
                    observer.record(bytes.len());
                    yield Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(pid = session.pid, "Reading ffmpeg output failed: {e}");
                    failed = true;
                    yield Err(e);
                    break;
                }
            }
        }
        if !failed {
            session.finish().await;
            observer.complete();
        }
    }
}

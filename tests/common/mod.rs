//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out a film library, a JSON catalog and fake
//! ffmpeg/ffprobe scripts in a temp dir, then builds a full [`AppContext`]
//! over them. [`TestHarness::serve`] starts the server on a random port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fv_av::ToolRegistry;
use fv_core::config::{CatalogConfig, CatalogSource, Config};
use fv_server::context::AppContext;
use fv_server::router::build_router;

/// ffprobe reporting a two-minute H.264 file.
pub const FFPROBE_H264_120S: &str = "#!/bin/sh\necho '{\"streams\":[{\"codec_name\":\"h264\"}],\"format\":{\"duration\":\"120.0\"}}'\n";

/// ffmpeg that records its arguments and copies stdin to stdout.
pub const FFMPEG_CAT: &str = "#!/bin/sh\necho \"$@\" > \"$(dirname \"$0\")/ffmpeg.args\"\nexec cat\n";

/// ffprobe like [`FFPROBE_H264_120S`] that also appends one line per run
/// to `bin/ffprobe.calls`.
pub const FFPROBE_COUNTING: &str = "#!/bin/sh\necho run >> \"$(dirname \"$0\")/ffprobe.calls\"\nsleep 0.2\necho '{\"streams\":[{\"codec_name\":\"h264\"}],\"format\":{\"duration\":\"120.0\"}}'\n";

/// ffmpeg that writes a Latin-1 title tag and a lot of noise to stderr
/// before its only output line.
pub const FFMPEG_LATIN1_STDERR: &str = "#!/bin/sh\nprintf 'title: Vilni\\351\\n' >&2\nhead -c 200000 /dev/zero | tr '\\000' x >&2\necho >&2\necho finished\n";

/// ffmpeg that never stops producing output.
pub const FFMPEG_ENDLESS: &str = "#!/bin/sh\nexec yes filmvault\n";

pub struct TestHarness {
    pub ctx: AppContext,
    pub dir: TempDir,
    cancel: CancellationToken,
}

impl TestHarness {
    /// Build a harness whose catalog maps each `(programid, path)` pair.
    /// Relative paths are taken inside the films directory.
    pub fn new(catalog: &[(&str, &str)]) -> Self {
        Self::with_tools(catalog, FFMPEG_CAT, FFPROBE_H264_120S)
    }

    pub fn with_tools(catalog: &[(&str, &str)], ffmpeg: &str, ffprobe: &str) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let films = dir.path().join("films");
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&films).unwrap();
        std::fs::create_dir_all(&bin).unwrap();

        let ffmpeg_path = write_script(&bin.join("ffmpeg"), ffmpeg);
        let ffprobe_path = write_script(&bin.join("ffprobe"), ffprobe);

        let entries: Vec<serde_json::Value> = catalog
            .iter()
            .map(|(id, path)| {
                let full = if Path::new(path).is_absolute() {
                    PathBuf::from(path)
                } else {
                    films.join(path)
                };
                serde_json::json!({ "programid": id, "full_path": full, "title": id })
            })
            .collect();
        let catalog_path = dir.path().join("films_data.json");
        std::fs::write(&catalog_path, serde_json::to_vec(&entries).unwrap()).unwrap();

        let mut config = Config::default();
        config.catalog = CatalogConfig {
            source: CatalogSource::Json,
            path: catalog_path,
        };
        config.tools.ffmpeg_path = Some(ffmpeg_path.clone());
        config.tools.ffprobe_path = Some(ffprobe_path.clone());
        config.streaming.direct_chunk_size = 4096;

        let catalog = fv_db::open_catalog(&config.catalog).expect("failed to open catalog");
        let tools = Arc::new(ToolRegistry::with_paths(&ffmpeg_path, &ffprobe_path));
        let ctx = AppContext::new(config, catalog, tools);

        Self {
            ctx,
            dir,
            cancel: CancellationToken::new(),
        }
    }

    pub fn films_dir(&self) -> PathBuf {
        self.dir.path().join("films")
    }

    /// Write a file under the films directory, creating parents.
    pub fn write_film(&self, rel: &str, data: &[u8]) -> PathBuf {
        let path = self.films_dir().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Arguments the last fake ffmpeg run was given, if any.
    pub fn ffmpeg_args(&self) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join("bin").join("ffmpeg.args")).ok()
    }

    /// Number of times the fake ffprobe ran.
    pub fn ffprobe_calls(&self) -> usize {
        std::fs::read_to_string(self.dir.path().join("bin").join("ffprobe.calls"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// Start the server on a random port.
    pub async fn serve(&self) -> SocketAddr {
        let app = build_router(self.ctx.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");
        tokio::spawn(fv_server::run_accept_loop(listener, app, self.cancel.clone()));
        addr
    }

    /// Poll until the registry is empty or `timeout` passes.
    pub async fn wait_for_registry_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.ctx.registry.is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.ctx.registry.is_empty()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn write_script(path: &Path, body: &str) -> PathBuf {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// A minimal MP4: an `ftyp` box followed by `len - 24` patterned bytes.
pub fn mp4_bytes(len: usize) -> Vec<u8> {
    let mut v = vec![0x00, 0x00, 0x00, 0x18];
    v.extend_from_slice(b"ftypisom");
    v.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
    v.extend_from_slice(b"isomiso2");
    v.extend((0..len.saturating_sub(v.len())).map(|i| (i % 251) as u8));
    v
}

/// A minimal Matroska EBML header followed by filler.
pub fn mkv_bytes(len: usize) -> Vec<u8> {
    let mut v = vec![0x1A, 0x45, 0xDF, 0xA3, 0x93, 0x42, 0x82, 0x88];
    v.extend_from_slice(b"matroska");
    v.extend((0..len.saturating_sub(v.len())).map(|i| (i % 239) as u8));
    v
}

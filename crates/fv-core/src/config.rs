//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, catalog, tools, streaming engines, and the
//! resource registry. Every section defaults sensibly so a completely empty
//! `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub tools: ToolsConfig,
    pub streaming: StreamingConfig,
    pub registry: RegistryConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.streaming.sibling_dir.is_absolute() {
            warnings.push(format!(
                "streaming.sibling_dir '{}' is absolute; it is joined onto each film's directory",
                self.streaming.sibling_dir.display()
            ));
        }

        if self.streaming.duration_ttl_secs == 0 {
            warnings.push("streaming.duration_ttl_secs is 0; durations will never be reused".into());
        }

        if self.streaming.direct_chunk_size == 0 || self.streaming.transcode_chunk_size == 0 {
            warnings.push("streaming chunk sizes must be non-zero; defaults will be used".into());
        }

        if self.streaming.audio_codec.trim().is_empty() {
            warnings.push("streaming.audio_codec is empty".into());
        }

        if self.registry.sweep_interval_secs == 0 {
            warnings.push("registry.sweep_interval_secs is 0; the leak sweep is disabled".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
        }
    }
}

/// Where film records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSource {
    /// A static JSON array of film records.
    #[default]
    Json,
    /// A SQLite database with a `films` table.
    Sqlite,
}

/// Catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub source: CatalogSource,
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            source: CatalogSource::Json,
            path: PathBuf::from("./data/films_data.json"),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Streaming engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Subdirectory (relative to a film's directory) holding pre-transcoded MP4s.
    pub sibling_dir: PathBuf,
    /// Reject legacy containers whose sniffed type mismatches and strong
    /// containers that cannot be identified. Lenient mode only keeps the
    /// second rule.
    pub strict_mime: bool,
    /// Read buffer for direct file streaming, in bytes.
    pub direct_chunk_size: usize,
    /// Read buffer for ffmpeg stdout, in bytes.
    pub transcode_chunk_size: usize,
    /// How long a probed duration stays cached.
    pub duration_ttl_secs: u64,
    /// Upper bound on a single ffprobe run.
    pub probe_timeout_secs: u64,
    /// Fragment length of the remuxed MP4, in microseconds.
    pub fragment_duration_us: u64,
    /// Audio codec for remuxed output.
    pub audio_codec: String,
    /// Source video codecs passed through without re-encoding.
    pub copy_video_codecs: Vec<String>,
    /// Encoder used when the source video codec is not in `copy_video_codecs`.
    pub fallback_video_encoder: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            sibling_dir: PathBuf::from("Plex Versions").join("Original Quality"),
            strict_mime: true,
            direct_chunk_size: 1024 * 1024,
            transcode_chunk_size: 64 * 1024,
            duration_ttl_secs: 60 * 60,
            probe_timeout_secs: 30,
            fragment_duration_us: 1_000_000,
            audio_codec: "aac".into(),
            copy_video_codecs: vec!["h264".into(), "hevc".into(), "av1".into(), "vp9".into()],
            fallback_video_encoder: "libx264".into(),
        }
    }
}

impl StreamingConfig {
    /// Direct read buffer, never zero.
    pub fn direct_chunk(&self) -> usize {
        if self.direct_chunk_size == 0 {
            Self::default().direct_chunk_size
        } else {
            self.direct_chunk_size
        }
    }

    /// Transcode read buffer, never zero.
    pub fn transcode_chunk(&self) -> usize {
        if self.transcode_chunk_size == 0 {
            Self::default().transcode_chunk_size
        } else {
            self.transcode_chunk_size
        }
    }
}

/// Resource registry sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub sweep_interval_secs: u64,
    /// Warn when more than this many resources are open at once.
    pub max_open: usize,
    /// Warn about any resource held longer than this.
    pub max_age_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            max_open: 50,
            max_age_secs: 5 * 60,
        }
    }
}

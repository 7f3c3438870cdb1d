//! Video container rules: extensions, MIME sets, sniffing reliability, and
//! which streaming engine serves each container.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Video container formats the server knows how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mkv,
    Webm,
    Avi,
    Mpg,
    Mpeg,
}

/// How reliably magic-byte sniffing identifies a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerClass {
    /// Sniffing is reliable; an undetected file is rejected.
    Strong,
    /// Sniffing is unreliable; an undetected file is allowed with a warning.
    Legacy,
}

/// Which engine serves a file, decided from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Browsers play the container natively; serve bytes with range support.
    Direct,
    /// Browsers cannot play the container; remux through ffmpeg.
    Transcode,
    /// Not a container we serve (415).
    Reject,
}

impl Container {
    /// Every known container, in preference order.
    pub const ALL: [Container; 6] = [
        Container::Mp4,
        Container::Mkv,
        Container::Webm,
        Container::Avi,
        Container::Mpg,
        Container::Mpeg,
    ];

    /// Look up a container by file extension (case-insensitive, leading dot
    /// optional).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "mkv" => Some(Self::Mkv),
            "webm" => Some(Self::Webm),
            "avi" => Some(Self::Avi),
            "mpg" => Some(Self::Mpg),
            "mpeg" => Some(Self::Mpeg),
            _ => None,
        }
    }

    /// Look up a container from the extension of a path.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical lowercase extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Avi => "avi",
            Self::Mpg => "mpg",
            Self::Mpeg => "mpeg",
        }
    }

    /// MIME types a sniffer may legitimately report for this container.
    pub fn allowed_mimes(&self) -> &'static [&'static str] {
        match self {
            Self::Mp4 => &["video/mp4", "application/mp4"],
            Self::Mkv => &["video/x-matroska", "video/matroska"],
            Self::Webm => &["video/webm"],
            Self::Avi => &["video/x-msvideo"],
            Self::Mpg | Self::Mpeg => &["video/mpeg"],
        }
    }

    /// `Content-Type` sent when the file is served as-is.
    pub fn content_type(&self) -> &'static str {
        self.allowed_mimes()[0]
    }

    /// Sniffing reliability class.
    pub fn class(&self) -> ContainerClass {
        match self {
            Self::Mp4 | Self::Mkv | Self::Webm => ContainerClass::Strong,
            Self::Avi | Self::Mpg | Self::Mpeg => ContainerClass::Legacy,
        }
    }

    /// Engine that serves this container.
    pub fn dispatch(&self) -> Dispatch {
        match self {
            Self::Mp4 | Self::Webm => Dispatch::Direct,
            Self::Mkv | Self::Avi | Self::Mpg | Self::Mpeg => Dispatch::Transcode,
        }
    }

    /// Whether `mime` belongs to any known video container.
    pub fn is_known_video_mime(mime: &str) -> bool {
        Self::ALL.iter().any(|c| c.allowed_mimes().contains(&mime))
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl Dispatch {
    /// Decide the engine for a file extension; unknown extensions are rejected.
    pub fn for_extension(ext: &str) -> Self {
        Container::from_extension(ext)
            .map(|c| c.dispatch())
            .unwrap_or(Dispatch::Reject)
    }
}

//! Response engines for film streams.
//!
//! - [`direct`] serves file bytes with single and multipart range support.
//! - [`transcode`] pipes a live ffmpeg remux to the client.
//! - [`orchestrator`] picks the source file and the engine for a request.

pub mod direct;
pub mod multipart;
pub mod observe;
pub mod orchestrator;
pub mod transcode;

pub use orchestrator::stream_film;

/// The parts of an incoming request the engines care about.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    /// `HEAD` rather than `GET`: headers only, nothing is read or spawned.
    pub head: bool,
    /// Raw `Range` header value.
    pub range: Option<String>,
    pub request_id: Option<String>,
}

impl StreamRequest {
    pub fn get(range: Option<&str>) -> Self {
        Self {
            head: false,
            range: range.map(str::to_string),
            request_id: None,
        }
    }

    pub fn head(range: Option<&str>) -> Self {
        Self {
            head: true,
            ..Self::get(range)
        }
    }

    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }

    pub(crate) fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("-")
    }
}

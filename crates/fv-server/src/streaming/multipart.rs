//! `multipart/byteranges` framing.
//!
//! Each part is `--B\r\nContent-Type: T\r\nContent-Range: bytes s-e/S\r\n\r\n`
//! followed by the part's bytes and `\r\n`; the body ends with `--B--`.

use fv_media::ByteRange;

/// Framing for one multipart response.
#[derive(Debug, Clone)]
pub struct MultipartLayout {
    boundary: String,
    content_type: &'static str,
    size: u64,
}

impl MultipartLayout {
    pub fn new(content_type: &'static str, size: u64) -> Self {
        Self::with_boundary(
            format!("FILMVAULT_BOUNDARY_{}", uuid::Uuid::new_v4().simple()),
            content_type,
            size,
        )
    }

    pub fn with_boundary(boundary: String, content_type: &'static str, size: u64) -> Self {
        Self {
            boundary,
            content_type,
            size,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value of the response `Content-Type` header.
    pub fn content_type_header(&self) -> String {
        format!("multipart/byteranges; boundary={}", self.boundary)
    }

    /// Header block written before a part's bytes.
    pub fn part_header(&self, range: &ByteRange) -> String {
        format!(
            "--{}\r\nContent-Type: {}\r\nContent-Range: {}\r\n\r\n",
            self.boundary,
            self.content_type,
            range.content_range(self.size)
        )
    }

    /// Written after every part's bytes.
    pub const PART_END: &'static str = "\r\n";

    pub fn trailer(&self) -> String {
        format!("--{}--", self.boundary)
    }

    /// Exact body length for `ranges`.
    pub fn content_length(&self, ranges: &[ByteRange]) -> u64 {
        let parts: u64 = ranges
            .iter()
            .map(|r| {
                self.part_header(r).len() as u64 + r.len() + Self::PART_END.len() as u64
            })
            .sum();
        parts + self.trailer().len() as u64
    }
}

//! HTTP `Range` header parsing.

/// An inclusive byte span `[start, end]` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for this span in a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// What a `Range` header asks for, after validation against the file size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable header: serve the whole file.
    Full,
    /// One or more valid spans, in header order.
    Partial(Vec<ByteRange>),
    /// A `bytes` header whose every span was invalid.
    Unsatisfiable,
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// Comma-separated tokens take the forms `start-end`, `start-` and
/// `-suffix`. Invalid tokens are dropped. Units other than `bytes` are
/// ignored and yield [`RangeRequest::Full`].
pub fn parse_range_header(header: Option<&str>, size: u64) -> RangeRequest {
    let Some(spec) = header.and_then(strip_bytes_unit) else {
        return RangeRequest::Full;
    };

    let ranges: Vec<ByteRange> = spec
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| parse_token(t, size))
        .collect();

    if ranges.is_empty() {
        RangeRequest::Unsatisfiable
    } else {
        RangeRequest::Partial(ranges)
    }
}

/// Start offset of the first `start-` or `start-end` token, when positive.
///
/// Used to approximate a seek point when the body is produced by a
/// subprocess and the range itself cannot be honoured.
pub fn first_byte_offset(header: Option<&str>) -> Option<u64> {
    let spec = header.and_then(strip_bytes_unit)?;
    let first = spec.split(',').next()?.trim();
    let (start, _) = first.split_once('-')?;
    match start.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}

fn strip_bytes_unit(header: &str) -> Option<&str> {
    let header = header.trim();
    let (unit, spec) = header.split_once('=')?;
    if unit.trim().eq_ignore_ascii_case("bytes") {
        Some(spec)
    } else {
        None
    }
}

fn parse_token(token: &str, size: u64) -> Option<ByteRange> {
    let (start_str, end_str) = token.split_once('-')?;
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    let (start, end) = if start_str.is_empty() {
        let suffix: u64 = end_str.parse().ok()?;
        (size.saturating_sub(suffix), size.checked_sub(1)?)
    } else {
        let start: u64 = start_str.parse().ok()?;
        let end = if end_str.is_empty() {
            size.checked_sub(1)?
        } else {
            end_str.parse().ok()?
        };
        (start, end)
    };

    if start >= size || end >= size || end < start {
        return None;
    }
    Some(ByteRange { start, end })
}

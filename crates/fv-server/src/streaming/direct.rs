//! Byte-range serving of a verified file.
//!
//! The body stream owns the open file and its registry lease, so the
//! descriptor is closed when the response finishes or the client goes away,
//! whichever comes first.

use std::io::SeekFrom;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use fv_core::{Error, Result};
use fv_media::range::{parse_range_header, ByteRange, RangeRequest};
use fv_media::{FdLease, MediaAsset};

use super::multipart::MultipartLayout;
use super::observe::StreamObserver;
use super::StreamRequest;

pub const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// One contiguous read, optionally framed by multipart text.
#[derive(Debug, Clone)]
struct Segment {
    prefix: Option<String>,
    range: ByteRange,
    suffix: Option<&'static str>,
}

/// Serve `asset` honouring the request's `Range` header.
///
/// # Errors
///
/// - [`Error::AccessDenied`] when the file no longer sits inside its base
///   directory.
/// - [`Error::RangeNotSatisfiable`] when a `bytes` range header names no span
///   inside the file.
pub fn serve_direct(asset: MediaAsset, req: &StreamRequest, chunk_size: usize) -> Result<Response> {
    asset.verify_containment()?;
    let size = asset.size();
    let content_type = asset.container.content_type();
    let mut headers = validator_headers(&asset.metadata);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if req.head {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        return Ok((StatusCode::OK, headers, Body::empty()).into_response());
    }

    let ranges = match parse_range_header(req.range(), size) {
        RangeRequest::Full => None,
        RangeRequest::Partial(ranges) => Some(ranges),
        RangeRequest::Unsatisfiable => {
            tracing::debug!(
                range = req.range().unwrap_or(""),
                size,
                "No satisfiable byte range"
            );
            return Err(Error::RangeNotSatisfiable { size });
        }
    };

    let kind = match &ranges {
        None => "full",
        Some(r) if r.len() == 1 => "range",
        Some(_) => "multipart",
    };
    let observer = StreamObserver::new(
        kind,
        req.request_id(),
        asset.canonical_path.display().to_string(),
    );
    let MediaAsset { file, lease, .. } = asset;

    match ranges {
        None => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            let segments = if size == 0 {
                Vec::new()
            } else {
                vec![Segment {
                    prefix: None,
                    range: ByteRange { start: 0, end: size - 1 },
                    suffix: None,
                }]
            };
            let body = file_body(file, lease, segments, None, chunk_size, observer);
            Ok((StatusCode::OK, headers, body).into_response())
        }
        Some(ranges) if ranges.len() == 1 => {
            let range = ranges[0];
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            headers.insert(header::CONTENT_RANGE, header_value(&range.content_range(size))?);
            let segments = vec![Segment {
                prefix: None,
                range,
                suffix: None,
            }];
            let body = file_body(file, lease, segments, None, chunk_size, observer);
            Ok((StatusCode::PARTIAL_CONTENT, headers, body).into_response())
        }
        Some(ranges) => {
            let layout = MultipartLayout::new(content_type, size);
            headers.insert(header::CONTENT_TYPE, header_value(&layout.content_type_header())?);
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from(layout.content_length(&ranges)),
            );
            let segments = ranges
                .iter()
                .map(|r| Segment {
                    prefix: Some(layout.part_header(r)),
                    range: *r,
                    suffix: Some(MultipartLayout::PART_END),
                })
                .collect();
            let body = file_body(
                file,
                lease,
                segments,
                Some(layout.trailer()),
                chunk_size,
                observer,
            );
            Ok((StatusCode::PARTIAL_CONTENT, headers, body).into_response())
        }
    }
}

fn file_body(
    file: File,
    lease: FdLease,
    segments: Vec<Segment>,
    trailer: Option<String>,
    chunk_size: usize,
    observer: StreamObserver,
) -> Body {
    Body::from_stream(segment_stream(
        file, lease, segments, trailer, chunk_size, observer,
    ))
}

fn segment_stream(
    mut file: File,
    lease: FdLease,
    segments: Vec<Segment>,
    trailer: Option<String>,
    chunk_size: usize,
    mut observer: StreamObserver,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
    async_stream::stream! {
        // Released when the body finishes or is dropped.
        let _lease = lease;

        for segment in segments {
            if let Some(prefix) = segment.prefix {
                observer.record(prefix.len());
                yield Ok(Bytes::from(prefix));
            }

            if let Err(e) = file.seek(SeekFrom::Start(segment.range.start)).await {
                tracing::warn!("Seek failed while streaming: {e}");
                yield Err(e);
                return;
            }

            let mut reader =
                ReaderStream::with_capacity((&mut file).take(segment.range.len()), chunk_size);
            while let Some(next) = reader.next().await {
                match next {
                    Ok(bytes) => {
                        observer.record(bytes.len());
                        yield Ok(bytes);
                    }
                    Err(e) => {
                        tracing::warn!("Read failed while streaming: {e}");
                        yield Err(e);
                        return;
                    }
                }
            }

            if let Some(suffix) = segment.suffix {
                observer.record(suffix.len());
                yield Ok(Bytes::from_static(suffix.as_bytes()));
            }
        }

        if let Some(trailer) = trailer {
            observer.record(trailer.len());
            yield Ok(Bytes::from(trailer));
        }
        observer.complete();
    }
}

/// `ETag` and `Last-Modified` derived from file metadata.
fn validator_headers(metadata: &std::fs::Metadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_IMMUTABLE),
    );
    if let Ok(v) = HeaderValue::from_str(&etag(metadata)) {
        headers.insert(header::ETAG, v);
    }
    if let Some(v) = metadata
        .modified()
        .ok()
        .and_then(|t| HeaderValue::from_str(&http_date(t)).ok())
    {
        headers.insert(header::LAST_MODIFIED, v);
    }
    headers
}

/// `"<inode>-<size>-<mtime ms>"`.
#[cfg(unix)]
pub fn etag(metadata: &std::fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    let mtime_ms = metadata.mtime() * 1000 + metadata.mtime_nsec() / 1_000_000;
    format!("\"{}-{}-{}\"", metadata.ino(), metadata.size(), mtime_ms)
}

#[cfg(not(unix))]
pub fn etag(metadata: &std::fs::Metadata) -> String {
    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("\"0-{}-{}\"", metadata.len(), mtime_ms)
}

pub fn http_date(t: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| Error::Internal(format!("invalid header value: {e}")))
}

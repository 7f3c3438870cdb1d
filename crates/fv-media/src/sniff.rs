//! Magic-byte content type detection and the per-container acceptance policy.

use fv_core::{Container, ContainerClass, Error, Result};

/// Bytes read from the start of a file for sniffing.
pub const SNIFF_LEN: usize = 4100;

/// Detect a MIME type from a file header, if the bytes are recognised.
pub fn detect_mime(header: &[u8]) -> Option<&'static str> {
    infer::get(header).map(|t| t.mime_type())
}

/// Decide whether `detected` is acceptable for a file claiming to be
/// `container`.
///
/// Any detected type outside the known video set is rejected. In strict mode
/// strong containers must be detected and match; legacy containers are let
/// through undetected (with a warning) but rejected on a mismatch. Lenient
/// mode only rejects undetected strong containers.
pub fn check_mime(container: Container, detected: Option<&str>, strict: bool) -> Result<()> {
    if let Some(mime) = detected {
        if !Container::is_known_video_mime(mime) {
            return Err(Error::UnsupportedMediaType(format!(
                "detected {mime}, which is not a video type"
            )));
        }
    }

    let allowed = container.allowed_mimes();

    match (container.class(), detected) {
        (ContainerClass::Strong, None) => Err(Error::UnsupportedMediaType(format!(
            "unable to verify file type for .{container}"
        ))),
        (_, Some(mime)) if strict && !allowed.contains(&mime) => {
            Err(Error::UnsupportedMediaType(format!(
                "MIME mismatch for .{container}: expected {}, got {mime}",
                allowed.join(", ")
            )))
        }
        (ContainerClass::Legacy, None) => {
            tracing::warn!(
                container = %container,
                "Unable to verify legacy container by content; proceeding"
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

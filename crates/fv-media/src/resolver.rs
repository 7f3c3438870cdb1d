//! Untrusted file name to verified, open file.
//!
//! Resolution opens the file before making any trust decision about what it
//! points at, then checks the opened descriptor's real path, type and content.
//! A rename or symlink swap after the open cannot retarget the descriptor the
//! checks ran against.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use unicode_normalization::UnicodeNormalization;

use fv_core::{Container, Error, Result};

use crate::registry::{FdLease, FdRegistry, ResourceKind};
use crate::sniff::{self, SNIFF_LEN};

static SAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._\- ()]{1,255}$").expect("valid file name regex"));

/// A verified media file, open for reading.
///
/// Owned by exactly one request. Dropping it closes the descriptor and then
/// removes its registry entry.
#[derive(Debug)]
pub struct MediaAsset {
    /// Symlink-resolved path of the opened file.
    pub canonical_path: PathBuf,
    /// Symlink-resolved base directory the file was checked against.
    pub base_dir: PathBuf,
    pub container: Container,
    pub detected_mime: Option<String>,
    pub metadata: std::fs::Metadata,
    /// Positioned at offset 0.
    pub file: File,
    pub lease: FdLease,
}

impl MediaAsset {
    pub fn size(&self) -> u64 {
        self.metadata.len()
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    /// Re-check that the canonical path still sits inside the base directory.
    pub fn verify_containment(&self) -> Result<()> {
        if is_within(&self.canonical_path, &self.base_dir) {
            Ok(())
        } else {
            tracing::warn!(
                path = %self.canonical_path.display(),
                base = %self.base_dir.display(),
                "Resolved path escaped its base directory"
            );
            Err(Error::AccessDenied("path outside base directory".into()))
        }
    }
}

/// Resolves candidate file names against trusted base directories.
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<FdRegistry>,
    strict_mime: bool,
}

impl PathResolver {
    pub fn new(registry: Arc<FdRegistry>, strict_mime: bool) -> Self {
        Self {
            registry,
            strict_mime,
        }
    }

    pub fn registry(&self) -> &Arc<FdRegistry> {
        &self.registry
    }

    /// Resolve `candidate` inside `base_dir`, accepting only the `allowed`
    /// containers.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty, unsafe or traversing name, a
    ///   disallowed extension, or a target that is not a regular file.
    /// - [`Error::AccessDenied`] when the target escapes `base_dir`, lexically
    ///   or through a symlink.
    /// - [`Error::NotFound`] when the file does not exist.
    /// - [`Error::UnsupportedMediaType`] when the content does not match the
    ///   extension.
    pub async fn resolve(
        &self,
        candidate: &str,
        base_dir: &Path,
        allowed: &[Container],
    ) -> Result<MediaAsset> {
        let name = clean_file_name(candidate)?;

        let container = Container::from_path(Path::new(&name))
            .filter(|c| allowed.contains(c))
            .ok_or_else(|| Error::Validation(format!("file type not allowed: {name}")))?;

        let base = absolutize(base_dir)?;
        let path = base.join(&name);
        if !is_within(&path, &base) {
            tracing::warn!(candidate, base = %base.display(), "Lexical path escape rejected");
            return Err(Error::AccessDenied("path outside base directory".into()));
        }

        let file = File::open(&path)
            .await
            .map_err(|e| Error::from_open(e, path.display()))?;
        let lease = self
            .registry
            .register(ResourceKind::File, path.display().to_string());

        // From here on every early return drops `file` and `lease`.
        self.verify(file, lease, &path, &base, container).await
    }

    async fn verify(
        &self,
        mut file: File,
        lease: FdLease,
        path: &Path,
        base: &Path,
        container: Container,
    ) -> Result<MediaAsset> {
        let real_file = real_path_of(&file, path).await?;
        let real_base = tokio::fs::canonicalize(base).await?;

        if !is_within(&real_file, &real_base) {
            tracing::warn!(
                requested = %path.display(),
                target = %real_file.display(),
                base = %real_base.display(),
                "Symlink escape rejected"
            );
            return Err(Error::AccessDenied("symlink escape detected".into()));
        }

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::Validation(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let header = read_header(&mut file).await?;
        let detected = sniff::detect_mime(&header);
        sniff::check_mime(container, detected, self.strict_mime)?;

        tracing::debug!(
            path = %real_file.display(),
            container = %container,
            detected = detected.unwrap_or("none"),
            size = metadata.len(),
            "Media resolved"
        );

        Ok(MediaAsset {
            canonical_path: real_file,
            base_dir: real_base,
            container,
            detected_mime: detected.map(str::to_string),
            metadata,
            file,
            lease,
        })
    }
}

/// Reduce a caller-supplied name to a safe, NFC-normalized base name.
fn clean_file_name(candidate: &str) -> Result<String> {
    if candidate.trim().is_empty() {
        return Err(Error::Validation("Invalid filename".into()));
    }
    if candidate.contains('\0') {
        return Err(Error::Validation("filename contains a null byte".into()));
    }
    if candidate.starts_with(['/', '\\'])
        || candidate.split(['/', '\\']).any(|part| part == "..")
    {
        return Err(Error::Validation("filename must be a relative name".into()));
    }

    let raw = candidate.rsplit(['/', '\\']).next().unwrap_or_default();
    if raw == "." || !SAFE_NAME.is_match(raw) {
        return Err(Error::Validation(
            "filename contains unsafe characters or is too long".into(),
        ));
    }

    Ok(raw.nfc().collect())
}

/// Make `path` absolute against the working directory and fold `.`/`..`
/// lexically.
fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_lexically(&joined))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Lexical containment: `path` is strictly below `base`.
pub fn is_within(path: &Path, base: &Path) -> bool {
    let path = normalize_lexically(path);
    let base = normalize_lexically(base);
    path != base && path.starts_with(&base)
}

/// Real path of the opened descriptor, falling back to resolving `path`.
#[cfg(target_os = "linux")]
async fn real_path_of(file: &File, path: &Path) -> Result<PathBuf> {
    use std::os::fd::AsRawFd;

    let link = PathBuf::from(format!("/proc/self/fd/{}", file.as_raw_fd()));
    match tokio::fs::read_link(&link).await {
        Ok(real) if real.is_absolute() => Ok(real),
        _ => Ok(tokio::fs::canonicalize(path).await?),
    }
}

#[cfg(not(target_os = "linux"))]
async fn real_path_of(_file: &File, path: &Path) -> Result<PathBuf> {
    Ok(tokio::fs::canonicalize(path).await?)
}

/// Read up to [`SNIFF_LEN`] bytes and rewind.
async fn read_header(file: &mut File) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    file.seek(SeekFrom::Start(0)).await?;
    Ok(buf)
}

//! Pre-transcoded sibling discovery.
//!
//! A film at `<dir>/<name>.<ext>` may have a browser-ready copy somewhere in
//! `<dir>/<sibling_dir>/`. Selection prefers `<name>.mp4`, then any MP4 whose
//! name starts with `<name>`, then the first MP4 in name order.

use std::path::{Path, PathBuf};

/// The sibling directory for an original file.
pub fn sibling_dir_for(original: &Path, sibling_dir: &Path) -> Option<PathBuf> {
    original.parent().map(|dir| dir.join(sibling_dir))
}

/// List `.mp4` file names in `dir`, sorted.
///
/// A missing directory is the normal "no sibling" case and yields an empty
/// list, as does any other listing failure (logged).
pub async fn list_mp4_files(dir: &Path) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), "Failed to list sibling directory: {e}");
            }
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let is_mp4 = Path::new(&name)
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
                let is_candidate = match entry.file_type().await {
                    Ok(ft) => ft.is_file() || ft.is_symlink(),
                    Err(_) => false,
                };
                if is_mp4 && is_candidate {
                    names.push(name);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "Error reading sibling directory: {e}");
                break;
            }
        }
    }
    names.sort();
    names
}

/// Pick the best candidate for an original whose stem is `stem`.
pub fn select_sibling<'a>(candidates: &'a [String], stem: &str) -> Option<&'a str> {
    let exact = format!("{stem}.mp4");
    candidates
        .iter()
        .find(|c| **c == exact)
        .or_else(|| candidates.iter().find(|c| c.starts_with(stem)))
        .or_else(|| candidates.first())
        .map(String::as_str)
}

/// Locate a sibling for `original`, returning its directory and file name.
pub async fn find_sibling(original: &Path, sibling_dir: &Path) -> Option<(PathBuf, String)> {
    let dir = sibling_dir_for(original, sibling_dir)?;
    let stem = original.file_stem()?.to_str()?;
    let candidates = list_mp4_files(&dir).await;
    let selected = select_sibling(&candidates, stem)?.to_string();
    tracing::debug!(dir = %dir.display(), file = %selected, "Pre-transcoded sibling found");
    Some((dir, selected))
}

//! Program id to response: catalog lookup, source selection, engine dispatch.

use std::path::{Path, PathBuf};

use axum::response::Response;

use fv_core::{Container, Dispatch, Error, ProgramId, Result};
use fv_media::sibling;

use super::{direct, transcode, StreamRequest};
use crate::context::AppContext;

/// Containers browsers play without help.
const DIRECT_CONTAINERS: &[Container] = &[Container::Mp4, Container::Webm];

/// Catalog paths may carry a placeholder `.txt` suffix.
pub fn strip_placeholder_suffix(full_path: &str) -> &str {
    full_path.strip_suffix(".txt").unwrap_or(full_path)
}

/// Split a catalog path into its directory and file name.
fn split_path(full_path: &str) -> Result<(PathBuf, String)> {
    let path = Path::new(full_path);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("catalog path has no file name: {full_path}")))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((dir.to_path_buf(), name.to_string()))
}

/// Stream the film identified by `id`.
///
/// A pre-transcoded sibling MP4 wins over the original. Otherwise the
/// original's extension decides the engine. Once a source is picked, its
/// resolution errors are final.
pub async fn stream_film(
    ctx: &AppContext,
    id: &ProgramId,
    req: &StreamRequest,
) -> Result<Response> {
    let film = ctx
        .catalog
        .lookup(id)
        .await?
        .ok_or_else(|| Error::not_found("film", id))?;

    let original = strip_placeholder_suffix(&film.full_path);
    let streaming = &ctx.config.streaming;

    if let Some((dir, name)) =
        sibling::find_sibling(Path::new(original), &streaming.sibling_dir).await
    {
        tracing::debug!(
            request_id = req.request_id(),
            programid = %id,
            sibling = %name,
            "Serving pre-transcoded sibling"
        );
        let asset = ctx.resolver.resolve(&name, &dir, &[Container::Mp4]).await?;
        return direct::serve_direct(asset, req, streaming.direct_chunk());
    }

    let (dir, name) = split_path(original)?;
    let ext = Path::new(&name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match Dispatch::for_extension(ext) {
        Dispatch::Direct => {
            let asset = ctx.resolver.resolve(&name, &dir, DIRECT_CONTAINERS).await?;
            direct::serve_direct(asset, req, streaming.direct_chunk())
        }
        Dispatch::Transcode => {
            let container = Container::from_extension(ext)
                .ok_or_else(|| Error::UnsupportedMediaType(format!(".{ext}")))?;
            let asset = ctx.resolver.resolve(&name, &dir, &[container]).await?;
            transcode::serve_transcode(ctx, asset, req).await
        }
        Dispatch::Reject => {
            tracing::debug!(programid = %id, ext, "No engine for container");
            Err(Error::UnsupportedMediaType(if ext.is_empty() {
                name.clone()
            } else {
                format!(".{ext}")
            }))
        }
    }
}

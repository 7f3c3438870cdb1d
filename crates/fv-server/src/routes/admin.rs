//! Operational endpoints.

use axum::extract::State;
use axum::Json;

use fv_media::registry::FdStats;

use crate::context::AppContext;

/// GET /admin/fds
///
/// Snapshot of open descriptors and child processes, oldest first.
pub async fn fd_stats(State(ctx): State<AppContext>) -> Json<FdStats> {
    Json(ctx.registry.stats())
}

/// GET /admin/tools
pub async fn tools(State(ctx): State<AppContext>) -> Json<Vec<fv_av::ToolInfo>> {
    let tools = ctx.tools.clone();
    let infos = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .unwrap_or_default();
    Json(infos)
}

//! Axum router construction.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // `get` also answers HEAD; the handler checks the method.
        .route("/stream/{id}", get(routes::stream::stream_film))
        .route("/admin/fds", get(routes::admin::fd_stats))
        .route("/admin/tools", get(routes::admin::tools))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

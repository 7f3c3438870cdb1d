//! Film streaming route.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::Response;
use axum::Extension;

use fv_core::ProgramId;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::streaming::{self, StreamRequest};

/// GET|HEAD /stream/{id}
///
/// Serves the film as-is with range support, or as a live fragmented MP4
/// remux for containers browsers cannot play.
pub async fn stream_film(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<Response, AppError> {
    let id: ProgramId = id.parse().map_err(|e: fv_core::Error| {
        AppError::new(e).with_request_id(request_id.clone())
    })?;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let req = StreamRequest {
        head: method == Method::HEAD,
        range,
        request_id: Some(request_id.clone()),
    };

    tracing::debug!(
        programid = %id,
        head = req.head,
        range = req.range().unwrap_or("-"),
        "Stream requested"
    );

    streaming::stream_film(&ctx, &id, &req)
        .await
        .map_err(|e| AppError::new(e).with_request_id(request_id))
}

//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`fv_core::Error`] so that route handlers
//! can return `Result<T, AppError>` directly.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: fv_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: fv_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &fv_core::Error {
        &self.inner
    }
}

impl From<fv_core::Error> for AppError {
    fn from(e: fv_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "Server error in handler"
            );
        } else if matches!(self.inner, fv_core::Error::AccessDenied(_)) {
            tracing::warn!(
                error = %self.inner,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "Access denied"
            );
        }

        let code = match &self.inner {
            fv_core::Error::NotFound { .. } => "not_found",
            fv_core::Error::Validation(_) => "validation_error",
            fv_core::Error::AccessDenied(_) => "access_denied",
            fv_core::Error::UnsupportedMediaType(_) => "unsupported_media_type",
            fv_core::Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            fv_core::Error::Database { .. } => "database_error",
            fv_core::Error::Io { .. } => "io_error",
            fv_core::Error::Tool { .. } => "tool_error",
            fv_core::Error::Probe(_) => "probe_error",
            fv_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
            "request_id": self.request_id,
        });

        let mut response = (status, axum::Json(body)).into_response();

        if let fv_core::Error::RangeNotSatisfiable { size } = self.inner {
            if let Ok(v) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, v);
            }
        }

        response
    }
}

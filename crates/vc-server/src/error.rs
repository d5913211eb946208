//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; the body is always
//! `{error, code, request_id}` JSON.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: vc_core::Error,
    status: Option<StatusCode>,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: vc_core::Error) -> Self {
        Self {
            inner,
            status: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn inner(&self) -> &vc_core::Error {
        &self.inner
    }
}

impl From<vc_core::Error> for AppError {
    fn from(e: vc_core::Error) -> Self {
        Self::new(e)
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        Self {
            status: Some(e.status()),
            ..Self::new(vc_core::Error::validation("file", e.body_text()))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status.unwrap_or_else(|| {
            StatusCode::from_u16(self.inner.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        });

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError::new(vc_core::Error::not_found("conversion", "abc"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_produces_400() {
        let err = AppError::from(vc_core::Error::validation("file", "No file provided"));
        assert_eq!(err.inner().to_string(), "No file provided");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_produces_409() {
        let err = AppError::new(vc_core::Error::Conflict("not ready".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn with_request_id() {
        let err = AppError::new(vc_core::Error::Internal("oops".into())).with_request_id("req-123");
        assert_eq!(err.request_id.as_deref(), Some("req-123"));
    }
}

//! Caller-facing HTTP errors.
//!
//! Pipeline failures are not errors at this layer: they arrive as
//! [`crate::PipelineResult::Failure`] and are rendered by the handler.
//! [`ApiError`] covers requests that never reach the pipeline.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Request-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no file uploaded (field must be named \"file\")")]
    MissingFile,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("multipart parse error: {detail}")]
    Upload { status: StatusCode, detail: String },

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("Method Not Allowed")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload { status, .. } => *status,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Upload {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::MissingFile | ApiError::MethodNotAllowed => json!({
                "ok": false,
                "error": self.to_string(),
            }),
            ApiError::BadRequest(detail) => json!({
                "ok": false,
                "error": "invalid request",
                "details": detail,
            }),
            ApiError::Upload { detail, .. } => json!({
                "ok": false,
                "error": "multipart parse error",
                "details": detail,
            }),
            ApiError::TooLarge { .. } => json!({
                "ok": false,
                "error": "upload too large",
                "details": self.to_string(),
            }),
        };
        tracing::warn!(status = status.as_u16(), "Rejected request: {}", self);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::TooLarge { size: 2, limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn missing_file_message_names_the_field() {
        assert_eq!(
            ApiError::MissingFile.to_string(),
            r#"no file uploaded (field must be named "file")"#
        );
    }
}

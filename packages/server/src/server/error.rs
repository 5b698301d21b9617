use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::kernel::jobs::{JobError, PayloadError};

/// Errors returned by HTTP handlers.
///
/// Rendered as `{"error": <code>, "message": <text>, "details"?: ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Payload(e) => e.into(),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation { message, details } => {
                let mut body = json!({
                    "error": "validation_error",
                    "message": message,
                });
                if let Some(details) = details {
                    body["details"] = details;
                }
                (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
            }
            ApiError::NotFound(message) => {
                json_error(StatusCode::NOT_FOUND, "not_found", message)
            }
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(json!({ "error": "internal_error" })),
                )
                    .into_response()
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type FilesResult<T> = std::result::Result<T, FilesError>;

/// Artifact subsystem errors.
#[derive(Debug, Error)]
pub enum FilesError {
    /// The referenced artifact does not exist.
    #[error("File '{0}' not found")]
    NotFound(String),

    /// Malformed identifier, oversized upload, or oversized context.
    #[error("{0}")]
    Validation(String),

    /// The backing object store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl FilesError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "file_not_found",
            Self::Validation(_) => "validation",
            Self::Storage(_) => "service_unavailable",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    r#type: &'static str,
    message: String,
}

impl IntoResponse for FilesError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ErrorResponse {
            error: ErrorDetails {
                r#type: self.error_type(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Gateway errors with stable HTTP mappings.
///
/// Conversion and routing errors are terminal; transport errors are
/// candidates for the retry policy (see [`LlmError::is_transient`]).
#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed or unsupported input: unknown dialect, missing required
    /// fields, bad target format, oversized file context.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid gateway API key.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Provider-side credential failure or IAM denial.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// No strategy matches the model identifier.
    #[error("Model '{0}' is not supported by any configured provider")]
    UnsupportedModel(String),

    /// A referenced artifact does not exist.
    #[error("File '{0}' not found")]
    FileNotFound(String),

    /// Provider 429 or throttling, surfaced after retries are exhausted.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider 5xx or service unavailable, surfaced after retries.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Structured provider error (content policy, context length, model
    /// error) forwarded with its original status.
    #[error("Provider error ({status}): {message}")]
    Upstream {
        /// Status the provider answered with.
        status: u16,
        /// Provider's message, safe to forward.
        message: String,
    },

    /// A per-phase timeout elapsed.
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// The client went away; no response body is expected.
    #[error("Request cancelled by the client")]
    Cancelled,

    /// Transient transport failure talking to the provider.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bug or unexpected condition. `Some` messages come from a provider
    /// and may be shown; `None` hides gateway internals.
    #[error("Internal server error")]
    Internal(Option<String>),
}

impl LlmError {
    /// HTTP status the error surfaces as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::UnsupportedModel(_) | Self::FileNotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { status, .. } => match *status {
                400 => StatusCode::BAD_REQUEST,
                401 => StatusCode::UNAUTHORIZED,
                403 => StatusCode::FORBIDDEN,
                404 => StatusCode::NOT_FOUND,
                408 => StatusCode::REQUEST_TIMEOUT,
                422 => StatusCode::UNPROCESSABLE_ENTITY,
                429 => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // No body will be written anyway; the code closes the log line.
            Self::Cancelled => StatusCode::BAD_REQUEST,
            Self::Connection(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Taxonomy tag in the response body.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authentication(_) => "authentication",
            Self::Authorization(_) => "authorization",
            Self::UnsupportedModel(_) => "unsupported_model",
            Self::FileNotFound(_) => "file_not_found",
            Self::RateLimited(_) => "rate_limited",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Upstream { .. } => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Connection(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the retry policy may re-attempt the operation.
    ///
    /// Streaming responses consult this only while establishing the
    /// stream; once a chunk has been delivered nothing is retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::ServiceUnavailable(_) | Self::Connection(_) => true,
            Self::Upstream { status, .. } => matches!(status, 408 | 429) || *status >= 500,
            Self::Timeout(_) => true,
            Self::Validation(_)
            | Self::Authentication(_)
            | Self::Authorization(_)
            | Self::UnsupportedModel(_)
            | Self::FileNotFound(_)
            | Self::Cancelled
            | Self::Internal(_) => false,
        }
    }

    /// Message that is safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(provider_msg)) => provider_msg.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<files::FilesError> for LlmError {
    fn from(error: files::FilesError) -> Self {
        match error {
            files::FilesError::NotFound(id) => Self::FileNotFound(id),
            files::FilesError::Validation(message) => Self::Validation(message),
            files::FilesError::Storage(message) => Self::ServiceUnavailable(message),
        }
    }
}

/// User-visible error envelope: `{"error": {"type", "message"}}`.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    r#type: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = ErrorResponse {
            error: ErrorDetails {
                r#type: self.error_type(),
                message: self.client_message(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(LlmError::Validation("bad".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            LlmError::Authentication("no key".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(LlmError::Authorization("iam".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            LlmError::UnsupportedModel("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LlmError::FileNotFound("file-x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LlmError::RateLimited("slow down".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            LlmError::ServiceUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(LlmError::Timeout("provider call").status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(LlmError::Internal(None).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn transient_classification_matches_retry_rules() {
        assert!(LlmError::RateLimited("throttled".into()).is_transient());
        assert!(LlmError::ServiceUnavailable("503".into()).is_transient());
        assert!(LlmError::Connection("reset".into()).is_transient());
        assert!(
            LlmError::Upstream {
                status: 500,
                message: "boom".into()
            }
            .is_transient()
        );
        assert!(
            LlmError::Upstream {
                status: 429,
                message: "slow".into()
            }
            .is_transient()
        );

        assert!(!LlmError::Validation("bad".into()).is_transient());
        assert!(!LlmError::Authentication("denied".into()).is_transient());
        assert!(!LlmError::Authorization("denied".into()).is_transient());
        assert!(!LlmError::UnsupportedModel("x".into()).is_transient());
        assert!(!LlmError::FileNotFound("file-x".into()).is_transient());
        assert!(
            !LlmError::Upstream {
                status: 400,
                message: "policy".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn internal_errors_do_not_leak_without_provider_message() {
        assert_eq!(LlmError::Internal(None).client_message(), "Internal server error");
        assert_eq!(
            LlmError::Internal(Some("model overloaded".into())).client_message(),
            "model overloaded"
        );
    }
}

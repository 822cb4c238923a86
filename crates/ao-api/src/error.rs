//! Error types (ao-api)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// ao-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] ao_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

/// Generic API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::AuthFailed => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(e) => match e {
                ao_core::Error::TaskNotFound(_) | ao_core::Error::AgentNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                ao_core::Error::DuplicateAgent(_)
                | ao_core::Error::InvalidTransition { .. } => StatusCode::CONFLICT,
                ao_core::Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::Core(ao_core::Error::TaskNotFound("t1".to_string()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let conflict = ApiError::Core(ao_core::Error::InvalidTransition {
            task_id: "t1".to_string(),
            from: "completed".to_string(),
            to: "running".to_string(),
        });
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let bad = ApiError::InvalidRequest("missing field".to_string());
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let auth = ApiError::AuthFailed;
        assert_eq!(auth.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_error_response_shape() {
        let err = ApiError::Core(ao_core::Error::AgentNotFound("a1".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

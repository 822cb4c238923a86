//! Authentication middleware
//!
//! Provides API key authentication for protected endpoints.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::server::AppState;

/// API key authentication middleware
///
/// Checks the Authorization header against the configured key. The
/// health endpoint stays open so probes work without credentials.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    // Get API key from header
    let api_key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer ").map(|s| s.to_string()));

    // If no API key is configured, allow all requests
    // This is useful for development/testing
    // In production, you should always configure an API key
    if validate_api_key(api_key.as_deref(), state.config.api.key.as_deref()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Simple API key validation (for use in handlers)
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(p), Some(e)) => p == e,
        (_, None) => true,         // No key configured, allow
        (None, Some(_)) => false,  // Key required but not provided
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_api_key_no_key_configured() {
        assert!(validate_api_key(None, None));
        assert!(validate_api_key(Some("any"), None));
    }

    #[test]
    fn test_validate_api_key_with_key_configured() {
        assert!(!validate_api_key(None, Some("secret")));
        assert!(!validate_api_key(Some("wrong"), Some("secret")));
        assert!(validate_api_key(Some("secret"), Some("secret")));
    }
}

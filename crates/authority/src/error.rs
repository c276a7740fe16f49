//! Error types for the authority client.

use thiserror::Error;

use fieldsync_core::sync::{classify_http_status, RetryClass};

/// Result type alias for authority client operations.
pub type Result<T> = std::result::Result<T, AuthorityError>;

/// Errors that can occur while talking to the submission authority.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the authority
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing configuration, malformed data)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl AuthorityError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => RetryClass::Retryable,
            Self::Json(_) => RetryClass::Permanent,
            Self::InvalidRequest(_) => RetryClass::Permanent,
            Self::Auth(_) => RetryClass::ReauthRequired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_status_is_reauth() {
        assert_eq!(
            AuthorityError::api(401, "unauthorized").retry_class(),
            RetryClass::ReauthRequired
        );
        assert_eq!(
            AuthorityError::api(403, "not authorized").retry_class(),
            RetryClass::ReauthRequired
        );
    }

    #[test]
    fn retry_class_for_server_errors_is_retryable() {
        assert_eq!(
            AuthorityError::api(500, "boom").retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            AuthorityError::api(429, "slow down").retry_class(),
            RetryClass::Retryable
        );
    }

    #[test]
    fn retry_class_for_client_errors_is_permanent() {
        assert_eq!(
            AuthorityError::api(400, "bad request").retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            AuthorityError::invalid_request("no base url").retry_class(),
            RetryClass::Permanent
        );
    }
}

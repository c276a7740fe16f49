//! Error taxonomy for the submission pipeline.

use thiserror::Error;

/// Result type alias for submission pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the submission pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any persistence attempt
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient failure reaching the remote submission authority
    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected by the authority; queued data is kept
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The durable local queue cannot accept a write
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// True for the only fatal submit path: the queue refused the write.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

//! Remote submission authority contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sync_engine::{classify_http_status, RetryClass};
use crate::errors::Result;
use crate::observation::Observation;

/// Receipt returned by the authority for one batch.
///
/// The authority counts per-record successes but reports them without
/// per-record identifiers, so a receipt is only actionable as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    pub message: String,
    pub saved: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BatchReceipt {
    /// True when every record of a batch of `expected` was accepted.
    pub fn acknowledges_all(&self, expected: usize) -> bool {
        self.saved == expected && self.errors.is_empty()
    }
}

/// Failure reported by an authority implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityFailure {
    /// Transport-level failure: connect, timeout, body read
    #[error("network failure: {0}")]
    Network(String),

    /// Credential rejected by the authority
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Non-success response from the authority
    #[error("authority rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// HTTP success, but the receipt did not acknowledge the full batch
    #[error("partial acknowledgment: saved {saved} of {expected}")]
    Partial { saved: usize, expected: usize },
}

impl AuthorityFailure {
    /// Classify the failure for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) => RetryClass::Retryable,
            Self::Auth(_) => RetryClass::ReauthRequired,
            Self::Rejected { status, .. } => classify_http_status(*status),
            Self::Partial { .. } => RetryClass::Retryable,
        }
    }
}

/// Client contract for the remote submission authority.
#[async_trait]
pub trait SubmissionAuthority: Send + Sync {
    /// Send an ordered batch of observations under the given bearer token.
    async fn submit_batch(
        &self,
        token: &str,
        batch: &[Observation],
    ) -> std::result::Result<BatchReceipt, AuthorityFailure>;
}

/// Supplies the bearer credential attached to authority requests. Token
/// refresh is not handled here; an authentication failure is surfaced and
/// the queued data waits for new credentials.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

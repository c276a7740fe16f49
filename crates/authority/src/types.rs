//! Wire types for the submission authority API.

use serde::{Deserialize, Serialize};

/// Error body returned by the authority on non-success statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub detail: String,
}

//! Queue entry model and the durable local queue contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::observation::Observation;

/// A queued observation plus local retry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub observation: Observation,
    pub enqueued_at: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
}

impl QueueEntry {
    /// Natural key of the entry: the observation's submission instant.
    pub fn key(&self) -> &str {
        &self.observation.recorded_at
    }
}

/// Durable drain history. Persisted alongside the queue so backoff state
/// survives process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_drain_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<String>,
    pub last_outcome: Option<String>,
}

/// Contract for the durable local submission queue.
///
/// Implementations must make every mutation durable before returning and
/// serialize mutations relative to each other. Entries are ordered by their
/// submission instant, ascending.
#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    /// Append a new entry. Fails with a persistence error when the
    /// underlying storage cannot accept the write; the insert is atomic.
    async fn enqueue(&self, observation: Observation) -> Result<QueueEntry>;

    /// All queued entries in original submission order.
    async fn list_all(&self) -> Result<Vec<QueueEntry>>;

    /// Remove the given entries. Absent keys are no-ops, so a successful
    /// drain never races with entries enqueued after it started.
    async fn remove_by_keys(&self, keys: Vec<String>) -> Result<()>;

    /// Remove a single entry; removing an absent key is a no-op.
    async fn remove_by_key(&self, key: &str) -> Result<()> {
        self.remove_by_keys(vec![key.to_string()]).await
    }

    /// Remove all entries.
    async fn clear(&self) -> Result<()>;

    /// Number of entries awaiting delivery.
    async fn count_pending(&self) -> Result<usize>;

    /// Bump attempt counts and record the failure on the given entries.
    async fn schedule_retry(
        &self,
        keys: Vec<String>,
        backoff_seconds: i64,
        last_error: Option<String>,
        last_error_code: Option<String>,
    ) -> Result<()>;

    /// Current drain history.
    async fn engine_status(&self) -> Result<SyncEngineStatus>;

    /// Record a fully acknowledged drain and reset failure counters.
    async fn mark_drain_succeeded(&self) -> Result<()>;

    /// Record a failed drain: keep the error, bump the consecutive failure
    /// count, and store when the next attempt is due.
    async fn mark_drain_failed(
        &self,
        error: String,
        error_code: String,
        next_retry_at: Option<String>,
    ) -> Result<()>;
}

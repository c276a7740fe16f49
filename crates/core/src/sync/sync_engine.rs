//! Sync engine: direct-send vs queue decision, drain orchestration, and the
//! retry policy applied to authority failures.

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::authority_model::{AuthorityFailure, CredentialProvider, SubmissionAuthority};
use super::queue_model::{SubmissionQueue, SyncEngineStatus};
use super::sync_scheduler::{run_background_loop, REAUTH_RETRY_DELAY_SECS};
use crate::connectivity::ConnectivityMonitor;
use crate::errors::Result;
use crate::observation::Observation;

/// Retry policy classification for authority failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> RetryClass {
    match status {
        401 | 403 => RetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => RetryClass::Retryable,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(consecutive_failures: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(consecutive_failures.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}

/// Stable code persisted with a failed entry.
pub(crate) fn retry_class_code(class: RetryClass) -> &'static str {
    match class {
        RetryClass::Retryable => "retryable",
        RetryClass::Permanent => "permanent",
        RetryClass::ReauthRequired => "reauth_required",
    }
}

/// Path taken by a submit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    SentImmediately,
    QueuedForSync,
}

/// Result of one drain request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Queue was empty
    Idle,
    /// Another drain held the lock; this request was coalesced
    AlreadyRunning,
    /// Full batch acknowledged and removed from the queue
    Drained { sent: usize },
    /// Batch not acknowledged; entries kept with bumped attempt counts
    Failed { kept: usize, retry_class: RetryClass },
}

/// Orchestrates direct sends, durable queueing, and queue drains.
///
/// The durable queue is the single source of truth: queue contents are never
/// cached across suspension points, and a record leaves the queue only after
/// the authority acknowledged the batch that contained it.
pub struct SyncEngine {
    queue: Arc<dyn SubmissionQueue>,
    authority: Arc<dyn SubmissionAuthority>,
    credentials: Arc<dyn CredentialProvider>,
    monitor: Arc<ConnectivityMonitor>,
    drain_lock: Mutex<()>,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<dyn SubmissionQueue>,
        authority: Arc<dyn SubmissionAuthority>,
        credentials: Arc<dyn CredentialProvider>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            queue,
            authority,
            credentials,
            monitor,
            drain_lock: Mutex::new(()),
            background_task: Mutex::new(None),
        }
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Submit one observation: direct send while online, durable queue
    /// otherwise.
    ///
    /// Any direct-send failure falls back to the queue before it is reported
    /// anywhere, so the record survives even a send that died mid-flight.
    /// Only a queue write failure surfaces as an error.
    pub async fn submit(&self, observation: Observation) -> Result<SubmitOutcome> {
        observation.validate()?;

        if self.monitor.is_online() {
            match self.try_direct_send(&observation).await {
                Ok(()) => {
                    debug!("Direct send confirmed for {}", observation.recorded_at);
                    return Ok(SubmitOutcome::SentImmediately);
                }
                Err(failure) => {
                    warn!(
                        "Direct send failed ({}); queueing {}",
                        failure, observation.recorded_at
                    );
                }
            }
        }

        self.queue.enqueue(observation).await?;
        Ok(SubmitOutcome::QueuedForSync)
    }

    async fn try_direct_send(
        &self,
        observation: &Observation,
    ) -> std::result::Result<(), AuthorityFailure> {
        let token = self
            .credentials
            .access_token()
            .map_err(|err| AuthorityFailure::Auth(err.to_string()))?;

        let batch = std::slice::from_ref(observation);
        let receipt = self.authority.submit_batch(&token, batch).await?;
        if receipt.acknowledges_all(1) {
            Ok(())
        } else {
            Err(AuthorityFailure::Partial {
                saved: receipt.saved,
                expected: 1,
            })
        }
    }

    /// Drain the queue against the authority.
    ///
    /// At most one drain runs at a time; a request arriving mid-drain is
    /// coalesced. Removal targets exactly the entries read at drain start,
    /// so entries enqueued while the batch was in flight survive.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            debug!("Drain already in flight; coalescing request");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let entries = self.queue.list_all().await?;
        if entries.is_empty() {
            return Ok(DrainOutcome::Idle);
        }

        let keys: Vec<String> = entries.iter().map(|e| e.key().to_string()).collect();
        let batch: Vec<Observation> = entries.into_iter().map(|e| e.observation).collect();

        let token = match self.credentials.access_token() {
            Ok(value) => value,
            Err(err) => {
                return self
                    .record_drain_failure(keys, AuthorityFailure::Auth(err.to_string()))
                    .await;
            }
        };

        match self.authority.submit_batch(&token, &batch).await {
            Ok(receipt) if receipt.acknowledges_all(batch.len()) => {
                let sent = keys.len();
                self.queue.remove_by_keys(keys).await?;
                self.queue.mark_drain_succeeded().await?;
                info!("Drained {} queued submission(s)", sent);
                Ok(DrainOutcome::Drained { sent })
            }
            Ok(receipt) => {
                // The receipt names no record identifiers, so an incomplete
                // acknowledgment cannot be mapped to keys; keep everything
                // and retry the whole batch.
                self.record_drain_failure(
                    keys,
                    AuthorityFailure::Partial {
                        saved: receipt.saved,
                        expected: batch.len(),
                    },
                )
                .await
            }
            Err(failure) => self.record_drain_failure(keys, failure).await,
        }
    }

    async fn record_drain_failure(
        &self,
        keys: Vec<String>,
        failure: AuthorityFailure,
    ) -> Result<DrainOutcome> {
        let retry_class = failure.retry_class();
        let code = retry_class_code(retry_class);
        let status = self.queue.engine_status().await.unwrap_or_default();
        let backoff = match retry_class {
            RetryClass::ReauthRequired => REAUTH_RETRY_DELAY_SECS,
            _ => backoff_seconds(status.consecutive_failures),
        };

        let kept = keys.len();
        self.queue
            .schedule_retry(
                keys,
                backoff,
                Some(failure.to_string()),
                Some(code.to_string()),
            )
            .await?;
        let retry_at = (Utc::now() + Duration::seconds(backoff)).to_rfc3339();
        self.queue
            .mark_drain_failed(failure.to_string(), code.to_string(), Some(retry_at))
            .await?;

        warn!(
            "Drain failed ({}); {} submission(s) kept queued, retry in {}s",
            failure, kept, backoff
        );
        Ok(DrainOutcome::Failed { kept, retry_class })
    }

    /// Number of submissions awaiting delivery. Always re-read from the
    /// store.
    pub async fn pending_count(&self) -> Result<usize> {
        self.queue.count_pending().await
    }

    /// Durable drain history.
    pub async fn status(&self) -> Result<SyncEngineStatus> {
        self.queue.engine_status().await
    }

    /// Start the background drain loop if it is not already running.
    pub async fn ensure_background_started(self: &Arc<Self>) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let engine = Arc::clone(self);
        *guard = Some(tokio::spawn(run_background_loop(engine)));
    }

    /// Abort the background drain loop.
    pub async fn ensure_background_stopped(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

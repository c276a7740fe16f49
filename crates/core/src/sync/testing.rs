//! In-memory fakes shared by engine and form controller tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    AuthorityFailure, BatchReceipt, CredentialProvider, QueueEntry, SubmissionAuthority,
    SubmissionQueue, SyncEngineStatus,
};
use crate::errors::{Error, Result};
use crate::observation::Observation;

/// In-memory queue mirroring the durable contract.
#[derive(Default)]
pub(crate) struct MemoryQueue {
    entries: Mutex<Vec<QueueEntry>>,
    status: Mutex<SyncEngineStatus>,
    pub(crate) fail_writes: AtomicBool,
}

impl MemoryQueue {
    pub(crate) fn entry_keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("queue lock")
            .iter()
            .map(|e| e.key().to_string())
            .collect()
    }

    pub(crate) fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().expect("queue lock").clone()
    }
}

#[async_trait]
impl SubmissionQueue for MemoryQueue {
    async fn enqueue(&self, observation: Observation) -> Result<QueueEntry> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("storage unavailable"));
        }

        let mut entries = self.entries.lock().expect("queue lock");
        if entries.iter().any(|e| e.key() == observation.recorded_at) {
            return Err(Error::persistence("duplicate submission key"));
        }
        let entry = QueueEntry {
            observation,
            enqueued_at: Utc::now().to_rfc3339(),
            attempt_count: 0,
            next_retry_at: None,
            last_error: None,
            last_error_code: None,
        };
        entries.push(entry.clone());
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(entry)
    }

    async fn list_all(&self) -> Result<Vec<QueueEntry>> {
        Ok(self.entries())
    }

    async fn remove_by_keys(&self, keys: Vec<String>) -> Result<()> {
        let mut entries = self.entries.lock().expect("queue lock");
        entries.retain(|e| !keys.iter().any(|k| k == e.key()));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().expect("queue lock").clear();
        Ok(())
    }

    async fn count_pending(&self) -> Result<usize> {
        Ok(self.entries.lock().expect("queue lock").len())
    }

    async fn schedule_retry(
        &self,
        keys: Vec<String>,
        backoff_seconds: i64,
        last_error: Option<String>,
        last_error_code: Option<String>,
    ) -> Result<()> {
        let retry_at =
            (Utc::now() + chrono::Duration::seconds(backoff_seconds)).to_rfc3339();
        let mut entries = self.entries.lock().expect("queue lock");
        for entry in entries.iter_mut() {
            if keys.iter().any(|k| k == entry.key()) {
                entry.attempt_count += 1;
                entry.next_retry_at = Some(retry_at.clone());
                entry.last_error = last_error.clone();
                entry.last_error_code = last_error_code.clone();
            }
        }
        Ok(())
    }

    async fn engine_status(&self) -> Result<SyncEngineStatus> {
        Ok(self.status.lock().expect("status lock").clone())
    }

    async fn mark_drain_succeeded(&self) -> Result<()> {
        let mut status = self.status.lock().expect("status lock");
        *status = SyncEngineStatus {
            last_drain_at: Some(Utc::now().to_rfc3339()),
            last_error: None,
            consecutive_failures: 0,
            next_retry_at: None,
            last_outcome: Some("ok".to_string()),
        };
        Ok(())
    }

    async fn mark_drain_failed(
        &self,
        error: String,
        error_code: String,
        next_retry_at: Option<String>,
    ) -> Result<()> {
        let mut status = self.status.lock().expect("status lock");
        status.last_drain_at = Some(Utc::now().to_rfc3339());
        status.last_error = Some(error);
        status.consecutive_failures += 1;
        status.next_retry_at = next_retry_at;
        status.last_outcome = Some(error_code);
        Ok(())
    }
}

/// Scripted per-call outcome for the fake authority.
pub(crate) enum ScriptedOutcome {
    AcceptAll,
    Partial { saved: usize },
    Failure(AuthorityFailure),
}

/// Fake authority that records received batches and replays scripted
/// outcomes; unscripted calls accept everything.
#[derive(Default)]
pub(crate) struct ScriptedAuthority {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    batches: Mutex<Vec<Vec<Observation>>>,
    pub(crate) delay_ms: u64,
}

impl ScriptedAuthority {
    pub(crate) fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    pub(crate) fn script(&self, outcome: ScriptedOutcome) {
        self.outcomes.lock().expect("script lock").push_back(outcome);
    }

    pub(crate) fn batches(&self) -> Vec<Vec<Observation>> {
        self.batches.lock().expect("batch lock").clone()
    }
}

#[async_trait]
impl SubmissionAuthority for ScriptedAuthority {
    async fn submit_batch(
        &self,
        _token: &str,
        batch: &[Observation],
    ) -> std::result::Result<BatchReceipt, AuthorityFailure> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.batches
            .lock()
            .expect("batch lock")
            .push(batch.to_vec());

        let outcome = self
            .outcomes
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(ScriptedOutcome::AcceptAll);
        match outcome {
            ScriptedOutcome::AcceptAll => Ok(BatchReceipt {
                message: "Forms synced".to_string(),
                saved: batch.len(),
                errors: Vec::new(),
            }),
            ScriptedOutcome::Partial { saved } => Ok(BatchReceipt {
                message: "Forms synced".to_string(),
                saved,
                errors: vec!["record rejected".to_string()],
            }),
            ScriptedOutcome::Failure(failure) => Err(failure),
        }
    }
}

/// Credential provider returning a fixed token.
pub(crate) struct StaticCredentials;

impl CredentialProvider for StaticCredentials {
    fn access_token(&self) -> Result<String> {
        Ok("test-token".to_string())
    }
}

/// Credential provider that always fails, simulating a signed-out user.
pub(crate) struct MissingCredentials;

impl CredentialProvider for MissingCredentials {
    fn access_token(&self) -> Result<String> {
        Err(Error::authentication("No access token configured"))
    }
}

pub(crate) fn engine_fixture(
    online: bool,
    authority: Arc<ScriptedAuthority>,
) -> (
    Arc<super::SyncEngine>,
    Arc<MemoryQueue>,
    Arc<crate::connectivity::ConnectivityMonitor>,
) {
    let queue = Arc::new(MemoryQueue::default());
    let monitor = Arc::new(crate::connectivity::ConnectivityMonitor::new(online));
    let engine = Arc::new(super::SyncEngine::new(
        queue.clone(),
        authority,
        Arc::new(StaticCredentials),
        monitor.clone(),
    ));
    (engine, queue, monitor)
}

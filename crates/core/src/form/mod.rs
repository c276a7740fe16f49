//! Submission form controller: validates input, stamps the submission
//! instant, and delegates every persistence decision to the sync engine.

use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::observation::{Attendance, Grade, HealthStatus, Observation, SubmissionClock};
use crate::sync::{SubmitOutcome, SyncEngine};

/// Editable draft bound to the submission form inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDraft {
    pub subject_id: String,
    pub age: Option<u32>,
    pub grade: Option<Grade>,
    pub attendance: Attendance,
    pub health_status: HealthStatus,
    pub notes: String,
}

/// Outcome surfaced to the user after a submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Submitted,
    SavedOffline,
    SaveFailed,
}

impl FormStatus {
    /// User-visible status line.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Submitted => "Form submitted successfully!",
            Self::SavedOffline => "Form saved offline. Will sync when online.",
            Self::SaveFailed => "Error saving form data.",
        }
    }
}

/// Thin controller between user input and the sync engine.
pub struct SubmissionForm {
    engine: Arc<SyncEngine>,
    clock: SubmissionClock,
    draft: ObservationDraft,
}

impl SubmissionForm {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            clock: SubmissionClock::new(),
            draft: ObservationDraft::default(),
        }
    }

    pub fn draft(&self) -> &ObservationDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut ObservationDraft {
        &mut self.draft
    }

    /// Validate the draft, stamp the submission instant, and submit.
    ///
    /// The draft resets after every accepted submission. A queue persistence
    /// failure keeps the input so the user can retry, and is the only path
    /// reported as a save failure. A validation failure is returned as an
    /// error before any persistence attempt.
    pub async fn submit(&mut self) -> Result<FormStatus> {
        if self.draft.subject_id.trim().is_empty() {
            return Err(Error::validation("Subject identifier is required"));
        }

        let draft = self.draft.clone();
        let observation = Observation {
            subject_id: draft.subject_id.trim().to_string(),
            age: draft.age,
            grade: draft.grade,
            attendance: draft.attendance,
            health_status: draft.health_status,
            notes: draft.notes,
            recorded_at: self.clock.next_instant(),
        };

        match self.engine.submit(observation).await {
            Ok(SubmitOutcome::SentImmediately) => {
                self.draft = ObservationDraft::default();
                Ok(FormStatus::Submitted)
            }
            Ok(SubmitOutcome::QueuedForSync) => {
                self.draft = ObservationDraft::default();
                Ok(FormStatus::SavedOffline)
            }
            Err(err) if err.is_persistence() => {
                warn!("Submission could not be saved: {}", err);
                Ok(FormStatus::SaveFailed)
            }
            Err(err) => Err(err),
        }
    }

    /// Pending indicator shown next to the form.
    pub async fn pending_count(&self) -> Result<usize> {
        self.engine.pending_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{engine_fixture, ScriptedAuthority};
    use std::sync::atomic::Ordering;

    fn form(online: bool) -> (SubmissionForm, Arc<crate::sync::testing::MemoryQueue>) {
        let authority = Arc::new(ScriptedAuthority::default());
        let (engine, queue, _monitor) = engine_fixture(online, authority);
        (SubmissionForm::new(engine), queue)
    }

    #[tokio::test]
    async fn submit_requires_a_subject_identifier() {
        let (mut form, queue) = form(true);
        form.draft_mut().notes = "observed during morning session".to_string();

        let result = form.submit().await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(queue.entries().is_empty());
        // Draft is untouched so the user can correct it.
        assert_eq!(form.draft().notes, "observed during morning session");
    }

    #[tokio::test]
    async fn accepted_online_submit_resets_the_draft() {
        let (mut form, _queue) = form(true);
        form.draft_mut().subject_id = "Amina".to_string();
        form.draft_mut().age = Some(9);

        let status = form.submit().await.expect("submit");

        assert_eq!(status, FormStatus::Submitted);
        assert_eq!(status.message(), "Form submitted successfully!");
        assert_eq!(form.draft(), &ObservationDraft::default());
    }

    #[tokio::test]
    async fn offline_submit_reports_saved_offline() {
        let (mut form, queue) = form(false);
        form.draft_mut().subject_id = "Amina".to_string();

        let status = form.submit().await.expect("submit");

        assert_eq!(status, FormStatus::SavedOffline);
        assert_eq!(status.message(), "Form saved offline. Will sync when online.");
        assert_eq!(queue.entries().len(), 1);
        assert_eq!(form.pending_count().await.expect("count"), 1);
        assert_eq!(form.draft(), &ObservationDraft::default());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_the_draft_for_retry() {
        let (mut form, queue) = form(false);
        queue.fail_writes.store(true, Ordering::SeqCst);
        form.draft_mut().subject_id = "Amina".to_string();

        let status = form.submit().await.expect("submit");

        assert_eq!(status, FormStatus::SaveFailed);
        assert_eq!(status.message(), "Error saving form data.");
        assert_eq!(form.draft().subject_id, "Amina");
    }

    #[tokio::test]
    async fn subject_identifier_is_trimmed_before_submission() {
        let (mut form, queue) = form(false);
        form.draft_mut().subject_id = "  Amina  ".to_string();

        form.submit().await.expect("submit");

        assert_eq!(queue.entries()[0].observation.subject_id, "Amina");
    }
}

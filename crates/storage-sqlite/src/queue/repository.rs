//! Repository implementing the durable submission queue contract.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use std::sync::Arc;

use fieldsync_core::errors::{Error, Result};
use fieldsync_core::observation::Observation;
use fieldsync_core::sync::{QueueEntry, SubmissionQueue, SyncEngineStatus};

use super::model::{PendingSubmissionDB, SyncEngineStateDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{pending_submissions, sync_engine_state};

fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)
        .map_err(|e| Error::persistence(format!("Enum encode failed: {}", e)))?
        .trim_matches('"')
        .to_string())
}

fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_str(&format!("\"{}\"", value))
        .map_err(|e| Error::persistence(format!("Enum decode failed for '{}': {}", value, e)))
}

fn to_row(observation: &Observation, enqueued_at: String) -> Result<PendingSubmissionDB> {
    Ok(PendingSubmissionDB {
        recorded_at: observation.recorded_at.clone(),
        subject_id: observation.subject_id.clone(),
        age: observation.age.map(|v| v as i32),
        grade: observation.grade.as_ref().map(enum_to_db).transpose()?,
        attendance: enum_to_db(&observation.attendance)?,
        health_status: enum_to_db(&observation.health_status)?,
        notes: observation.notes.clone(),
        enqueued_at,
        attempt_count: 0,
        next_retry_at: None,
        last_error: None,
        last_error_code: None,
    })
}

fn to_entry(row: PendingSubmissionDB) -> Result<QueueEntry> {
    Ok(QueueEntry {
        observation: Observation {
            subject_id: row.subject_id,
            age: row.age.map(|v| v as u32),
            grade: row.grade.as_deref().map(enum_from_db).transpose()?,
            attendance: enum_from_db(&row.attendance)?,
            health_status: enum_from_db(&row.health_status)?,
            notes: row.notes,
            recorded_at: row.recorded_at,
        },
        enqueued_at: row.enqueued_at,
        attempt_count: row.attempt_count,
        next_retry_at: row.next_retry_at,
        last_error: row.last_error,
        last_error_code: row.last_error_code,
    })
}

/// SQLite-backed durable submission queue.
///
/// Reads go through the shared pool; every mutation goes through the
/// serialized writer and is durable before the call returns.
pub struct SubmissionQueueRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SubmissionQueueRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SubmissionQueue for SubmissionQueueRepository {
    async fn enqueue(&self, observation: Observation) -> Result<QueueEntry> {
        let row = to_row(&observation, Utc::now().to_rfc3339())?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(pending_submissions::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                to_entry(row)
            })
            .await
    }

    async fn list_all(&self) -> Result<Vec<QueueEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = pending_submissions::table
            .order(pending_submissions::recorded_at.asc())
            .load::<PendingSubmissionDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(to_entry).collect()
    }

    async fn remove_by_keys(&self, keys: Vec<String>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        self.writer
            .exec(move |conn| {
                diesel::delete(
                    pending_submissions::table
                        .filter(pending_submissions::recorded_at.eq_any(keys)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.writer
            .exec(|conn| {
                diesel::delete(pending_submissions::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn count_pending(&self) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = pending_submissions::table
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    async fn schedule_retry(
        &self,
        keys: Vec<String>,
        backoff_seconds: i64,
        last_error: Option<String>,
        last_error_code: Option<String>,
    ) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        self.writer
            .exec(move |conn| {
                let retry_at = (Utc::now() + Duration::seconds(backoff_seconds)).to_rfc3339();
                let rows = pending_submissions::table
                    .filter(pending_submissions::recorded_at.eq_any(&keys))
                    .load::<PendingSubmissionDB>(conn)
                    .map_err(StorageError::from)?;

                for row in rows {
                    diesel::update(pending_submissions::table.find(row.recorded_at))
                        .set((
                            pending_submissions::attempt_count.eq(row.attempt_count + 1),
                            pending_submissions::next_retry_at.eq(Some(retry_at.clone())),
                            pending_submissions::last_error.eq(last_error.clone()),
                            pending_submissions::last_error_code.eq(last_error_code.clone()),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(())
            })
            .await
    }

    async fn engine_status(&self) -> Result<SyncEngineStatus> {
        let mut conn = get_connection(&self.pool)?;
        let state = sync_engine_state::table
            .find(1)
            .first::<SyncEngineStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;

        Ok(state
            .map(|s| SyncEngineStatus {
                last_drain_at: s.last_drain_at,
                last_error: s.last_error,
                consecutive_failures: s.consecutive_failures,
                next_retry_at: s.next_retry_at,
                last_outcome: s.last_outcome,
            })
            .unwrap_or_default())
    }

    async fn mark_drain_succeeded(&self) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        id: 1,
                        last_drain_at: Some(now.clone()),
                        last_error: None,
                        consecutive_failures: 0,
                        next_retry_at: None,
                        last_outcome: Some("ok".to_string()),
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_drain_at.eq(Some(now)),
                        sync_engine_state::last_error.eq::<Option<String>>(None),
                        sync_engine_state::consecutive_failures.eq(0),
                        sync_engine_state::next_retry_at.eq::<Option<String>>(None),
                        sync_engine_state::last_outcome.eq(Some("ok")),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_drain_failed(
        &self,
        error: String,
        error_code: String,
        next_retry_at: Option<String>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        id: 1,
                        last_drain_at: Some(now.clone()),
                        last_error: Some(error.clone()),
                        consecutive_failures: 1,
                        next_retry_at: next_retry_at.clone(),
                        last_outcome: Some(error_code.clone()),
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_drain_at.eq(Some(now)),
                        sync_engine_state::last_error.eq(Some(error)),
                        sync_engine_state::consecutive_failures
                            .eq(sync_engine_state::consecutive_failures + 1),
                        sync_engine_state::next_retry_at.eq(next_retry_at),
                        sync_engine_state::last_outcome.eq(Some(error_code)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::db::{create_pool, init, run_migrations, spawn_writer};
    use fieldsync_core::observation::{
        Attendance, Grade, HealthStatus, SubmissionClock,
    };

    fn setup() -> (Arc<DbPool>, WriteHandle, String) {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        (pool, writer, db_path)
    }

    fn repo(pool: &Arc<DbPool>, writer: &WriteHandle) -> SubmissionQueueRepository {
        SubmissionQueueRepository::new(pool.clone(), writer.clone())
    }

    fn observation(clock: &SubmissionClock, subject: &str) -> Observation {
        Observation {
            subject_id: subject.to_string(),
            age: Some(9),
            grade: Some(Grade::Third),
            attendance: Attendance::Present,
            health_status: HealthStatus::NeedsAttention,
            notes: "observed during morning session".to_string(),
            recorded_at: clock.next_instant(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_list_round_trips_all_fields() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let original = observation(&clock, "Amina");
        let entry = repo.enqueue(original.clone()).await.expect("enqueue");
        assert_eq!(entry.attempt_count, 0);

        let listed = repo.list_all().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].observation, original);
        assert!(listed[0].last_error.is_none());
    }

    #[tokio::test]
    async fn list_preserves_creation_order() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let first = observation(&clock, "Amina");
        let second = observation(&clock, "Brook");
        let third = observation(&clock, "Chaltu");
        // Insert out of order; listing must come back in key order.
        repo.enqueue(second.clone()).await.expect("enqueue");
        repo.enqueue(first.clone()).await.expect("enqueue");
        repo.enqueue(third.clone()).await.expect("enqueue");

        let keys: Vec<String> = repo
            .list_all()
            .await
            .expect("list")
            .into_iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![first.recorded_at, second.recorded_at, third.recorded_at]
        );
    }

    #[tokio::test]
    async fn queued_entries_survive_reopen() {
        let (pool, writer, db_path) = setup();
        let clock = SubmissionClock::new();
        let original = observation(&clock, "Amina");
        repo(&pool, &writer)
            .enqueue(original.clone())
            .await
            .expect("enqueue");
        drop(writer);
        drop(pool);

        let reopened_pool = create_pool(&db_path).expect("reopen pool");
        let reopened_writer = spawn_writer(reopened_pool.as_ref().clone());
        let reopened = repo(&reopened_pool, &reopened_writer);

        let listed = reopened.list_all().await.expect("list after reopen");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].observation, original);
    }

    #[tokio::test]
    async fn duplicate_submission_key_is_rejected_atomically() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let original = observation(&clock, "Amina");
        let mut duplicate = observation(&clock, "Brook");
        duplicate.recorded_at = original.recorded_at.clone();

        repo.enqueue(original.clone()).await.expect("enqueue");
        let err = repo
            .enqueue(duplicate)
            .await
            .expect_err("duplicate key must fail");
        assert!(err.is_persistence());

        let listed = repo.list_all().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].observation.subject_id, "Amina");
    }

    #[tokio::test]
    async fn remove_by_key_is_idempotent() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let original = observation(&clock, "Amina");
        let key = original.recorded_at.clone();
        repo.enqueue(original).await.expect("enqueue");

        repo.remove_by_key(&key).await.expect("first removal");
        assert_eq!(repo.count_pending().await.expect("count"), 0);
        // Removing an absent key is a no-op, not an error.
        repo.remove_by_key(&key).await.expect("second removal");
        assert_eq!(repo.count_pending().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn removal_targets_only_the_given_keys() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let drained = observation(&clock, "Amina");
        let late = observation(&clock, "Brook");
        repo.enqueue(drained.clone()).await.expect("enqueue");
        repo.enqueue(late.clone()).await.expect("enqueue");

        repo.remove_by_keys(vec![drained.recorded_at])
            .await
            .expect("remove drained");

        let listed = repo.list_all().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key(), late.recorded_at);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        repo.enqueue(observation(&clock, "Amina"))
            .await
            .expect("enqueue");
        repo.enqueue(observation(&clock, "Brook"))
            .await
            .expect("enqueue");

        repo.clear().await.expect("clear");
        assert_eq!(repo.count_pending().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn schedule_retry_bumps_attempts_and_records_the_error() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let original = observation(&clock, "Amina");
        let key = original.recorded_at.clone();
        repo.enqueue(original).await.expect("enqueue");

        repo.schedule_retry(
            vec![key.clone()],
            10,
            Some("authority rejected batch (503): unavailable".to_string()),
            Some("retryable".to_string()),
        )
        .await
        .expect("first retry");
        repo.schedule_retry(vec![key], 20, Some("network failure: timeout".to_string()), None)
            .await
            .expect("second retry");

        let listed = repo.list_all().await.expect("list");
        assert_eq!(listed[0].attempt_count, 2);
        assert_eq!(
            listed[0].last_error.as_deref(),
            Some("network failure: timeout")
        );
        assert!(listed[0].next_retry_at.is_some());
    }

    #[tokio::test]
    async fn drain_state_tracks_consecutive_failures() {
        let (pool, writer, db_path) = setup();
        let repo = repo(&pool, &writer);

        assert_eq!(
            repo.engine_status().await.expect("default status"),
            SyncEngineStatus::default()
        );

        repo.mark_drain_failed(
            "network failure: timeout".to_string(),
            "retryable".to_string(),
            Some("2026-08-08T10:00:05.000Z".to_string()),
        )
        .await
        .expect("first failure");
        repo.mark_drain_failed(
            "network failure: timeout".to_string(),
            "retryable".to_string(),
            None,
        )
        .await
        .expect("second failure");

        let status = repo.engine_status().await.expect("status");
        assert_eq!(status.consecutive_failures, 2);
        assert_eq!(status.last_outcome.as_deref(), Some("retryable"));

        // Failure history survives a reopen.
        drop(repo);
        let reopened_pool = create_pool(&db_path).expect("reopen pool");
        let reopened_writer = spawn_writer(reopened_pool.as_ref().clone());
        let reopened = SubmissionQueueRepository::new(reopened_pool, reopened_writer);
        assert_eq!(
            reopened
                .engine_status()
                .await
                .expect("status after reopen")
                .consecutive_failures,
            2
        );

        reopened.mark_drain_succeeded().await.expect("success");
        let status = reopened.engine_status().await.expect("status");
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
        assert!(status.next_retry_at.is_none());
        assert_eq!(status.last_outcome.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn enum_round_trip_matches_wire_strings() {
        let (pool, writer, _path) = setup();
        let repo = repo(&pool, &writer);
        let clock = SubmissionClock::new();

        let mut original = observation(&clock, "Amina");
        original.attendance = Attendance::Late;
        original.health_status = HealthStatus::NeedsAttention;
        original.grade = Some(Grade::Fifth);
        repo.enqueue(original.clone()).await.expect("enqueue");

        let listed = repo.list_all().await.expect("list");
        assert_eq!(listed[0].observation.attendance, Attendance::Late);
        assert_eq!(
            listed[0].observation.health_status,
            HealthStatus::NeedsAttention
        );
        assert_eq!(listed[0].observation.grade, Some(Grade::Fifth));
    }
}

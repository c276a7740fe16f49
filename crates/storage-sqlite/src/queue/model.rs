//! Database models for the submission queue tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(recorded_at))]
#[diesel(table_name = crate::schema::pending_submissions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingSubmissionDB {
    pub recorded_at: String,
    pub subject_id: String,
    pub age: Option<i32>,
    pub grade: Option<String>,
    pub attendance: String,
    pub health_status: String,
    pub notes: String,
    pub enqueued_at: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_engine_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncEngineStateDB {
    pub id: i32,
    pub last_drain_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<String>,
    pub last_outcome: Option<String>,
}

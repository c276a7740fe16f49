//! Diesel schema for the submission queue tables.

diesel::table! {
    pending_submissions (recorded_at) {
        recorded_at -> Text,
        subject_id -> Text,
        age -> Nullable<Integer>,
        grade -> Nullable<Text>,
        attendance -> Text,
        health_status -> Text,
        notes -> Text,
        enqueued_at -> Text,
        attempt_count -> Integer,
        next_retry_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        last_error_code -> Nullable<Text>,
    }
}

diesel::table! {
    sync_engine_state (id) {
        id -> Integer,
        last_drain_at -> Nullable<Text>,
        last_error -> Nullable<Text>,
        consecutive_failures -> Integer,
        next_retry_at -> Nullable<Text>,
        last_outcome -> Nullable<Text>,
    }
}

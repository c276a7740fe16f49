//! Observation domain model and submission-time key assignment.

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::errors::{Error, Result};

/// Grade bucket recorded on an observation. The wire form matches the
/// authority's enumerated strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
    #[serde(rename = "4")]
    Fourth,
    #[serde(rename = "5")]
    Fifth,
}

/// Attendance status for the observed subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attendance {
    Present,
    Absent,
    Late,
}

impl Default for Attendance {
    fn default() -> Self {
        Self::Present
    }
}

/// Health status for the observed subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Good,
    Fair,
    Poor,
    NeedsAttention,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Good
    }
}

/// One field observation.
///
/// `recorded_at` is assigned once at submission time and doubles as the
/// natural key of the local queue, so it must be unique per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    pub attendance: Attendance,
    pub health_status: HealthStatus,
    #[serde(default)]
    pub notes: String,
    pub recorded_at: String,
}

impl Observation {
    /// Check the required-field invariant.
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.trim().is_empty() {
            return Err(Error::validation("Subject identifier must not be empty"));
        }
        Ok(())
    }

    /// Queue key of this observation.
    pub fn key(&self) -> &str {
        &self.recorded_at
    }
}

/// Issues strictly increasing submission instants.
///
/// A wall-clock read at or before the last issued instant advances by one
/// millisecond instead, so `recorded_at` stays unique even when submits land
/// in the same millisecond or the host clock steps backwards.
#[derive(Debug, Default)]
pub struct SubmissionClock {
    last_issued_millis: AtomicI64,
}

impl SubmissionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next submission instant as RFC 3339 with millisecond precision.
    ///
    /// Fixed-width formatting with a `Z` suffix keeps lexicographic order
    /// equal to chronological order.
    pub fn next_instant(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let issued = match self.last_issued_millis.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last + 1)),
        ) {
            Ok(last) | Err(last) => now.max(last + 1),
        };
        format_instant_millis(issued)
    }
}

/// Format epoch milliseconds as RFC 3339 with fixed millisecond precision.
pub fn format_instant_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(instant) => {
            instant.to_rfc3339_opts(SecondsFormat::Millis, true)
        }
        _ => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(subject: &str) -> Observation {
        Observation {
            subject_id: subject.to_string(),
            age: Some(9),
            grade: Some(Grade::Third),
            attendance: Attendance::Present,
            health_status: HealthStatus::NeedsAttention,
            notes: String::new(),
            recorded_at: "2026-08-08T10:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn validate_rejects_empty_subject_identifier() {
        assert!(observation("Amina").validate().is_ok());
        assert!(observation("").validate().is_err());
        assert!(observation("   ").validate().is_err());
    }

    #[test]
    fn wire_format_matches_authority_contract() {
        let value = serde_json::to_value(observation("Amina")).expect("serialize observation");
        assert_eq!(value["subjectId"], "Amina");
        assert_eq!(value["age"], 9);
        assert_eq!(value["grade"], "3");
        assert_eq!(value["attendance"], "present");
        assert_eq!(value["healthStatus"], "needs_attention");
        assert_eq!(value["recordedAt"], "2026-08-08T10:00:00.000Z");
    }

    #[test]
    fn unset_grade_is_omitted_from_the_wire() {
        let mut without_grade = observation("Amina");
        without_grade.grade = None;
        let value = serde_json::to_value(without_grade).expect("serialize observation");
        assert!(value.get("grade").is_none());
    }

    #[test]
    fn clock_issues_strictly_increasing_instants() {
        let clock = SubmissionClock::new();
        let mut previous = clock.next_instant();
        for _ in 0..200 {
            let next = clock.next_instant();
            assert!(next > previous, "{next} should sort after {previous}");
            previous = next;
        }
    }

    #[test]
    fn instant_format_orders_lexicographically() {
        let earlier = format_instant_millis(1_700_000_000_000);
        let later = format_instant_millis(1_700_000_000_001);
        assert!(later > earlier);
        assert!(earlier.ends_with('Z'));
    }
}

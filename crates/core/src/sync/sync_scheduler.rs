//! Drain scheduling: reachability-triggered drains plus a periodic retry
//! cadence while online.

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::sync_engine::SyncEngine;

/// Foreground drain cadence in seconds while online.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic drain intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Fixed retry delay after an authentication failure, long enough for a
/// token refresh.
pub const REAUTH_RETRY_DELAY_SECS: i64 = 30;

/// Milliseconds until an RFC 3339 instant, or `None` when it has passed or
/// does not parse.
pub(crate) fn millis_until_rfc3339(value: &str) -> Option<u64> {
    let target = chrono::DateTime::parse_from_rfc3339(value).ok()?;
    let delta = target.timestamp_millis() - chrono::Utc::now().timestamp_millis();
    (delta > 0).then_some(delta as u64)
}

/// Deterministic jitter derived from the wall clock.
fn interval_jitter_ms() -> u64 {
    let bound = SYNC_INTERVAL_JITTER_SECS.saturating_mul(1000);
    if bound == 0 {
        return 0;
    }
    chrono::Utc::now().timestamp_millis().unsigned_abs() % bound
}

/// Drive drains until aborted.
///
/// Each offline-to-online transition drains immediately. While online with
/// pending work, drains repeat on the foreground cadence, clamped to the
/// persisted `next_retry_at` when a failure scheduled one.
pub async fn run_background_loop(engine: Arc<SyncEngine>) {
    let mut reachability = engine.monitor().subscribe();

    loop {
        let mut delay_ms = SYNC_FOREGROUND_INTERVAL_SECS.saturating_mul(1000) + interval_jitter_ms();

        if engine.monitor().is_online() {
            let pending = engine.pending_count().await.unwrap_or(0);
            if pending > 0 {
                let status = engine.status().await.unwrap_or_default();
                match status
                    .next_retry_at
                    .as_deref()
                    .and_then(millis_until_rfc3339)
                {
                    None => {
                        if let Err(err) = engine.drain().await {
                            warn!("Scheduled drain failed: {}", err);
                        }
                    }
                    Some(wait_ms) => {
                        delay_ms = delay_ms.min(wait_ms.max(1_000));
                    }
                }
            }
        }

        tokio::select! {
            changed = reachability.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = reachability.borrow_and_update().online;
                if online {
                    info!("Connectivity restored; draining queue");
                    if let Err(err) = engine.drain().await {
                        warn!("Drain after reconnect failed: {}", err);
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn millis_until_future_instant() {
        let future = (Utc::now() + ChronoDuration::seconds(30)).to_rfc3339();
        let wait = millis_until_rfc3339(&future).expect("future instant");
        assert!(wait > 25_000 && wait <= 30_000);
    }

    #[test]
    fn past_or_invalid_instants_are_due() {
        let past = (Utc::now() - ChronoDuration::seconds(30)).to_rfc3339();
        assert!(millis_until_rfc3339(&past).is_none());
        assert!(millis_until_rfc3339("not-a-timestamp").is_none());
    }

    #[test]
    fn jitter_stays_within_bound() {
        for _ in 0..10 {
            assert!(interval_jitter_ms() < SYNC_INTERVAL_JITTER_SECS * 1000);
        }
    }
}

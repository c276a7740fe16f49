//! Reachability tracking with probe fallback.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Probe cadence in seconds while the monitor reports offline.
pub const PROBE_OFFLINE_INTERVAL_SECS: u64 = 30;

/// Probe cadence in seconds while the monitor reports online.
pub const PROBE_ONLINE_INTERVAL_SECS: u64 = 45;

/// Current reachability determination with its last transition time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReachabilityState {
    pub online: bool,
    pub changed_at: String,
}

/// Lightweight reachability check against the remote authority's health
/// path. Implemented by the authority client; the monitor itself performs no
/// network calls.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Tracks online/offline transitions and notifies subscribers once per
/// actual state change. Repeated signals of the same state emit nothing,
/// though subscribers should stay idempotent to repeats.
pub struct ConnectivityMonitor {
    state: watch::Sender<ReachabilityState>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(ReachabilityState {
            online: initially_online,
            changed_at: Utc::now().to_rfc3339(),
        });
        Self { state }
    }

    /// Current reachability state.
    pub fn current(&self) -> ReachabilityState {
        self.state.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.state.borrow().online
    }

    /// Mirror the platform connectivity signal.
    pub fn set_reachable(&self, online: bool) {
        let modified = self.state.send_if_modified(|current| {
            if current.online == online {
                return false;
            }
            current.online = online;
            current.changed_at = Utc::now().to_rfc3339();
            true
        });
        if modified {
            info!(
                "Reachability changed: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Subscribe to transition events.
    pub fn subscribe(&self) -> watch::Receiver<ReachabilityState> {
        self.state.subscribe()
    }
}

/// Poll `probe` and mirror the result into `monitor`. Used when the host
/// platform exposes no connectivity signal of its own. Runs until aborted.
pub async fn run_probe_loop(monitor: Arc<ConnectivityMonitor>, probe: Arc<dyn ReachabilityProbe>) {
    loop {
        let interval = if monitor.is_online() {
            PROBE_ONLINE_INTERVAL_SECS
        } else {
            PROBE_OFFLINE_INTERVAL_SECS
        };
        tokio::time::sleep(Duration::from_secs(interval)).await;

        let reachable = probe.probe().await;
        debug!("Reachability probe result: {}", reachable);
        monitor.set_reachable(reachable);
    }
}

//! Run outcomes and lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message reported when a run is rejected because another is active.
pub const MSG_ALREADY_RUNNING: &str = "already running";
/// Message reported when a run is skipped for lack of connectivity.
pub const MSG_OFFLINE: &str = "offline";

/// Outcome of one push or pull run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// True iff the run completed with no failed records.
    pub success: bool,
    /// Records (push) or entities (pull) successfully applied.
    pub synced_count: u64,
    /// Records (push) or entity kinds (pull) that failed.
    pub failed_count: u64,
    /// Human-readable summary.
    pub message: String,
}

impl SyncResult {
    /// Builds the result of a completed run.
    pub fn completed(synced_count: u64, failed_count: u64) -> Self {
        let message = if failed_count == 0 {
            format!("synced {synced_count}")
        } else {
            format!("synced {synced_count}, failed {failed_count}")
        };
        Self {
            success: failed_count == 0,
            synced_count,
            failed_count,
            message,
        }
    }

    /// Builds the result of a run that was rejected or aborted.
    pub fn aborted(synced_count: u64, failed_count: u64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            synced_count,
            failed_count,
            message: message.into(),
        }
    }

    /// The run was rejected by the single-flight guard.
    pub fn already_running() -> Self {
        Self::aborted(0, 0, MSG_ALREADY_RUNNING)
    }

    /// The run was skipped because the device is offline.
    pub fn offline() -> Self {
        Self::aborted(0, 0, MSG_OFFLINE)
    }

    /// Returns true if the run was rejected by the single-flight guard.
    #[must_use]
    pub fn is_already_running(&self) -> bool {
        !self.success && self.message == MSG_ALREADY_RUNNING
    }

    /// Returns true if the run was skipped for lack of connectivity.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        !self.success && self.message == MSG_OFFLINE
    }
}

/// Lifecycle state broadcast to status listeners.
///
/// A run moves `Idle → Syncing → (Completed | Failed) → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No run is active.
    Idle,
    /// A run is in progress.
    Syncing,
    /// The last run finished with no failures.
    Completed,
    /// The last run finished with failures or was aborted.
    Failed,
}

impl SyncStatus {
    /// Returns true for the terminal states of a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

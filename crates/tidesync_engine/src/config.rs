//! Configuration for the sync engine.

use std::time::Duration;

/// How [`SyncEngine::force_full_sync`](crate::SyncEngine::force_full_sync)
/// proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullSyncStrategy {
    /// Clear the change log, pull every kind, then push.
    ///
    /// Local edits that have not reached the remote are discarded.
    #[default]
    ClearThenPull,
    /// Pull every kind, push everything still pending, then compact
    /// confirmed records. No local edit is dropped.
    PullThenPush,
}

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound for one adapter call.
    pub adapter_timeout: Duration,
    /// Interval for periodic push runs.
    pub sync_interval: Option<Duration>,
    /// Behavior of a forced full sync.
    pub full_sync_strategy: FullSyncStrategy,
    /// Synced records kept before the log is compacted after a push.
    /// Zero disables automatic compaction.
    pub compact_threshold: usize,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(30),
            sync_interval: None,
            full_sync_strategy: FullSyncStrategy::ClearThenPull,
            compact_threshold: 1000,
        }
    }

    /// Sets the per-call adapter timeout.
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Sets the sync interval for automatic sync.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the forced full sync strategy.
    pub fn with_full_sync_strategy(mut self, strategy: FullSyncStrategy) -> Self {
        self.full_sync_strategy = strategy;
        self
    }

    /// Sets the compaction threshold.
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

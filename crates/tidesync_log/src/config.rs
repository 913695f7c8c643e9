//! Configuration for the pending change log.

/// How successive mutations of the same entity are queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueuePolicy {
    /// Every enqueue produces a new record and every mutation is replayed.
    #[default]
    AppendAll,
    /// A new mutation supersedes the newest outstanding record of the same
    /// entity when the pair can be merged:
    ///
    /// | queued | new    | result              |
    /// |--------|--------|---------------------|
    /// | create | update | create (new payload) |
    /// | create | delete | nothing             |
    /// | update | update | update (new payload) |
    /// | update | delete | delete              |
    ///
    /// Any other pair is appended.
    CollapseByEntity,
}

/// Configuration for a [`PendingChangeLog`](crate::PendingChangeLog).
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Queueing policy for repeated edits of one entity.
    pub enqueue_policy: EnqueuePolicy,
    /// Whether every journal write is synced to disk before returning.
    pub sync_on_write: bool,
}

impl LogConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            enqueue_policy: EnqueuePolicy::AppendAll,
            sync_on_write: true,
        }
    }

    /// Sets the enqueue policy.
    pub fn with_enqueue_policy(mut self, policy: EnqueuePolicy) -> Self {
        self.enqueue_policy = policy;
        self
    }

    /// Sets whether writes are synced to disk.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

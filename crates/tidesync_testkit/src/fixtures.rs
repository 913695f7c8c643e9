//! Test fixtures for logs and engines.
//!
//! Provides convenience types for setting up a change log or a fully wired
//! engine in tests.

use crate::adapter::{CallLog, RecordingAdapter};
use crate::journal::{FaultSwitch, FaultyJournal};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tidesync_engine::{
    AdapterRegistry, MemoryLocalStore, RemoteAdapter, StaticProbe, SyncConfig, SyncEngine,
    SyncScheduler,
};
use tidesync_log::{LogConfig, MemoryJournal, PendingChangeLog};
use tidesync_protocol::{EntityKind, Operation, Payload, RecordId};

/// Entity kinds registered by [`TestEngine::new`].
pub const DEFAULT_KINDS: [&str; 3] = ["student", "class", "grade"];

/// A file-backed change log in a temporary directory.
pub struct TestLog {
    /// The log instance.
    pub log: PendingChangeLog,
    config: LogConfig,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestLog {
    /// Creates an empty file-backed log with the default configuration.
    pub fn file() -> Self {
        Self::file_with(LogConfig::default())
    }

    /// Creates an empty file-backed log.
    pub fn file_with(config: LogConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("pending.journal");
        let log = PendingChangeLog::open_file(&path, config.clone()).expect("Failed to open log");
        Self {
            log,
            config,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes and reopens the log, simulating a process restart.
    pub fn reopen(&mut self) {
        // Release the file handle before reopening.
        self.log = PendingChangeLog::in_memory();
        self.log =
            PendingChangeLog::open_file(&self.path, self.config.clone()).expect("Failed to reopen log");
    }
}

impl std::ops::Deref for TestLog {
    type Target = PendingChangeLog;

    fn deref(&self) -> &Self::Target {
        &self.log
    }
}

/// A sync engine wired to recording adapters, a switchable probe, an
/// in-memory local store and a fault-injecting journal.
pub struct TestEngine {
    /// The engine.
    pub engine: Arc<SyncEngine>,
    /// Connectivity probe; toggle to simulate going offline.
    pub probe: Arc<StaticProbe>,
    /// Destination of pulls.
    pub local: Arc<MemoryLocalStore>,
    /// Calls received by every adapter, in order.
    pub calls: CallLog,
    /// Switch for journal write failures.
    pub faults: FaultSwitch,
    /// Raw journal bytes, shared with the log.
    pub journal: MemoryJournal,
    adapters: BTreeMap<String, Arc<RecordingAdapter>>,
}

impl TestEngine {
    /// Creates an engine with adapters for [`DEFAULT_KINDS`] and default
    /// configuration.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default(), LogConfig::default())
    }

    /// Creates an engine with adapters for [`DEFAULT_KINDS`].
    pub fn with_config(config: SyncConfig, log_config: LogConfig) -> Self {
        Self::build(config, log_config, &DEFAULT_KINDS, |adapter| adapter)
    }

    /// Creates an engine whose adapters are customized by `customize`.
    pub fn with_adapters<F>(config: SyncConfig, kinds: &[&str], customize: F) -> Self
    where
        F: Fn(RecordingAdapter) -> RecordingAdapter,
    {
        Self::build(config, LogConfig::default(), kinds, customize)
    }

    /// Creates an engine with both a custom log and custom adapters.
    pub fn build<F>(config: SyncConfig, log_config: LogConfig, kinds: &[&str], customize: F) -> Self
    where
        F: Fn(RecordingAdapter) -> RecordingAdapter,
    {
        let calls = CallLog::new();
        let mut registry = AdapterRegistry::new();
        let mut adapters = BTreeMap::new();
        for kind in kinds {
            let adapter = Arc::new(customize(RecordingAdapter::with_log(*kind, calls.clone())));
            registry.register(*kind, Arc::clone(&adapter) as Arc<dyn RemoteAdapter>);
            adapters.insert(kind.to_string(), adapter);
        }

        let journal = MemoryJournal::new();
        let faulty = FaultyJournal::new(journal.clone());
        let faults = faulty.switch();
        let log = PendingChangeLog::open(Box::new(faulty), log_config).expect("Failed to open log");

        let probe = Arc::new(StaticProbe::online());
        let local = Arc::new(MemoryLocalStore::new());
        let engine = SyncEngine::new(
            config,
            Arc::new(log),
            registry,
            probe.clone(),
            local.clone(),
        );

        Self {
            engine: Arc::new(engine),
            probe,
            local,
            calls,
            faults,
            journal,
            adapters,
        }
    }

    /// Returns the adapter for a kind.
    ///
    /// # Panics
    ///
    /// Panics if the kind was not registered.
    pub fn adapter(&self, kind: &str) -> &Arc<RecordingAdapter> {
        self.adapters
            .get(kind)
            .unwrap_or_else(|| panic!("no adapter registered for {kind}"))
    }

    /// Enqueues a mutation, panicking on error.
    pub fn enqueue(
        &self,
        kind: &str,
        entity_id: &str,
        operation: Operation,
        payload: Option<Value>,
    ) -> RecordId {
        self.engine
            .log()
            .enqueue(
                EntityKind::new(kind),
                entity_id,
                operation,
                payload.map(Payload::from),
            )
            .expect("Failed to enqueue")
    }

    /// Wraps the engine in a scheduler.
    pub fn scheduler(&self) -> SyncScheduler {
        SyncScheduler::new(Arc::clone(&self.engine))
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

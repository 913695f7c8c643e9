//! Sync orchestrator and remote reconciler.

use crate::adapter::{RemoteAdapter, RemoteEntity};
use crate::config::{FullSyncStrategy, SyncConfig};
use crate::connectivity::ConnectivityProbe;
use crate::error::{AdapterError, AdapterResult, EngineResult, SyncError};
use crate::local::LocalStore;
use crate::notifier::StatusNotifier;
use crate::registry::AdapterRegistry;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidesync_log::PendingChangeLog;
use tidesync_protocol::{Operation, SyncRecord, SyncResult, SyncStatus};

/// Message reported by a run stopped through [`SyncEngine::cancel`].
pub const MSG_CANCELLED: &str = "cancelled";

/// Single-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

/// Holds the single-flight slot; releases it on drop, including when the
/// run future is dropped mid-flight.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = RunState::Idle;
    }
}

/// Releases the change log records held for a push, including when the run
/// future is dropped mid-flight.
struct Checkout<'a> {
    log: &'a PendingChangeLog,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        self.log.release_checkout();
    }
}

/// Prefix of `last_error` for failures no retry can fix.
pub const PERMANENT_PREFIX: &str = "permanent: ";

/// Counts accumulated during one run.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    synced: u64,
    failed: u64,
}

/// Pushes queued mutations to the remote and pulls remote snapshots into
/// local storage.
///
/// # Runs
///
/// [`push_pending`](Self::push_pending), [`pull_all`](Self::pull_all) and
/// [`force_full_sync`](Self::force_full_sync) share one single-flight slot:
/// a call made while any of them is active returns
/// [`SyncResult::already_running`] without touching the queue. A run that
/// gets the slot checks connectivity next and returns
/// [`SyncResult::offline`] if the probe reports no network.
///
/// Within a run, records are dispatched strictly one at a time in FIFO
/// order. A failing record is marked failed and the run moves on; only a
/// storage failure or cancellation aborts it.
pub struct SyncEngine {
    config: SyncConfig,
    log: Arc<PendingChangeLog>,
    registry: AdapterRegistry,
    probe: Arc<dyn ConnectivityProbe>,
    local: Arc<dyn LocalStore>,
    notifier: Arc<StatusNotifier>,
    run_state: Mutex<RunState>,
    cancelled: AtomicBool,
    last_result: RwLock<Option<SyncResult>>,
}

impl SyncEngine {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        log: Arc<PendingChangeLog>,
        registry: AdapterRegistry,
        probe: Arc<dyn ConnectivityProbe>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            config,
            log,
            registry,
            probe,
            local,
            notifier: Arc::new(StatusNotifier::new()),
            run_state: Mutex::new(RunState::Idle),
            cancelled: AtomicBool::new(false),
            last_result: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the pending change log.
    pub fn log(&self) -> &Arc<PendingChangeLog> {
        &self.log
    }

    /// Returns the adapter registry.
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Returns the status notifier.
    pub fn notifier(&self) -> &Arc<StatusNotifier> {
        &self.notifier
    }

    /// Returns true while a run holds the single-flight slot.
    pub fn is_syncing(&self) -> bool {
        *self.run_state.lock() == RunState::Running
    }

    /// Returns the result of the last run that got past the guards.
    pub fn last_result(&self) -> Option<SyncResult> {
        self.last_result.read().clone()
    }

    /// Asks the active run to stop before its next record.
    ///
    /// Records not yet dispatched stay queued. The flag is cleared when the
    /// next run starts.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        let mut state = self.run_state.lock();
        if *state == RunState::Running {
            return None;
        }
        *state = RunState::Running;
        Some(RunGuard {
            state: &self.run_state,
        })
    }

    /// Acquires the slot and checks connectivity.
    async fn begin(&self, run: &'static str) -> Result<RunGuard<'_>, SyncResult> {
        let Some(guard) = self.try_begin() else {
            tracing::debug!(run, "rejected: another run is active");
            return Err(SyncResult::already_running());
        };
        if !self.probe.is_online().await {
            tracing::warn!(run, "skipped: offline");
            return Err(SyncResult::offline());
        }

        self.reset_cancel();
        self.notifier.set_status(SyncStatus::Syncing);
        self.notifier.set_progress(0.0);
        Ok(guard)
    }

    /// Turns a run outcome into its result and broadcasts the terminal state.
    fn finish(&self, run: &'static str, tally: Tally, outcome: EngineResult<()>) -> SyncResult {
        let result = match outcome {
            Ok(()) => SyncResult::completed(tally.synced, tally.failed),
            Err(SyncError::Cancelled) => {
                tracing::info!(run, synced = tally.synced, "cancelled");
                SyncResult::aborted(tally.synced, tally.failed, MSG_CANCELLED)
            }
            Err(e) => {
                tracing::error!(run, error = %e, "aborted");
                SyncResult::aborted(tally.synced, tally.failed, e.to_string())
            }
        };

        tracing::info!(
            run,
            success = result.success,
            synced = result.synced_count,
            failed = result.failed_count,
            "finished"
        );
        *self.last_result.write() = Some(result.clone());
        self.notifier.set_status(if result.success {
            SyncStatus::Completed
        } else {
            SyncStatus::Failed
        });
        self.notifier.set_status(SyncStatus::Idle);
        result
    }

    /// Pushes every pending and failed record to the remote.
    pub async fn push_pending(&self) -> SyncResult {
        let _guard = match self.begin("push").await {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        let mut tally = Tally::default();
        let outcome = self.push_records(&mut tally).await;
        if outcome.is_ok() {
            self.compact_if_due();
        }
        self.finish("push", tally, outcome)
    }

    /// Pulls every registered kind into local storage.
    pub async fn pull_all(&self) -> SyncResult {
        let _guard = match self.begin("pull").await {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        let mut tally = Tally::default();
        let outcome = self.pull_kinds(&mut tally).await;
        self.finish("pull", tally, outcome)
    }

    /// Rebuilds local state from the remote and pushes what remains queued.
    ///
    /// Runs under a single acquisition of the single-flight slot. Behavior
    /// depends on [`SyncConfig::full_sync_strategy`]:
    ///
    /// - [`FullSyncStrategy::ClearThenPull`] clears the change log, pulls,
    ///   then pushes. Local edits not yet accepted by the remote are lost.
    /// - [`FullSyncStrategy::PullThenPush`] pulls, pushes everything still
    ///   queued, then compacts synced records.
    ///
    /// Counts in the result cover both phases: pulled entities plus pushed
    /// records.
    pub async fn force_full_sync(&self) -> SyncResult {
        let _guard = match self.begin("full sync").await {
            Ok(guard) => guard,
            Err(result) => return result,
        };

        let mut tally = Tally::default();
        let outcome = match self.config.full_sync_strategy {
            FullSyncStrategy::ClearThenPull => self.clear_then_pull(&mut tally).await,
            FullSyncStrategy::PullThenPush => self.pull_then_push(&mut tally).await,
        };
        self.finish("full sync", tally, outcome)
    }

    async fn clear_then_pull(&self, tally: &mut Tally) -> EngineResult<()> {
        let discarded = self.log.pending_count();
        self.log.clear_all()?;
        if discarded > 0 {
            tracing::warn!(discarded, "full sync discarded unsent local edits");
        }
        self.pull_kinds(tally).await?;
        self.push_records(tally).await
    }

    async fn pull_then_push(&self, tally: &mut Tally) -> EngineResult<()> {
        self.pull_kinds(tally).await?;
        self.push_records(tally).await?;
        let removed = self.log.compact()?;
        tracing::debug!(removed, "compacted after full sync");
        Ok(())
    }

    async fn push_records(&self, tally: &mut Tally) -> EngineResult<()> {
        let records = self.log.checkout_pending()?;
        let _checkout = Checkout { log: &self.log };
        let total = records.len();
        if total == 0 {
            tracing::debug!("push: queue empty");
            return Ok(());
        }
        tracing::info!(pending = total, "push started");

        for (i, record) in records.iter().enumerate() {
            self.check_cancelled()?;
            self.notifier.set_progress((i + 1) as f64 / total as f64);

            match self.dispatch(record).await {
                Ok(()) => {
                    self.log.mark_synced(record.id)?;
                    tally.synced += 1;
                    tracing::debug!(
                        record_id = %record.id,
                        entity_kind = %record.entity_kind,
                        entity_id = %record.entity_id,
                        operation = %record.operation,
                        "record synced"
                    );
                }
                Err(e) => {
                    if let SyncError::UnknownEntityKind(kind) = &e {
                        tracing::error!(
                            record_id = %record.id,
                            entity_kind = %kind,
                            "no adapter registered for entity kind"
                        );
                    } else {
                        tracing::warn!(
                            record_id = %record.id,
                            entity_kind = %record.entity_kind,
                            entity_id = %record.entity_id,
                            operation = %record.operation,
                            error = %e,
                            "record failed"
                        );
                    }
                    let reason = if e.is_permanent() {
                        format!("{PERMANENT_PREFIX}{e}")
                    } else {
                        e.to_string()
                    };
                    self.log.mark_failed(record.id, reason)?;
                    tally.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, record: &SyncRecord) -> EngineResult<()> {
        let adapter = self.registry.get(&record.entity_kind)?;
        let entity_id = record.entity_id.as_str();
        let call = async {
            match (record.operation, &record.payload) {
                (Operation::Create, Some(payload)) => adapter.create(entity_id, payload).await,
                (Operation::Update, Some(payload)) => adapter.update(entity_id, payload).await,
                (Operation::Delete, _) => adapter.delete(entity_id).await,
                (operation, None) => Err(AdapterError::Decode(format!(
                    "{operation} record has no payload"
                ))),
            }
        };
        self.timed(call).await.map_err(SyncError::from)
    }

    async fn pull_kinds(&self, tally: &mut Tally) -> EngineResult<()> {
        let total = self.registry.len();
        for (i, (kind, adapter)) in self.registry.iter().enumerate() {
            self.check_cancelled()?;
            self.notifier.set_progress((i + 1) as f64 / total as f64);

            match self.fetch(adapter).await {
                Ok(entities) => {
                    for entity in &entities {
                        self.local.upsert(kind, &entity.id, &entity.payload)?;
                        tally.synced += 1;
                    }
                    tracing::debug!(entity_kind = %kind, entities = entities.len(), "kind pulled");
                }
                Err(e) => {
                    tracing::warn!(entity_kind = %kind, error = %e, "fetch failed");
                    tally.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        adapter: &Arc<dyn RemoteAdapter>,
    ) -> AdapterResult<Vec<RemoteEntity>> {
        self.timed(adapter.fetch_all()).await
    }

    /// Bounds one adapter call by the configured timeout.
    async fn timed<T>(&self, call: impl Future<Output = AdapterResult<T>>) -> AdapterResult<T> {
        let limit = self.config.adapter_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(AdapterError::Timeout(limit)))
    }

    fn compact_if_due(&self) {
        let threshold = self.config.compact_threshold;
        if threshold == 0 || self.log.stats().synced < threshold {
            return;
        }
        match self.log.compact() {
            Ok(removed) => tracing::debug!(removed, "change log compacted after push"),
            Err(e) => tracing::warn!(error = %e, "change log compaction failed"),
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("syncing", &self.is_syncing())
            .finish()
    }
}

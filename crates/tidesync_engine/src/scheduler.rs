//! Periodic and on-demand sync triggers.

use crate::engine::SyncEngine;
use crate::notifier::StatusNotifier;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tidesync_protocol::SyncResult;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Snapshot returned by [`SyncScheduler::get_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    /// A run currently holds the single-flight slot.
    pub is_syncing: bool,
    /// Pending and failed records in the change log.
    pub pending_count: usize,
    /// A periodic timer is armed.
    pub auto_sync_enabled: bool,
}

struct PeriodicTask {
    interval: Duration,
    // Dropping the sender ends the loop after its current run.
    _stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Control surface of the sync engine.
///
/// Owns the periodic timer and forwards manual triggers. Every trigger goes
/// through the engine's single-flight guard, so a tick that lands while a
/// run is active is skipped rather than queued.
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    timer: Mutex<Option<PeriodicTask>>,
}

impl SyncScheduler {
    /// Creates a scheduler for an engine. No timer is armed.
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            timer: Mutex::new(None),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Returns the engine's status notifier.
    pub fn notifier(&self) -> &Arc<StatusNotifier> {
        self.engine.notifier()
    }

    /// Arms the timer from the configured sync interval, if one is set.
    ///
    /// Returns true if a timer was armed.
    pub fn start(&self) -> bool {
        match self.engine.config().sync_interval {
            Some(interval) => {
                self.start_periodic(interval);
                true
            }
            None => false,
        }
    }

    /// Arms a timer that pushes every `interval`, replacing any existing
    /// timer. The first push happens one interval from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_periodic(&self, interval: Duration) {
        // Tokio intervals must be non-zero.
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let engine = Arc::clone(&self.engine);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop_rx => break,
                }
                let result = engine.push_pending().await;
                tracing::debug!(
                    success = result.success,
                    message = %result.message,
                    "periodic push"
                );
            }
            tracing::debug!("periodic sync loop exited");
        });

        let previous = self.timer.lock().replace(PeriodicTask {
            interval,
            _stop: stop_tx,
            handle,
        });
        if previous.is_some() {
            tracing::debug!("replaced existing periodic timer");
        }
        tracing::info!(?interval, "periodic sync started");
    }

    /// Disarms the timer. An in-flight push is allowed to finish.
    ///
    /// Idempotent; returns true if a timer was armed.
    pub fn stop_periodic(&self) -> bool {
        let stopped = self.timer.lock().take().is_some();
        if stopped {
            tracing::info!("periodic sync stopped");
        }
        stopped
    }

    /// Returns the interval of the armed timer.
    pub fn interval(&self) -> Option<Duration> {
        self.timer.lock().as_ref().map(|task| task.interval)
    }

    /// Returns true if a timer is armed.
    pub fn is_auto_sync_enabled(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Runs one push now, subject to the single-flight guard.
    pub async fn trigger_now(&self) -> SyncResult {
        self.engine.push_pending().await
    }

    /// Runs one pull now, subject to the single-flight guard.
    pub async fn pull_now(&self) -> SyncResult {
        self.engine.pull_all().await
    }

    /// Runs a forced full sync now.
    pub async fn force_full_sync(&self) -> SyncResult {
        self.engine.force_full_sync().await
    }

    /// Returns a snapshot of the engine state.
    pub fn get_status(&self) -> EngineStatus {
        EngineStatus {
            is_syncing: self.engine.is_syncing(),
            pending_count: self.engine.log().pending_count(),
            auto_sync_enabled: self.is_auto_sync_enabled(),
        }
    }
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("engine", &self.engine)
            .field("interval", &self.interval())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{RemoteAdapter, RemoteEntity};
    use crate::config::SyncConfig;
    use crate::connectivity::StaticProbe;
    use crate::error::AdapterResult;
    use crate::local::MemoryLocalStore;
    use crate::registry::AdapterRegistry;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tidesync_log::PendingChangeLog;
    use tidesync_protocol::{EntityKind, Operation, Payload};

    #[derive(Default)]
    struct Counting {
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl RemoteAdapter for Counting {
        async fn create(&self, _: &str, _: &Payload) -> AdapterResult<()> {
            Ok(())
        }

        async fn update(&self, _: &str, _: &Payload) -> AdapterResult<()> {
            Ok(())
        }

        async fn delete(&self, _: &str) -> AdapterResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_all(&self) -> AdapterResult<Vec<RemoteEntity>> {
            Ok(vec![RemoteEntity::new("g1", Payload::from(json!({})))])
        }
    }

    fn build(config: SyncConfig) -> (SyncScheduler, Arc<Counting>) {
        let adapter = Arc::new(Counting::default());
        let mut registry = AdapterRegistry::new();
        registry.register("grade", Arc::clone(&adapter) as Arc<dyn RemoteAdapter>);
        let engine = SyncEngine::new(
            config,
            Arc::new(PendingChangeLog::in_memory()),
            registry,
            Arc::new(StaticProbe::online()),
            Arc::new(MemoryLocalStore::new()),
        );
        (SyncScheduler::new(Arc::new(engine)), adapter)
    }

    fn enqueue_delete(scheduler: &SyncScheduler, id: &str) {
        scheduler
            .engine()
            .log()
            .enqueue(EntityKind::new("grade"), id, Operation::Delete, None)
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_pushes_on_each_tick() {
        let (scheduler, adapter) = build(SyncConfig::default());
        scheduler.start_periodic(Duration::from_secs(10));
        assert!(scheduler.get_status().auto_sync_enabled);

        enqueue_delete(&scheduler, "g1");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(adapter.deletes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(adapter.deletes.load(Ordering::SeqCst), 1);

        enqueue_delete(&scheduler, "g2");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(adapter.deletes.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.get_status().pending_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_halts_ticks() {
        let (scheduler, adapter) = build(SyncConfig::default());
        scheduler.start_periodic(Duration::from_secs(10));

        assert!(scheduler.stop_periodic());
        assert!(!scheduler.stop_periodic());
        assert!(!scheduler.get_status().auto_sync_enabled);

        enqueue_delete(&scheduler, "g1");
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(adapter.deletes.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.get_status().pending_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_timer() {
        let (scheduler, _) = build(SyncConfig::default());
        scheduler.start_periodic(Duration::from_secs(10));
        scheduler.start_periodic(Duration::from_secs(30));
        assert_eq!(scheduler.interval(), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn start_uses_configured_interval() {
        let (scheduler, _) = build(SyncConfig::default());
        assert!(!scheduler.start());

        let (scheduler, _) = build(SyncConfig::new().with_sync_interval(Duration::from_secs(15)));
        assert!(scheduler.start());
        assert_eq!(scheduler.interval(), Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn manual_triggers() {
        let (scheduler, adapter) = build(SyncConfig::default());
        enqueue_delete(&scheduler, "g1");

        let result = scheduler.trigger_now().await;
        assert!(result.success);
        assert_eq!(adapter.deletes.load(Ordering::SeqCst), 1);

        let pulled = scheduler.pull_now().await;
        assert_eq!(pulled.synced_count, 1);

        let status = scheduler.get_status();
        assert!(!status.is_syncing);
        assert_eq!(status.pending_count, 0);
        assert!(!status.auto_sync_enabled);
    }
}

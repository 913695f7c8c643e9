//! The pending change log.

use crate::backend::JournalBackend;
use crate::config::{EnqueuePolicy, LogConfig};
use crate::error::{LogError, LogResult};
use crate::file::FileJournal;
use crate::frame::{encode_frame, FrameReader};
use crate::memory::MemoryJournal;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tidesync_protocol::{
    EntityKind, JournalEntry, Operation, Payload, RecordId, RecordStatus, SyncRecord,
};

/// Counts of records by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Records waiting for their first transmission.
    pub pending: usize,
    /// Records whose last transmission failed.
    pub failed: usize,
    /// Synced records not yet garbage-collected.
    pub synced: usize,
    /// Next id to be assigned.
    pub next_id: u64,
}

/// In-memory view rebuilt from the journal.
#[derive(Debug, Default)]
struct LogState {
    records: BTreeMap<RecordId, SyncRecord>,
    next_id: u64,
    last_enqueued_at: Option<DateTime<Utc>>,
    /// Records handed to an active run. Never journaled.
    checked_out: BTreeSet<RecordId>,
}

impl LogState {
    fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Applies one journal entry. Entries referring to retired records are
    /// ignored, which keeps replay idempotent.
    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Enqueued(record) => {
                self.next_id = self.next_id.max(record.id.as_u64() + 1);
                self.last_enqueued_at = Some(match self.last_enqueued_at {
                    Some(last) => last.max(record.enqueued_at),
                    None => record.enqueued_at,
                });
                self.records.insert(record.id, record);
            }
            JournalEntry::Synced { id } => {
                self.checked_out.remove(&id);
                if let Some(record) = self.records.get_mut(&id) {
                    record.mark_synced();
                }
            }
            JournalEntry::Failed { id, reason } => {
                self.checked_out.remove(&id);
                if let Some(record) = self.records.get_mut(&id) {
                    record.mark_failed(reason);
                }
            }
            JournalEntry::Superseded { id } => {
                self.checked_out.remove(&id);
                self.records.remove(&id);
            }
            JournalEntry::Cleared { next_id } => {
                self.records.clear();
                self.checked_out.clear();
                self.next_id = self.next_id.max(next_id);
            }
        }
    }

    fn was_issued(&self, id: RecordId) -> bool {
        id.as_u64() >= 1 && id.as_u64() < self.next_id
    }

    /// Newest outstanding record of the given entity, unless a run holds it.
    fn collapse_target(&self, kind: &EntityKind, entity_id: &str) -> Option<&SyncRecord> {
        self.records
            .values()
            .rev()
            .find(|r| r.status.is_outstanding() && r.targets(kind, entity_id))
            .filter(|r| !self.checked_out.contains(&r.id))
    }

    fn stats(&self) -> LogStats {
        let mut stats = LogStats {
            next_id: self.next_id,
            ..LogStats::default()
        };
        for record in self.records.values() {
            match record.status {
                RecordStatus::Pending => stats.pending += 1,
                RecordStatus::Failed => stats.failed += 1,
                RecordStatus::Synced => stats.synced += 1,
            }
        }
        stats
    }
}

/// How a new mutation combines with the newest queued one for its entity.
enum Merge {
    /// Queue the mutation as-is.
    Append,
    /// Retire the queued record and queue `operation` instead.
    Replace { superseded: RecordId, operation: Operation },
    /// Retire the queued record and queue nothing.
    Cancel { superseded: RecordId },
}

fn merge(queued: &SyncRecord, incoming: Operation) -> Merge {
    let superseded = queued.id;
    match (queued.operation, incoming) {
        (Operation::Create, Operation::Update) => Merge::Replace {
            superseded,
            operation: Operation::Create,
        },
        (Operation::Create, Operation::Delete) => Merge::Cancel { superseded },
        (Operation::Update, Operation::Update) | (Operation::Update, Operation::Delete) => {
            Merge::Replace {
                superseded,
                operation: incoming,
            }
        }
        _ => Merge::Append,
    }
}

struct Inner {
    backend: Box<dyn JournalBackend>,
    state: LogState,
    poisoned: bool,
}

impl Inner {
    fn new(backend: Box<dyn JournalBackend>, state: LogState) -> Self {
        Self {
            backend,
            state,
            poisoned: false,
        }
    }

    /// Writes entries to the journal, then applies them to the state.
    ///
    /// All frames are appended with a single backend write so a batch is
    /// either fully durable or cut as a torn tail on the next open. A failed
    /// write is cut back to the previous journal size; if that cut fails too
    /// the log is poisoned.
    fn commit(&mut self, entries: Vec<JournalEntry>, sync: bool) -> LogResult<()> {
        if self.poisoned {
            return Err(LogError::Poisoned);
        }
        let mut data = Vec::new();
        for entry in &entries {
            data.extend_from_slice(&encode_frame(entry)?);
        }

        let start = self.backend.size()?;
        let mut written = self.backend.append(&data).map(|_| ());
        if written.is_ok() && sync {
            written = self.backend.sync();
        }
        if let Err(e) = written {
            self.roll_back(start);
            return Err(e.into());
        }

        for entry in entries {
            self.state.apply(entry);
        }
        Ok(())
    }

    fn roll_back(&mut self, size: u64) {
        match self.backend.size() {
            Ok(current) if current == size => return,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "journal size unknown after failed write"),
        }
        if let Err(e) = self.backend.truncate(size) {
            tracing::error!(
                offset = size,
                error = %e,
                "journal rollback failed; change log poisoned until reopened"
            );
            self.poisoned = true;
        }
    }
}

fn outstanding(state: &LogState) -> Vec<SyncRecord> {
    let mut records: Vec<SyncRecord> = state
        .records
        .values()
        .filter(|r| r.status.is_outstanding())
        .cloned()
        .collect();
    records.sort_by(|a, b| (a.enqueued_at, a.id).cmp(&(b.enqueued_at, b.id)));
    records
}

/// A durable, ordered queue of mutations awaiting transmission.
///
/// # Ordering
///
/// [`list_pending`](Self::list_pending) returns outstanding records ordered
/// by `enqueued_at`, oldest first. Timestamps are clamped to never go
/// backwards, so this is also id order.
///
/// # Concurrency
///
/// All operations take `&self` and are serialized by an internal lock.
/// `enqueue` may race an in-progress sync run safely; the run simply does
/// not see records enqueued after it took its snapshot, and records in the
/// snapshot are never collapsed (see
/// [`checkout_pending`](Self::checkout_pending)).
pub struct PendingChangeLog {
    config: LogConfig,
    inner: Mutex<Inner>,
}

impl PendingChangeLog {
    /// Opens a log over a journal backend, replaying existing entries.
    ///
    /// A torn or corrupt tail is truncated at the last valid entry.
    pub fn open(backend: Box<dyn JournalBackend>, config: LogConfig) -> LogResult<Self> {
        let mut backend = backend;
        let mut state = LogState::new();

        let (entries, torn) = {
            let mut reader = FrameReader::new(backend.as_ref())?;
            let mut entries = 0usize;
            for item in reader.by_ref() {
                let (_, entry) = item?;
                state.apply(entry);
                entries += 1;
            }
            let torn = reader
                .torn_tail()
                .map(|(offset, reason)| (offset, reason.to_string()));
            (entries, torn)
        };

        if let Some((offset, reason)) = torn {
            let size = backend.size()?;
            tracing::warn!(
                offset,
                dropped_bytes = size - offset,
                reason = %reason,
                "truncating invalid journal tail"
            );
            backend.truncate(offset)?;
        }

        let stats = state.stats();
        tracing::debug!(
            entries,
            pending = stats.pending,
            failed = stats.failed,
            synced = stats.synced,
            next_id = stats.next_id,
            "change log opened"
        );

        Ok(Self {
            config,
            inner: Mutex::new(Inner::new(backend, state)),
        })
    }

    /// Opens or creates a file-backed log.
    pub fn open_file(path: &Path, config: LogConfig) -> LogResult<Self> {
        let journal = FileJournal::open_with_create_dirs(path)?;
        Self::open(Box::new(journal), config)
    }

    /// Creates an empty in-memory log with the default configuration.
    pub fn in_memory() -> Self {
        Self::in_memory_with(LogConfig::default())
    }

    /// Creates an empty in-memory log.
    pub fn in_memory_with(config: LogConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::new(Box::new(MemoryJournal::new()), LogState::new())),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Appends a mutation to the log and returns its record id.
    ///
    /// The record is durable when this returns. Under
    /// [`EnqueuePolicy::CollapseByEntity`] a mergeable predecessor is retired
    /// first; when a create is cancelled by a delete, the returned id is
    /// retired immediately and nothing remains queued for the entity.
    ///
    /// # Errors
    ///
    /// - [`LogError::MissingPayload`] for a create or update without payload
    /// - [`LogError::Storage`] if the journal write fails; nothing is queued
    pub fn enqueue(
        &self,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: Option<Payload>,
    ) -> LogResult<RecordId> {
        if operation.carries_payload() && payload.is_none() {
            return Err(LogError::MissingPayload { operation });
        }
        let entity_id = entity_id.into();

        let mut inner = self.inner.lock();
        let state = &inner.state;

        let merge = match self.config.enqueue_policy {
            EnqueuePolicy::AppendAll => Merge::Append,
            EnqueuePolicy::CollapseByEntity => state
                .collapse_target(&entity_kind, &entity_id)
                .map_or(Merge::Append, |queued| merge(queued, operation)),
        };

        let id = RecordId::new(state.next_id);
        let now = Utc::now();
        let enqueued_at = state.last_enqueued_at.map_or(now, |last| last.max(now));

        let (mut entries, queued_operation) = match merge {
            Merge::Append => (Vec::new(), operation),
            Merge::Replace {
                superseded,
                operation,
            } => (vec![JournalEntry::Superseded { id: superseded }], operation),
            Merge::Cancel { superseded } => {
                (vec![JournalEntry::Superseded { id: superseded }], operation)
            }
        };
        let record = SyncRecord::new(
            id,
            entity_kind,
            entity_id,
            queued_operation,
            payload,
            enqueued_at,
        );
        tracing::debug!(
            record_id = %id,
            entity_kind = %record.entity_kind,
            entity_id = %record.entity_id,
            operation = %record.operation,
            superseded = entries.len(),
            "enqueue"
        );
        entries.push(JournalEntry::Enqueued(record));
        if matches!(merge, Merge::Cancel { .. }) {
            entries.push(JournalEntry::Superseded { id });
        }

        inner.commit(entries, self.config.sync_on_write)?;
        Ok(id)
    }

    /// Returns all pending and failed records, oldest first.
    pub fn list_pending(&self) -> LogResult<Vec<SyncRecord>> {
        Ok(outstanding(&self.inner.lock().state))
    }

    /// Returns the same records as [`list_pending`](Self::list_pending) and
    /// holds them for a sync run.
    ///
    /// A held record is never merged away by a later enqueue under
    /// [`EnqueuePolicy::CollapseByEntity`]; the new mutation is appended
    /// after it instead. The hold ends when the record is marked synced or
    /// failed, or on [`release_checkout`](Self::release_checkout).
    pub fn checkout_pending(&self) -> LogResult<Vec<SyncRecord>> {
        let mut inner = self.inner.lock();
        let records = outstanding(&inner.state);
        inner.state.checked_out = records.iter().map(|r| r.id).collect();
        Ok(records)
    }

    /// Ends the hold taken by [`checkout_pending`](Self::checkout_pending).
    pub fn release_checkout(&self) {
        self.inner.lock().state.checked_out.clear();
    }

    /// Returns every record still held by the log, including synced ones.
    pub fn list_all(&self) -> Vec<SyncRecord> {
        self.inner.lock().state.records.values().cloned().collect()
    }

    /// Returns a record by id, if it has not been retired.
    pub fn get(&self, id: RecordId) -> Option<SyncRecord> {
        self.inner.lock().state.records.get(&id).cloned()
    }

    /// Marks a record as accepted by the remote.
    ///
    /// Idempotent: marking a synced or retired record is a no-op.
    pub fn mark_synced(&self, id: RecordId) -> LogResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.was_issued(id) {
            return Err(LogError::RecordNotFound(id));
        }
        match inner.state.records.get(&id) {
            None => return Ok(()),
            Some(record) if record.status == RecordStatus::Synced => return Ok(()),
            Some(_) => {}
        }
        inner.commit(vec![JournalEntry::Synced { id }], self.config.sync_on_write)
    }

    /// Marks a record as rejected, keeping it queued for the next run.
    ///
    /// Idempotent. Synced is terminal, so marking a synced record is ignored.
    pub fn mark_failed(&self, id: RecordId, reason: impl Into<String>) -> LogResult<()> {
        let reason = reason.into();
        let mut inner = self.inner.lock();
        if !inner.state.was_issued(id) {
            return Err(LogError::RecordNotFound(id));
        }
        match inner.state.records.get(&id) {
            None => return Ok(()),
            Some(record) if record.status == RecordStatus::Synced => {
                tracing::debug!(record_id = %id, "ignoring failure of synced record");
                return Ok(());
            }
            Some(record)
                if record.status == RecordStatus::Failed
                    && record.last_error.as_deref() == Some(reason.as_str()) =>
            {
                return Ok(());
            }
            Some(_) => {}
        }
        inner.commit(
            vec![JournalEntry::Failed { id, reason }],
            self.config.sync_on_write,
        )
    }

    /// Removes every record regardless of status.
    ///
    /// Ids keep increasing across a clear.
    pub fn clear_all(&self) -> LogResult<()> {
        let mut inner = self.inner.lock();
        let next_id = inner.state.next_id;
        let removed = inner.state.records.len();
        inner.commit(
            vec![JournalEntry::Cleared { next_id }],
            self.config.sync_on_write,
        )?;
        tracing::info!(removed, "change log cleared");
        Ok(())
    }

    /// Garbage-collects synced records by rewriting the journal.
    ///
    /// Returns the number of records removed.
    pub fn compact(&self) -> LogResult<usize> {
        let mut inner = self.inner.lock();
        let state = &inner.state;

        let mut entries = vec![JournalEntry::Cleared {
            next_id: state.next_id,
        }];
        let mut removed = 0usize;
        for record in state.records.values() {
            match record.status {
                RecordStatus::Synced => removed += 1,
                RecordStatus::Pending => entries.push(JournalEntry::Enqueued(record.clone())),
                RecordStatus::Failed => {
                    let mut queued = record.clone();
                    queued.status = RecordStatus::Pending;
                    queued.last_error = None;
                    entries.push(JournalEntry::Enqueued(queued));
                    entries.push(JournalEntry::Failed {
                        id: record.id,
                        reason: record.last_error.clone().unwrap_or_default(),
                    });
                }
            }
        }

        let mut data = Vec::new();
        for entry in &entries {
            data.extend_from_slice(&encode_frame(entry)?);
        }
        inner.backend.replace(&data)?;
        inner
            .state
            .records
            .retain(|_, r| r.status != RecordStatus::Synced);

        tracing::info!(removed, journal_bytes = data.len(), "change log compacted");
        Ok(removed)
    }

    /// Returns the number of pending and failed records.
    pub fn pending_count(&self) -> usize {
        let stats = self.stats();
        stats.pending + stats.failed
    }

    /// Returns counts of records by status.
    pub fn stats(&self) -> LogStats {
        self.inner.lock().state.stats()
    }
}

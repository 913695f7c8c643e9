//! Fault-injecting journal backend.

use parking_lot::Mutex;
use std::sync::Arc;
use tidesync_log::{JournalBackend, MemoryJournal, StorageError, StorageResult};

/// How a [`FaultyJournal`] currently misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FaultMode {
    #[default]
    Healthy,
    /// Every write fails before touching the bytes.
    FailWrites,
    /// Appends land, then sync, truncate and replace fail.
    FailAfterAppend,
    /// Appends store at most this many bytes, then fail.
    TearAppends(usize),
}

/// Remote control for a [`FaultyJournal`].
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    mode: Arc<Mutex<FaultMode>>,
}

impl FaultSwitch {
    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        *self.mode.lock() = FaultMode::FailWrites;
    }

    /// Lets appends through but fails `sync`, `truncate` and `replace`.
    pub fn fail_after_append(&self) {
        *self.mode.lock() = FaultMode::FailAfterAppend;
    }

    /// Makes appends write only their first `keep` bytes, then fail.
    pub fn tear_appends(&self, keep: usize) {
        *self.mode.lock() = FaultMode::TearAppends(keep);
    }

    /// Lets writes succeed again.
    pub fn heal(&self) {
        *self.mode.lock() = FaultMode::Healthy;
    }

    /// Returns true while any fault is active.
    pub fn is_failing(&self) -> bool {
        self.mode() != FaultMode::Healthy
    }

    fn mode(&self) -> FaultMode {
        *self.mode.lock()
    }
}

/// A [`MemoryJournal`] that misbehaves while its [`FaultSwitch`] is on.
///
/// Reads always succeed, so a log can still be opened and listed.
#[derive(Debug, Clone)]
pub struct FaultyJournal {
    inner: MemoryJournal,
    switch: FaultSwitch,
}

impl FaultyJournal {
    /// Wraps a memory journal.
    pub fn new(inner: MemoryJournal) -> Self {
        Self {
            inner,
            switch: FaultSwitch::default(),
        }
    }

    /// Returns the switch controlling this journal.
    pub fn switch(&self) -> FaultSwitch {
        self.switch.clone()
    }

    /// Returns the wrapped journal.
    pub fn inner(&self) -> &MemoryJournal {
        &self.inner
    }

    fn injected(op: &str) -> StorageError {
        StorageError::Unavailable(format!("injected {op} failure"))
    }

    /// Fails `op` unless the journal is healthy or only tearing appends.
    fn check(&self, op: &str) -> StorageResult<()> {
        match self.switch.mode() {
            FaultMode::FailWrites | FaultMode::FailAfterAppend => Err(Self::injected(op)),
            FaultMode::Healthy | FaultMode::TearAppends(_) => Ok(()),
        }
    }
}

impl JournalBackend for FaultyJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        match self.switch.mode() {
            FaultMode::FailWrites => Err(Self::injected("append")),
            FaultMode::TearAppends(keep) => {
                self.inner.append(&data[..keep.min(data.len())])?;
                Err(Self::injected("append"))
            }
            FaultMode::Healthy | FaultMode::FailAfterAppend => self.inner.append(data),
        }
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check("sync")?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.check("truncate")?;
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.check("replace")?;
        self.inner.replace(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidesync_log::{LogConfig, LogError, PendingChangeLog};
    use tidesync_protocol::{EntityKind, Operation, Payload};

    fn open(journal: &MemoryJournal) -> (PendingChangeLog, FaultSwitch) {
        let faulty = FaultyJournal::new(journal.clone());
        let switch = faulty.switch();
        let log = PendingChangeLog::open(Box::new(faulty), LogConfig::default()).unwrap();
        (log, switch)
    }

    fn create(log: &PendingChangeLog, id: &str) -> Result<(), LogError> {
        log.enqueue(
            EntityKind::new("student"),
            id,
            Operation::Create,
            Some(Payload::from(json!({"name": id}))),
        )
        .map(|_| ())
    }

    #[test]
    fn writes_fail_while_switched_on() {
        let mut journal = FaultyJournal::new(MemoryJournal::new());
        let switch = journal.switch();

        journal.append(b"ok").unwrap();
        switch.fail_writes();
        assert!(journal.append(b"lost").is_err());
        assert_eq!(journal.read_at(0, 2).unwrap(), b"ok");

        switch.heal();
        assert_eq!(journal.append(b"!").unwrap(), 2);
    }

    #[test]
    fn torn_append_keeps_a_prefix() {
        let mut journal = FaultyJournal::new(MemoryJournal::new());
        journal.switch().tear_appends(3);

        assert!(journal.append(b"partial").is_err());
        assert_eq!(journal.size().unwrap(), 3);
        journal.truncate(0).unwrap();
    }

    #[test]
    fn torn_enqueue_does_not_hide_later_ones() {
        let journal = MemoryJournal::new();
        let (log, switch) = open(&journal);
        create(&log, "s1").unwrap();

        switch.tear_appends(5);
        assert!(create(&log, "s2").is_err());
        switch.heal();
        create(&log, "s3").unwrap();
        drop(log);

        let (log, _) = open(&journal);
        let ids: Vec<String> = log
            .list_pending()
            .unwrap()
            .into_iter()
            .map(|r| r.entity_id)
            .collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[test]
    fn failed_rollback_poisons_until_reopen() {
        let journal = MemoryJournal::new();
        let (log, switch) = open(&journal);
        create(&log, "s1").unwrap();

        switch.fail_after_append();
        assert!(matches!(
            create(&log, "s2"),
            Err(LogError::Storage(_))
        ));
        switch.heal();

        assert!(matches!(create(&log, "s3"), Err(LogError::Poisoned)));
        assert_eq!(log.pending_count(), 1);
        drop(log);

        // The unsynced frame may or may not have survived; the log is usable.
        let (log, _) = open(&journal);
        create(&log, "s4").unwrap();
        assert!(log.list_pending().unwrap().iter().any(|r| r.entity_id == "s4"));
    }
}

//! Local storage written by the reconciler.

use crate::error::{EngineResult, SyncError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tidesync_protocol::{EntityKind, Payload};

/// Durable key/row store that receives remote snapshots.
///
/// Writes are insert-or-replace by `(kind, id)`, so applying the same
/// snapshot twice is harmless.
pub trait LocalStore: Send + Sync {
    /// Inserts or replaces one entity.
    fn upsert(&self, kind: &EntityKind, id: &str, entity: &Payload) -> EngineResult<()>;

    /// Removes every entity of every kind.
    fn delete_all(&self) -> EngineResult<()>;
}

/// An in-memory [`LocalStore`].
#[derive(Debug)]
pub struct MemoryLocalStore {
    rows: RwLock<BTreeMap<(EntityKind, String), Payload>>,
    read_only: AtomicBool,
    capacity: AtomicUsize,
}

impl Default for MemoryLocalStore {
    fn default() -> Self {
        Self {
            rows: RwLock::default(),
            read_only: AtomicBool::new(false),
            capacity: AtomicUsize::new(usize::MAX),
        }
    }
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the number of rows; inserting a new row beyond it fails.
    pub fn set_capacity(&self, rows: usize) {
        self.capacity.store(rows, Ordering::SeqCst);
    }

    /// Returns one entity.
    pub fn get(&self, kind: &EntityKind, id: &str) -> Option<Payload> {
        self.rows.read().get(&(kind.clone(), id.to_string())).cloned()
    }

    /// Returns every entity of a kind, ordered by id.
    pub fn entities(&self, kind: &EntityKind) -> Vec<(String, Payload)> {
        self.rows
            .read()
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|((_, id), payload)| (id.clone(), payload.clone()))
            .collect()
    }

    /// Returns the total number of entities.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Makes every write fail, simulating unavailable storage.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> EngineResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(SyncError::LocalStorage("store is read-only".into()))
        } else {
            Ok(())
        }
    }
}

impl LocalStore for MemoryLocalStore {
    fn upsert(&self, kind: &EntityKind, id: &str, entity: &Payload) -> EngineResult<()> {
        self.check_writable()?;
        let mut rows = self.rows.write();
        let key = (kind.clone(), id.to_string());
        if !rows.contains_key(&key) && rows.len() >= self.capacity.load(Ordering::SeqCst) {
            return Err(SyncError::LocalStorage("store is full".into()));
        }
        rows.insert(key, entity.clone());
        Ok(())
    }

    fn delete_all(&self) -> EngineResult<()> {
        self.check_writable()?;
        self.rows.write().clear();
        Ok(())
    }
}

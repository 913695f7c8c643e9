//! In-memory journal backend.

use crate::backend::JournalBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory journal.
///
/// Clones share the same buffer, so a test can keep a handle, drop the log
/// and reopen it over the same bytes to simulate a restart.
///
/// # Example
///
/// ```rust
/// use tidesync_log::{JournalBackend, MemoryJournal};
///
/// let mut journal = MemoryJournal::new();
/// let handle = journal.clone();
/// journal.append(b"entry").unwrap();
/// assert_eq!(handle.size().unwrap(), 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal over existing bytes. Useful for recovery tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of the journal bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl JournalBackend for MemoryJournal {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        if new_size > data.len() as u64 {
            return Err(StorageError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: data.len() as u64,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StorageResult<()> {
        *self.data.write() = bytes.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read() {
        let mut journal = MemoryJournal::new();
        assert_eq!(journal.append(b"hello").unwrap(), 0);
        assert_eq!(journal.append(b" world").unwrap(), 5);
        assert_eq!(journal.read_at(0, 11).unwrap(), b"hello world");
    }

    #[test]
    fn read_past_end() {
        let mut journal = MemoryJournal::new();
        journal.append(b"abc").unwrap();
        assert!(matches!(
            journal.read_at(2, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
    }

    #[test]
    fn clones_share_bytes() {
        let mut journal = MemoryJournal::new();
        let handle = journal.clone();
        journal.append(b"abc").unwrap();
        journal.truncate(1).unwrap();
        assert_eq!(handle.data(), b"a");

        journal.replace(b"xyz").unwrap();
        assert_eq!(handle.data(), b"xyz");
    }
}

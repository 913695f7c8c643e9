//! Journal backend trait definition.

use crate::error::StorageResult;

/// Byte store holding the change log journal.
///
/// Backends are opaque: they never interpret the frames they store.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` makes every appended byte survive process termination
/// - `replace` swaps the whole contents atomically: after a crash either the
///   old or the new contents are visible, never a mix
pub trait JournalBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends beyond the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the journal and returns its offset.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Syncs all appended data to durable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Drops everything after `new_size`. Used to cut a torn tail.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole journal with `data`.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}

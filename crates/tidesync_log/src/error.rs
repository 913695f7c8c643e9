//! Error types for the pending change log.

use std::io;
use thiserror::Error;
use tidesync_protocol::{CodecError, Operation, RecordId};

/// Result type for journal backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for change log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised by a journal backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the journal.
    #[error("read beyond end of journal: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current journal size.
        size: u64,
    },

    /// The journal is unusable.
    #[error("journal unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by [`PendingChangeLog`](crate::PendingChangeLog) operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// The journal backend failed. The operation did not take effect.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A journal entry could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The record id was never issued by this log.
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    /// A create or update was enqueued without a payload.
    #[error("{operation} requires a payload")]
    MissingPayload {
        /// The offending operation.
        operation: Operation,
    },

    /// A failed write could not be rolled back, so the journal may hold
    /// frames the log never applied. Writes are refused until reopened.
    #[error("change log poisoned by a failed rollback; reopen it")]
    Poisoned,
}

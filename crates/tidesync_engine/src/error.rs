//! Error types for the sync engine.

use std::time::Duration;
use thiserror::Error;
use tidesync_log::LogError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Result type for remote adapter calls.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// A failure reported by a remote adapter for one call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The remote answered and refused the request.
    #[error("remote rejected request ({status}): {message}")]
    Rejected {
        /// Status code reported by the remote.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The remote could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The payload could not be decoded into the entity type.
    #[error("payload decode error: {0}")]
    Decode(String),
}

impl AdapterError {
    /// Creates a rejection error.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Returns true if a later attempt may succeed without local changes.
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Network(_) | AdapterError::Timeout(_) => true,
            AdapterError::Rejected { status, .. } => *status >= 500 || *status == 429,
            AdapterError::Decode(_) => false,
        }
    }
}

/// Errors raised by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connectivity probe reported no network.
    #[error("offline")]
    Offline,

    /// Another run holds the single-flight guard.
    #[error("already running")]
    AlreadyRunning,

    /// A remote adapter call failed.
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// No adapter is registered for the entity kind.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// The pending change log failed.
    #[error("change log error: {0}")]
    Storage(#[from] LogError),

    /// The local store failed.
    #[error("local storage error: {0}")]
    LocalStorage(String),

    /// The run was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if the error aborts the current run rather than a single
    /// record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Storage(_) | SyncError::LocalStorage(_) | SyncError::Cancelled
        )
    }

    /// Returns true if retrying the record cannot succeed until the
    /// configuration changes.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SyncError::UnknownEntityKind(_))
    }
}

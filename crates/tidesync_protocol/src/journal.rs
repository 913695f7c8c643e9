//! Journal entries of the pending change log.
//!
//! The change log is persisted as an append-only sequence of entries. Each
//! entry describes one event: a record was enqueued, changed status, was
//! superseded by a newer mutation, or the log was cleared. Replaying the
//! entries in order rebuilds the log state.
//!
//! Entry bodies are CBOR. Framing (magic, length, checksum) belongs to the
//! log crate.

use crate::error::{CodecError, CodecResult};
use crate::record::{RecordId, SyncRecord};

/// Type tag of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JournalEntryKind {
    /// A record was appended.
    Enqueued = 1,
    /// A record was accepted by the remote.
    Synced = 2,
    /// A record was rejected by the remote.
    Failed = 3,
    /// A record was replaced by a collapsed successor.
    Superseded = 4,
    /// All records were removed.
    Cleared = 5,
}

impl JournalEntryKind {
    /// Converts to the on-disk code.
    #[must_use]
    pub const fn to_code(self) -> u8 {
        self as u8
    }

    /// Converts from the on-disk code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Enqueued),
            2 => Some(Self::Synced),
            3 => Some(Self::Failed),
            4 => Some(Self::Superseded),
            5 => Some(Self::Cleared),
            _ => None,
        }
    }
}

/// One event in the pending change log journal.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// A new pending record.
    Enqueued(SyncRecord),
    /// Record transitioned to synced.
    Synced {
        /// Record id.
        id: RecordId,
    },
    /// Record transitioned to failed.
    Failed {
        /// Record id.
        id: RecordId,
        /// Failure reason.
        reason: String,
    },
    /// Record was retired in favour of a collapsed successor.
    Superseded {
        /// Record id.
        id: RecordId,
    },
    /// Every record was removed. Carries the id high-water mark so that ids
    /// are never reused.
    Cleared {
        /// Next id to assign.
        next_id: u64,
    },
}

impl JournalEntry {
    /// Returns the entry kind.
    #[must_use]
    pub fn kind(&self) -> JournalEntryKind {
        match self {
            Self::Enqueued(_) => JournalEntryKind::Enqueued,
            Self::Synced { .. } => JournalEntryKind::Synced,
            Self::Failed { .. } => JournalEntryKind::Failed,
            Self::Superseded { .. } => JournalEntryKind::Superseded,
            Self::Cleared { .. } => JournalEntryKind::Cleared,
        }
    }

    /// Returns the record id the entry refers to, if any.
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Enqueued(record) => Some(record.id),
            Self::Synced { id } | Self::Failed { id, .. } | Self::Superseded { id } => Some(*id),
            Self::Cleared { .. } => None,
        }
    }

    /// Encodes the entry body to CBOR.
    pub fn encode_body(&self) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        let written = match self {
            Self::Enqueued(record) => ciborium::into_writer(record, &mut buf),
            Self::Synced { id } | Self::Superseded { id } => ciborium::into_writer(id, &mut buf),
            Self::Failed { id, reason } => ciborium::into_writer(&(id, reason), &mut buf),
            Self::Cleared { next_id } => ciborium::into_writer(next_id, &mut buf),
        };
        written.map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes an entry body of the given kind.
    pub fn decode_body(kind: JournalEntryKind, body: &[u8]) -> CodecResult<Self> {
        fn read<T: serde::de::DeserializeOwned>(body: &[u8]) -> CodecResult<T> {
            ciborium::from_reader(body).map_err(|e| CodecError::Decode(e.to_string()))
        }

        Ok(match kind {
            JournalEntryKind::Enqueued => Self::Enqueued(read(body)?),
            JournalEntryKind::Synced => Self::Synced { id: read(body)? },
            JournalEntryKind::Failed => {
                let (id, reason) = read(body)?;
                Self::Failed { id, reason }
            }
            JournalEntryKind::Superseded => Self::Superseded { id: read(body)? },
            JournalEntryKind::Cleared => Self::Cleared {
                next_id: read(body)?,
            },
        })
    }

    /// Decodes an entry body from its raw kind code.
    pub fn decode(code: u8, body: &[u8]) -> CodecResult<Self> {
        let kind = JournalEntryKind::from_code(code).ok_or(CodecError::UnknownEntryKind(code))?;
        Self::decode_body(kind, body)
    }
}

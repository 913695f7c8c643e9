//! # TideSync Protocol
//!
//! Shared types for the TideSync offline-first sync engine.
//!
//! This crate provides:
//! - [`SyncRecord`], the durable unit of the pending change log
//! - [`SyncResult`] and [`SyncStatus`] reported by sync runs
//! - [`JournalEntry`] and its CBOR body codec
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod journal;
mod record;
mod result;

pub use error::{CodecError, CodecResult};
pub use journal::{JournalEntry, JournalEntryKind};
pub use record::{EntityKind, Operation, Payload, RecordId, RecordStatus, SyncRecord};
pub use result::{SyncResult, SyncStatus, MSG_ALREADY_RUNNING, MSG_OFFLINE};

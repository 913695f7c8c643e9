//! # TideSync Log
//!
//! The durable pending change log of the TideSync sync engine.
//!
//! Local mutations are enqueued as [`SyncRecord`](tidesync_protocol::SyncRecord)s
//! and survive process restarts. The sync orchestrator reads them back in
//! FIFO order and retires them as the remote accepts them.
//!
//! ## Design
//!
//! - The log is an append-only journal of framed entries
//! - Opening a log replays the journal to rebuild its state
//! - A torn or corrupt tail is truncated at the last good entry
//! - Every write reaches the journal before the in-memory state changes
//! - [`PendingChangeLog::compact`] rewrites the journal without synced records
//!
//! ## Available Backends
//!
//! - [`MemoryJournal`] - For testing and ephemeral queues
//! - [`FileJournal`] - For persistent queues using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use tidesync_log::PendingChangeLog;
//! use tidesync_protocol::{Operation, Payload};
//!
//! let log = PendingChangeLog::in_memory();
//! let payload = Payload::parse(r#"{"name":"Ada"}"#).unwrap();
//! let id = log
//!     .enqueue("student".into(), "s1", Operation::Create, Some(payload))
//!     .unwrap();
//!
//! assert_eq!(log.list_pending().unwrap()[0].id, id);
//! log.mark_synced(id).unwrap();
//! assert_eq!(log.pending_count(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod file;
mod frame;
mod log;
mod memory;

pub use backend::JournalBackend;
pub use config::{EnqueuePolicy, LogConfig};
pub use error::{LogError, LogResult, StorageError, StorageResult};
pub use file::FileJournal;
pub use frame::{compute_crc32, FrameReader, FRAME_HEADER_SIZE, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use log::{LogStats, PendingChangeLog};
pub use memory::MemoryJournal;

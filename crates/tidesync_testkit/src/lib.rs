//! # TideSync Testkit
//!
//! Test utilities for TideSync.
//!
//! This crate provides:
//! - [`RecordingAdapter`], a remote adapter stub that records every call in
//!   order and fails on demand
//! - [`FaultyJournal`], a journal backend with switchable write failures
//! - [`TestEngine`] and [`TestLog`] fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tidesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn pushes_in_order() {
//!     let harness = TestEngine::new();
//!     harness.enqueue("student", "s1", Operation::Create, Some(json!({"name": "A"})));
//!     let result = harness.engine.push_pending().await;
//!     assert!(result.success);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod fixtures;
pub mod generators;
pub mod journal;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::journal::*;
    pub use serde_json::json;
    pub use tidesync_engine::{SyncConfig, SyncEngine, SyncScheduler, SyncEvent};
    pub use tidesync_log::{EnqueuePolicy, LogConfig, PendingChangeLog};
    pub use tidesync_protocol::{
        EntityKind, Operation, Payload, RecordId, RecordStatus, SyncResult, SyncStatus,
    };
}

pub use adapter::*;
pub use fixtures::*;
pub use generators::*;
pub use journal::*;

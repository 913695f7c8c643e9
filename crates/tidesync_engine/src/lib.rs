//! # TideSync Engine
//!
//! Offline-first synchronization for TideSync.
//!
//! This crate provides:
//! - [`SyncEngine`], which pushes the pending change log to the remote
//!   (orchestrator) and pulls remote snapshots into local storage
//!   (reconciler)
//! - [`SyncScheduler`], the periodic timer and manual trigger surface
//! - [`AdapterRegistry`] mapping entity kinds to [`RemoteAdapter`]s
//! - [`ConnectivityProbe`] gating every run
//! - [`StatusNotifier`] broadcasting [`SyncStatus`](tidesync_protocol::SyncStatus)
//!   and progress
//!
//! ## Architecture
//!
//! ```text
//! SyncScheduler ──► probe gate ──► push: PendingChangeLog ──► AdapterRegistry ──► remote
//!               └─► probe gate ──► pull: AdapterRegistry ──► LocalStore
//! ```
//!
//! ## Key Invariants
//!
//! - At most one push, pull or full sync runs at a time
//! - Records are dispatched one at a time, oldest first
//! - One failing record never stops the others
//! - Storage failures abort the run and are never swallowed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod connectivity;
mod engine;
mod error;
mod local;
mod notifier;
mod registry;
mod scheduler;

pub use adapter::{EntityAdapter, RemoteAdapter, RemoteEntity, TypedAdapter};
pub use config::{FullSyncStrategy, SyncConfig};
pub use connectivity::{ConnectivityProbe, StaticProbe, TcpProbe};
pub use engine::{SyncEngine, MSG_CANCELLED, PERMANENT_PREFIX};
pub use error::{AdapterError, AdapterResult, EngineResult, SyncError};
pub use local::{LocalStore, MemoryLocalStore};
pub use notifier::{ListenerId, StatusNotifier, SyncEvent};
pub use registry::AdapterRegistry;
pub use scheduler::{EngineStatus, SyncScheduler};

// Re-exported so adapter implementations need only this crate.
pub use async_trait::async_trait;

//! Pending change records.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a [`SyncRecord`].
///
/// Assigned at enqueue time and strictly increasing; ids are never reused,
/// so id order is FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Creates a record id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The category of domain object a mutation applies to, e.g. `student`.
///
/// Selects the remote adapter used to transmit the mutation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl EntityKind {
    /// Creates an entity kind tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl From<String> for EntityKind {
    fn from(kind: String) -> Self {
        Self(kind)
    }
}

/// Type of local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Entity was created locally.
    Create,
    /// Entity fields were replaced locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl Operation {
    /// Returns the lowercase name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Returns true if the operation carries an entity payload.
    #[must_use]
    pub const fn carries_payload(self) -> bool {
        !matches!(self, Operation::Delete)
    }

    /// Parses an operation name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "create" => Some(Operation::Create),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a [`SyncRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Waiting for its first transmission.
    Pending,
    /// Accepted by the remote. Terminal.
    Synced,
    /// Rejected on the last attempt; retried on the next run.
    Failed,
}

impl RecordStatus {
    /// Returns true if the record still has to be transmitted.
    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(self, RecordStatus::Pending | RecordStatus::Failed)
    }

    /// Returns the lowercase name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Synced => "synced",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized snapshot of an entity's field values.
///
/// The engine treats the payload as opaque JSON text. Only typed adapters
/// interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    /// Serializes a value into a payload.
    pub fn from_value<T: Serialize>(value: &T) -> CodecResult<Self> {
        serde_json::to_string(value)
            .map(Self)
            .map_err(|e| CodecError::InvalidPayload(e.to_string()))
    }

    /// Wraps JSON text, validating that it parses.
    pub fn parse(json: impl Into<String>) -> CodecResult<Self> {
        let json = json.into();
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| CodecError::InvalidPayload(e.to_string()))?;
        Ok(Self(json))
    }

    /// Deserializes the payload into a typed entity.
    pub fn decode<T: DeserializeOwned>(&self) -> CodecResult<T> {
        serde_json::from_str(&self.0).map_err(|e| CodecError::InvalidPayload(e.to_string()))
    }

    /// Returns the raw JSON text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value.to_string())
    }
}

/// One durable entry of the pending change log.
///
/// # Invariants
///
/// - Exactly one record exists per enqueue event
/// - Only `status` and `last_error` change after creation
/// - `last_error` is set only while `status` is [`RecordStatus::Failed`]
/// - `payload` is `None` for [`Operation::Delete`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Unique, monotonically increasing id.
    pub id: RecordId,
    /// Entity kind selecting the remote adapter.
    pub entity_kind: EntityKind,
    /// Id of the affected entity within its kind.
    pub entity_id: String,
    /// Mutation type.
    pub operation: Operation,
    /// Entity snapshot, absent for deletes.
    pub payload: Option<Payload>,
    /// Enqueue timestamp.
    pub enqueued_at: DateTime<Utc>,
    /// Current status.
    pub status: RecordStatus,
    /// Reason for the last failure.
    pub last_error: Option<String>,
}

impl SyncRecord {
    /// Creates a new pending record.
    pub fn new(
        id: RecordId,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: Option<Payload>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entity_kind,
            entity_id: entity_id.into(),
            operation,
            payload: if operation.carries_payload() {
                payload
            } else {
                None
            },
            enqueued_at,
            status: RecordStatus::Pending,
            last_error: None,
        }
    }

    /// Transitions to synced, clearing the failure reason.
    pub fn mark_synced(&mut self) {
        self.status = RecordStatus::Synced;
        self.last_error = None;
    }

    /// Transitions to failed with a reason.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.last_error = Some(reason.into());
    }

    /// Returns true if the record targets the given entity.
    #[must_use]
    pub fn targets(&self, kind: &EntityKind, entity_id: &str) -> bool {
        &self.entity_kind == kind && self.entity_id == entity_id
    }
}

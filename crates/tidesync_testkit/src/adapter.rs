//! Recording remote adapter.
//!
//! [`RecordingAdapter`] stands in for a remote endpoint. Every call it
//! receives is appended to a [`CallLog`], which can be shared between the
//! adapters of several entity kinds to observe the global dispatch order.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidesync_engine::{AdapterError, AdapterResult, RemoteAdapter, RemoteEntity};
use tidesync_protocol::{EntityKind, Payload};

/// Which adapter method was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `fetch_all`
    FetchAll,
}

/// One call received by a [`RecordingAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Kind the adapter serves.
    pub entity_kind: EntityKind,
    /// Method called.
    pub call: CallKind,
    /// Entity id argument; empty for `fetch_all`.
    pub entity_id: String,
    /// Payload argument, parsed.
    pub payload: Option<Value>,
    /// Whether the call was answered with success.
    pub succeeded: bool,
}

impl RecordedCall {
    /// Renders the call as `create s1 {"name":"A"}` for compact assertions.
    pub fn describe(&self) -> String {
        let op = match self.call {
            CallKind::Create => "create",
            CallKind::Update => "update",
            CallKind::Delete => "delete",
            CallKind::FetchAll => "fetch_all",
        };
        match &self.payload {
            Some(payload) => format!("{op} {} {payload}", self.entity_id),
            None => format!("{op} {}", self.entity_id),
        }
    }
}

/// Ordered, shareable log of adapter calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }

    /// Returns every recorded call.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the write calls (everything but `fetch_all`).
    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.call != CallKind::FetchAll)
            .cloned()
            .collect()
    }

    /// Returns [`RecordedCall::describe`] for every write call.
    pub fn described(&self) -> Vec<String> {
        self.writes().iter().map(RecordedCall::describe).collect()
    }

    /// Returns the number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Forgets all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Failure script for a [`RecordingAdapter`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedFailures {
    calls: BTreeSet<usize>,
    entities: BTreeSet<String>,
    fetch: bool,
    all: bool,
}

impl ScriptedFailures {
    /// No failures.
    pub fn none() -> Self {
        Self::default()
    }

    /// Fails the `n`th write call received by the adapter (1-based).
    pub fn fail_call(mut self, n: usize) -> Self {
        self.calls.insert(n);
        self
    }

    /// Fails every write call targeting `entity_id`.
    pub fn fail_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entities.insert(entity_id.into());
        self
    }

    /// Fails `fetch_all`.
    pub fn fail_fetch(mut self) -> Self {
        self.fetch = true;
        self
    }

    /// Fails every call.
    pub fn fail_all(mut self) -> Self {
        self.all = true;
        self
    }

    fn fails_write(&self, call_number: usize, entity_id: &str) -> bool {
        self.all || self.calls.contains(&call_number) || self.entities.contains(entity_id)
    }
}

/// A remote adapter that records calls and fails according to a script.
#[derive(Debug)]
pub struct RecordingAdapter {
    kind: EntityKind,
    log: CallLog,
    failures: Mutex<ScriptedFailures>,
    remote: Mutex<Vec<RemoteEntity>>,
    delay: Duration,
    writes: AtomicUsize,
}

impl RecordingAdapter {
    /// Creates an adapter for `kind` with its own call log.
    pub fn new(kind: impl Into<EntityKind>) -> Self {
        Self::with_log(kind, CallLog::new())
    }

    /// Creates an adapter for `kind` recording into a shared log.
    pub fn with_log(kind: impl Into<EntityKind>, log: CallLog) -> Self {
        Self {
            kind: kind.into(),
            log,
            failures: Mutex::new(ScriptedFailures::none()),
            remote: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            writes: AtomicUsize::new(0),
        }
    }

    /// Sets the failure script.
    pub fn failing(self, failures: ScriptedFailures) -> Self {
        *self.failures.lock() = failures;
        self
    }

    /// Makes every call sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replaces the failure script.
    pub fn set_failures(&self, failures: ScriptedFailures) {
        *self.failures.lock() = failures;
    }

    /// Sets the snapshot returned by `fetch_all`.
    pub fn set_remote(&self, entities: Vec<(&str, Value)>) {
        *self.remote.lock() = entities
            .into_iter()
            .map(|(id, value)| RemoteEntity::new(id, Payload::from(value)))
            .collect();
    }

    /// Returns the shared call log.
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Returns the kind this adapter serves.
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    async fn write(
        &self,
        call: CallKind,
        entity_id: &str,
        payload: Option<&Payload>,
    ) -> AdapterResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let number = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let fails = self.failures.lock().fails_write(number, entity_id);
        self.log.push(RecordedCall {
            entity_kind: self.kind.clone(),
            call,
            entity_id: entity_id.to_string(),
            payload: payload.map(|p| serde_json::from_str(p.as_str()).unwrap_or(Value::Null)),
            succeeded: !fails,
        });

        if fails {
            Err(AdapterError::rejected(
                409,
                format!("scripted failure on call {number}"),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteAdapter for RecordingAdapter {
    async fn create(&self, entity_id: &str, payload: &Payload) -> AdapterResult<()> {
        self.write(CallKind::Create, entity_id, Some(payload)).await
    }

    async fn update(&self, entity_id: &str, payload: &Payload) -> AdapterResult<()> {
        self.write(CallKind::Update, entity_id, Some(payload)).await
    }

    async fn delete(&self, entity_id: &str) -> AdapterResult<()> {
        self.write(CallKind::Delete, entity_id, None).await
    }

    async fn fetch_all(&self) -> AdapterResult<Vec<RemoteEntity>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let fails = {
            let failures = self.failures.lock();
            failures.all || failures.fetch
        };
        self.log.push(RecordedCall {
            entity_kind: self.kind.clone(),
            call: CallKind::FetchAll,
            entity_id: String::new(),
            payload: None,
            succeeded: !fails,
        });

        if fails {
            Err(AdapterError::Network("scripted fetch failure".into()))
        } else {
            Ok(self.remote.lock().clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_calls_in_order() {
        let adapter = RecordingAdapter::new("student");
        adapter
            .create("s1", &Payload::from(json!({"name": "A"})))
            .await
            .unwrap();
        adapter.delete("s1").await.unwrap();

        assert_eq!(
            adapter.log().described(),
            vec![r#"create s1 {"name":"A"}"#, "delete s1"]
        );
    }

    #[tokio::test]
    async fn scripted_failures() {
        let adapter = RecordingAdapter::new("grade")
            .failing(ScriptedFailures::none().fail_call(2).fail_entity("g9"));

        assert!(adapter.delete("g1").await.is_ok());
        assert!(adapter.delete("g2").await.is_err());
        assert!(adapter.delete("g3").await.is_ok());
        assert!(adapter.delete("g9").await.is_err());

        let succeeded: Vec<bool> = adapter.log().calls().iter().map(|c| c.succeeded).collect();
        assert_eq!(succeeded, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn fetch_returns_remote_snapshot() {
        let adapter = RecordingAdapter::new("class");
        adapter.set_remote(vec![("c1", json!({"room": 4}))]);

        let entities = adapter.fetch_all().await.unwrap();
        assert_eq!(entities[0].id, "c1");

        adapter.set_failures(ScriptedFailures::none().fail_fetch());
        assert!(adapter.fetch_all().await.is_err());
        assert!(adapter.log().writes().is_empty());
    }
}

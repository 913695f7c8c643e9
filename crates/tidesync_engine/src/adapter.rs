//! Remote adapter abstraction.
//!
//! An adapter talks to the remote API for one entity kind. Adapters never
//! panic across this boundary: every remote or network failure is returned
//! as an [`AdapterError`].

use crate::error::{AdapterError, AdapterResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tidesync_protocol::Payload;

/// One entity of a remote snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    /// Primary key within the entity kind.
    pub id: String,
    /// Full field snapshot.
    pub payload: Payload,
}

impl RemoteEntity {
    /// Creates a remote entity.
    pub fn new(id: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Capability set for one entity kind on the remote API.
///
/// Payloads are passed through untyped. Implement [`EntityAdapter`] and wrap
/// it in [`TypedAdapter`] to work with a concrete entity type instead.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Creates the entity on the remote.
    async fn create(&self, entity_id: &str, payload: &Payload) -> AdapterResult<()>;

    /// Replaces the entity's fields on the remote.
    async fn update(&self, entity_id: &str, payload: &Payload) -> AdapterResult<()>;

    /// Deletes the entity on the remote.
    async fn delete(&self, entity_id: &str) -> AdapterResult<()>;

    /// Fetches the remote collection.
    async fn fetch_all(&self) -> AdapterResult<Vec<RemoteEntity>>;
}

/// A remote adapter for a concrete entity type.
#[async_trait]
pub trait EntityAdapter: Send + Sync {
    /// The entity type exchanged with the remote.
    type Entity: Serialize + DeserializeOwned + Send + Sync;

    /// Returns the primary key of an entity.
    fn entity_id(entity: &Self::Entity) -> String;

    /// Creates the entity on the remote.
    async fn create(&self, entity_id: &str, entity: Self::Entity) -> AdapterResult<()>;

    /// Replaces the entity on the remote.
    async fn update(&self, entity_id: &str, entity: Self::Entity) -> AdapterResult<()>;

    /// Deletes the entity on the remote.
    async fn delete(&self, entity_id: &str) -> AdapterResult<()>;

    /// Fetches the remote collection.
    async fn fetch_all(&self) -> AdapterResult<Vec<Self::Entity>>;
}

/// Adapts an [`EntityAdapter`] to the untyped [`RemoteAdapter`] interface.
///
/// Payloads that do not decode into `A::Entity` fail with
/// [`AdapterError::Decode`] before the remote is contacted.
#[derive(Debug, Clone)]
pub struct TypedAdapter<A> {
    inner: A,
}

impl<A: EntityAdapter> TypedAdapter<A> {
    /// Wraps a typed adapter.
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    /// Returns the wrapped adapter.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn decode(payload: &Payload) -> AdapterResult<A::Entity> {
        payload
            .decode()
            .map_err(|e| AdapterError::Decode(e.to_string()))
    }
}

#[async_trait]
impl<A: EntityAdapter> RemoteAdapter for TypedAdapter<A> {
    async fn create(&self, entity_id: &str, payload: &Payload) -> AdapterResult<()> {
        let entity = Self::decode(payload)?;
        self.inner.create(entity_id, entity).await
    }

    async fn update(&self, entity_id: &str, payload: &Payload) -> AdapterResult<()> {
        let entity = Self::decode(payload)?;
        self.inner.update(entity_id, entity).await
    }

    async fn delete(&self, entity_id: &str) -> AdapterResult<()> {
        self.inner.delete(entity_id).await
    }

    async fn fetch_all(&self) -> AdapterResult<Vec<RemoteEntity>> {
        self.inner
            .fetch_all()
            .await?
            .iter()
            .map(|entity| -> AdapterResult<RemoteEntity> {
                let payload =
                    Payload::from_value(entity).map_err(|e| AdapterError::Decode(e.to_string()))?;
                Ok(RemoteEntity::new(A::entity_id(entity), payload))
            })
            .collect()
    }
}

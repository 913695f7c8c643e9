//! Entity kind to adapter registry.

use crate::adapter::{EntityAdapter, RemoteAdapter, TypedAdapter};
use crate::error::{EngineResult, SyncError};
use std::fmt;
use std::sync::Arc;
use tidesync_protocol::EntityKind;

/// Maps each entity kind to the adapter that talks to its remote endpoint.
///
/// The registry is resolved once at startup. Kinds are kept in registration
/// order, which is also the order in which a pull visits them.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<(EntityKind, Arc<dyn RemoteAdapter>)>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one for the kind.
    ///
    /// A replaced kind keeps its original position.
    pub fn register(&mut self, kind: impl Into<EntityKind>, adapter: Arc<dyn RemoteAdapter>) {
        let kind = kind.into();
        match self.adapters.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = adapter,
            None => self.adapters.push((kind, adapter)),
        }
    }

    /// Registers an adapter and returns the registry.
    pub fn with_adapter(
        mut self,
        kind: impl Into<EntityKind>,
        adapter: impl RemoteAdapter + 'static,
    ) -> Self {
        self.register(kind, Arc::new(adapter));
        self
    }

    /// Registers a typed adapter and returns the registry.
    pub fn with_typed<A: EntityAdapter + 'static>(
        self,
        kind: impl Into<EntityKind>,
        adapter: A,
    ) -> Self {
        self.with_adapter(kind, TypedAdapter::new(adapter))
    }

    /// Returns the adapter for a kind.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownEntityKind`] if no adapter is registered.
    pub fn get(&self, kind: &EntityKind) -> EngineResult<Arc<dyn RemoteAdapter>> {
        self.adapters
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, adapter)| Arc::clone(adapter))
            .ok_or_else(|| SyncError::UnknownEntityKind(kind.to_string()))
    }

    /// Returns true if the kind has an adapter.
    pub fn contains(&self, kind: &EntityKind) -> bool {
        self.adapters.iter().any(|(k, _)| k == kind)
    }

    /// Iterates over registered kinds in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.adapters.iter().map(|(kind, _)| kind)
    }

    /// Iterates over kinds and adapters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKind, &Arc<dyn RemoteAdapter>)> {
        self.adapters.iter().map(|(kind, adapter)| (kind, adapter))
    }

    /// Returns the number of registered kinds.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

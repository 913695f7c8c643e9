//! Property-based test generators using proptest.
//!
//! Provides strategies for generating sequences of local mutations that
//! respect the change log's payload rules.

use crate::fixtures::DEFAULT_KINDS;
use proptest::prelude::*;
use serde_json::{json, Value};
use tidesync_protocol::Operation;

/// One local mutation, ready to enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Entity kind.
    pub kind: String,
    /// Entity id within the kind.
    pub entity_id: String,
    /// Operation.
    pub operation: Operation,
    /// Payload; `None` exactly when `operation` is delete.
    pub payload: Option<Value>,
}

/// Strategy for one of the default entity kinds.
pub fn entity_kind_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(DEFAULT_KINDS.to_vec()).prop_map(str::to_string)
}

/// Strategy for entity ids drawn from a small pool, so that edits to the
/// same entity are common.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    (0u8..6).prop_map(|n| format!("e{n}"))
}

/// Strategy for operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Create),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Strategy for small JSON entity snapshots.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    (
        prop::string::string_regex("[A-Za-z ]{0,12}").expect("Invalid regex"),
        any::<i32>(),
        any::<bool>(),
    )
        .prop_map(|(name, score, active)| json!({ "name": name, "score": score, "active": active }))
}

/// Strategy for a single mutation.
pub fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    (
        entity_kind_strategy(),
        entity_id_strategy(),
        operation_strategy(),
        payload_strategy(),
    )
        .prop_map(|(kind, entity_id, operation, payload)| Mutation {
            kind,
            entity_id,
            operation,
            payload: operation.carries_payload().then_some(payload),
        })
}

/// Strategy for a sequence of mutations.
pub fn mutations_strategy(max_len: usize) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(), 1..=max_len.max(1))
}

//! Enqueue command implementation.

use std::path::Path;
use tidesync_log::{LogConfig, PendingChangeLog};
use tidesync_protocol::{EntityKind, Operation, Payload, RecordId};

/// Runs the enqueue command, creating the log if needed.
pub fn run(
    path: &Path,
    kind: &str,
    entity_id: &str,
    operation: &str,
    payload: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let log = PendingChangeLog::open_file(path, LogConfig::default())?;
    let id = append(&log, kind, entity_id, operation, payload)?;
    println!("✓ Enqueued record #{id} ({operation} {kind}/{entity_id})");
    Ok(())
}

fn append(
    log: &PendingChangeLog,
    kind: &str,
    entity_id: &str,
    operation: &str,
    payload: Option<&str>,
) -> Result<RecordId, Box<dyn std::error::Error>> {
    let operation = Operation::parse(operation)
        .ok_or_else(|| format!("Unknown operation '{operation}' (expected create, update or delete)"))?;
    let payload = payload.map(Payload::parse).transpose()?;
    if operation == Operation::Delete && payload.is_some() {
        tracing::warn!("payload ignored for delete");
    }

    let id = log.enqueue(EntityKind::new(kind), entity_id, operation, payload)?;
    tracing::debug!(record_id = %id, "record appended");
    Ok(id)
}

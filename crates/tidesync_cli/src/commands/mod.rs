//! CLI command implementations.

pub mod enqueue;
pub mod inspect;
pub mod maintenance;

use std::path::Path;
use tidesync_log::{LogConfig, PendingChangeLog};

/// Opens an existing change log, refusing to create one.
pub(crate) fn open_existing(path: &Path) -> Result<PendingChangeLog, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No change log found at {}", path.display()).into());
    }
    Ok(PendingChangeLog::open_file(path, LogConfig::default())?)
}

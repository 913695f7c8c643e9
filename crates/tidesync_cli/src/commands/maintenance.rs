//! Compact and clear command implementations.

use std::path::Path;
use tidesync_log::PendingChangeLog;

/// Runs the compact command.
pub fn compact(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log = super::open_existing(path)?;
    let before = std::fs::metadata(path)?.len();
    let removed = log.compact()?;
    let after = std::fs::metadata(path)?.len();

    println!("✓ Compaction complete");
    println!("  Records removed: {removed}");
    println!("  Size before: {before} bytes");
    println!("  Size after:  {after} bytes");
    Ok(())
}

/// Runs the clear command.
pub fn clear(path: &Path, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log = super::open_existing(path)?;
    let discarded = retire_all(&log, confirmed)?;
    println!("✓ Cleared change log ({discarded} unsent records discarded)");
    Ok(())
}

fn retire_all(
    log: &PendingChangeLog,
    confirmed: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let outstanding = log.pending_count();
    if !confirmed {
        return Err(format!(
            "Refusing to clear {outstanding} unsent records without --yes"
        )
        .into());
    }
    log.clear_all()?;
    Ok(outstanding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_log::LogConfig;
    use tidesync_protocol::Operation;

    #[test]
    fn clear_requires_confirmation() {
        let log = PendingChangeLog::in_memory();
        log.enqueue("student".into(), "s1", Operation::Delete, None)
            .unwrap();

        assert!(retire_all(&log, false).is_err());
        assert_eq!(log.pending_count(), 1);

        assert_eq!(retire_all(&log, true).unwrap(), 1);
        assert_eq!(log.pending_count(), 0);
    }

    #[test]
    fn compact_shrinks_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.journal");
        {
            let log = PendingChangeLog::open_file(&path, LogConfig::default()).unwrap();
            for i in 0..10 {
                let id = log
                    .enqueue("grade".into(), format!("g{i}"), Operation::Delete, None)
                    .unwrap();
                log.mark_synced(id).unwrap();
            }
        }
        let before = std::fs::metadata(&path).unwrap().len();

        compact(&path).unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() < before);
        let reopened = super::super::open_existing(&path).unwrap();
        assert!(reopened.list_all().is_empty());
        assert_eq!(reopened.stats().next_id, 11);
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compact(&dir.path().join("absent.journal")).is_err());
    }
}

//! Inspect and stats command implementations.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tidesync_log::{LogStats, PendingChangeLog};
use tidesync_protocol::SyncRecord;

/// Change log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Pending records.
    pub pending: usize,
    /// Failed records.
    pub failed: usize,
    /// Synced records not yet compacted.
    pub synced: usize,
    /// Next id to be assigned.
    pub next_id: u64,
    /// Listed records, oldest first.
    pub records: Vec<SyncRecord>,
}

/// Runs the inspect command.
pub fn run(path: &Path, all: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log = super::open_existing(path)?;
    let result = collect(path, &log, all)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print!("{}", render_text(&result)),
    }
    Ok(())
}

/// Runs the stats command.
pub fn stats(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log = super::open_existing(path)?;
    print!("{}", render_stats(&log.stats()));
    Ok(())
}

fn collect(
    path: &Path,
    log: &PendingChangeLog,
    all: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let stats = log.stats();
    let records = if all {
        log.list_all()
    } else {
        log.list_pending()?
    };

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size: std::fs::metadata(path)?.len(),
        pending: stats.pending,
        failed: stats.failed,
        synced: stats.synced,
        next_id: stats.next_id,
        records,
    })
}

fn render_text(result: &InspectResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TideSync Change Log");
    let _ = writeln!(out, "===================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Path: {}", result.path);
    let _ = writeln!(out, "Size: {}", format_size(result.journal_size));
    let _ = writeln!(
        out,
        "Records: {} pending, {} failed, {} synced",
        result.pending, result.failed, result.synced
    );

    if result.records.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "(no records)");
        return out;
    }

    let _ = writeln!(out);
    for record in &result.records {
        let _ = write!(
            out,
            "#{:<6} {:<8} {:<7} {}/{}  {}",
            record.id,
            record.status,
            record.operation,
            record.entity_kind,
            record.entity_id,
            record.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
        );
        if let Some(error) = &record.last_error {
            let _ = write!(out, "  error: {error}");
        }
        let _ = writeln!(out);
    }
    out
}

fn render_stats(stats: &LogStats) -> String {
    format!(
        "pending: {}\nfailed:  {}\nsynced:  {}\nnext id: {}\n",
        stats.pending, stats.failed, stats.synced, stats.next_id
    )
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

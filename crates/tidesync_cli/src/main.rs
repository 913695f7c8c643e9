//! TideSync CLI
//!
//! Command-line tools for TideSync pending change logs.
//!
//! # Commands
//!
//! - `inspect` - List the records in a change log
//! - `stats` - Show record counts by status
//! - `enqueue` - Append a mutation by hand
//! - `compact` - Drop synced records from the journal
//! - `clear` - Retire every record

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TideSync change log tools.
#[derive(Parser)]
#[command(name = "tidesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the change log journal file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records in the change log
    Inspect {
        /// Include synced records that were not compacted yet
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show record counts by status
    Stats,

    /// Append a mutation to the change log
    Enqueue {
        /// Entity kind, e.g. `student`
        kind: String,

        /// Entity id within its kind
        entity_id: String,

        /// Operation (create, update, delete)
        operation: String,

        /// JSON payload, required for create and update
        #[arg(long)]
        payload: Option<String>,
    },

    /// Rewrite the journal without synced records
    Compact,

    /// Retire every record, sent or not
    Clear {
        /// Confirm that unsent mutations may be discarded
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { all, format } => {
            let path = cli.path.ok_or("Change log path required for inspect")?;
            commands::inspect::run(&path, all, &format)?;
        }
        Commands::Stats => {
            let path = cli.path.ok_or("Change log path required for stats")?;
            commands::inspect::stats(&path)?;
        }
        Commands::Enqueue {
            kind,
            entity_id,
            operation,
            payload,
        } => {
            let path = cli.path.ok_or("Change log path required for enqueue")?;
            commands::enqueue::run(&path, &kind, &entity_id, &operation, payload.as_deref())?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Change log path required for compact")?;
            commands::maintenance::compact(&path)?;
        }
        Commands::Clear { yes } => {
            let path = cli.path.ok_or("Change log path required for clear")?;
            commands::maintenance::clear(&path, yes)?;
        }
        Commands::Version => {
            println!("TideSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Journal format v{}", tidesync_log::JOURNAL_VERSION);
        }
    }

    Ok(())
}

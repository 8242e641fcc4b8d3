/// Snapshot Binary - Exports a story to a JSON document or restores one
///
/// Usage:
///   snapshot export [--db-path <path>] [--out-dir <dir>] [--prefix <name>]
///   snapshot import <file> [--db-path <path>]
///
/// The database path defaults to DB_PATH, then ~/.bookwright/story.db.

use anyhow::{Context, Result};
use bookwright_story::{db_path_from_env, read_snapshot, write_snapshot, Session};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "snapshot")]
#[command(about = "Export or import a complete story snapshot")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write every record to <prefix>_<YYYYMMDD_HHMMSS>.json
    Export {
        /// Path to SQLite database file
        #[arg(long, short)]
        db_path: Option<PathBuf>,

        /// Directory the export is written to
        #[arg(long, short, default_value = ".")]
        out_dir: PathBuf,

        /// File name prefix
        #[arg(long, short, default_value = "bookwright")]
        prefix: String,
    },

    /// Replace the whole story with the contents of an export
    Import {
        /// Export document to read
        file: PathBuf,

        /// Path to SQLite database file
        #[arg(long, short)]
        db_path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Export {
            db_path,
            out_dir,
            prefix,
        } => {
            let session = open_session(db_path)?;
            let path = write_snapshot(&out_dir, &prefix, &session.snapshot())
                .context("Failed to write export")?;
            println!("{}", path.display());
        }
        Command::Import { file, db_path } => {
            let doc = read_snapshot(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut session = open_session(db_path)?;
            let outcome = session.import_snapshot(doc).context("Import rejected")?;
            info!("{}", outcome.status);
        }
    }

    Ok(())
}

fn open_session(db_path: Option<PathBuf>) -> Result<Session> {
    let db_path = db_path.unwrap_or_else(db_path_from_env);
    info!("Database: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Session::open(&db_path).with_context(|| format!("Failed to open {}", db_path.display()))
}

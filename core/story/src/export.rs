use bookwright_schemas::StorySnapshot;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::Result;
use crate::session::WorkingSet;

const DEFAULT_PREFIX: &str = "bookwright";

/// Build an export document from the working set.
///
/// Collections keep working-set order. The book is `None` when none has
/// been saved.
pub fn snapshot(working: &WorkingSet, at: DateTime<Utc>) -> StorySnapshot {
    StorySnapshot {
        export_timestamp: at.to_rfc3339(),
        book_info: working.book().cloned(),
        characters: working.characters().to_vec(),
        scenes: working.scenes().to_vec(),
        chapters: working.chapters().to_vec(),
    }
}

/// `<prefix>_<YYYYMMDD_HHMMSS>.json`, with the prefix reduced to
/// `[A-Za-z0-9_-]`
pub fn export_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.json",
        sanitize_prefix(prefix),
        at.format("%Y%m%d_%H%M%S")
    )
}

fn sanitize_prefix(prefix: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

    let cleaned = unsafe_chars.replace_all(prefix.trim(), "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Write the document as pretty JSON into `dir` and return the file path.
///
/// The file is written to a temporary name in the same directory and renamed
/// into place, so a reader never sees a partial export.
pub fn write_snapshot(dir: &Path, prefix: &str, snapshot: &StorySnapshot) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(export_file_name(prefix, Utc::now()));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, snapshot)?;
    temp.write_all(b"\n")?;
    temp.persist(&path).map_err(|e| e.error)?;

    info!(
        "Exported {} characters, {} scenes, {} chapters to {}",
        snapshot.characters.len(),
        snapshot.scenes.len(),
        snapshot.chapters.len(),
        path.display()
    );
    Ok(path)
}

pub fn read_snapshot(path: &Path) -> Result<StorySnapshot> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookwright_schemas::{Book, Character};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 2, 18, 4, 9).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            export_file_name("lost_kingdom", at()),
            "lost_kingdom_20251102_180409.json"
        );
    }

    #[test]
    fn test_prefix_is_sanitized() {
        assert_eq!(
            export_file_name("../My Book!", at()),
            "My_Book_20251102_180409.json"
        );
        assert_eq!(export_file_name("  ", at()), "bookwright_20251102_180409.json");
        assert_eq!(export_file_name("///", at()), "bookwright_20251102_180409.json");
    }

    #[test]
    fn test_empty_working_set_snapshot() {
        let doc = snapshot(&WorkingSet::default(), at());
        assert_eq!(doc.export_timestamp, "2025-11-02T18:04:09+00:00");
        assert!(doc.book_info.is_none());
        assert!(doc.characters.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let doc = StorySnapshot {
            export_timestamp: at().to_rfc3339(),
            book_info: Some(Book {
                title: "The Lost Kingdom".to_string(),
                ..Book::default()
            }),
            characters: vec![Character::named("Lira")],
            scenes: vec![],
            chapters: vec![],
        };

        let path = write_snapshot(dir.path(), "story", &doc).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("story_"));
        assert!(name.ends_with(".json"));

        assert_eq!(read_snapshot(&path).unwrap(), doc);
        // only the export itself is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_rejects_malformed_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            read_snapshot(&path),
            Err(crate::error::StoryError::Serialization(_))
        ));
    }
}

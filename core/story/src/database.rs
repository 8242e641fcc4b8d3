use bookwright_schemas::{
    generate_chapter_id, generate_character_id, generate_scene_id, Book, Chapter, Character,
    EntityKind, Scene, StorySnapshot,
};
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, StoryError};

/// SQLite-backed entity store.
///
/// Every record carries a surrogate row id; association rows point at those
/// ids and are removed by `ON DELETE CASCADE`, so deleting a character or scene
/// clears its memberships in the same statement.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file and initialize the schema
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.init_schema()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Create all tables and indexes
    fn init_schema(&self) -> Result<()> {
        // Book metadata (singleton row)
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS book_info (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                genre TEXT NOT NULL,
                summary TEXT NOT NULL,
                notes TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                appearance TEXT NOT NULL,
                personality TEXT NOT NULL,
                background TEXT NOT NULL,
                motivation TEXT NOT NULL,
                relationships TEXT NOT NULL,
                skills TEXT NOT NULL,
                notes TEXT NOT NULL,
                age INTEGER,
                gender TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS scenes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                location TEXT NOT NULL,
                day TEXT NOT NULL,
                time TEXT NOT NULL,
                notes TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS chapters (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                notes TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // === ASSOCIATION TABLES ===

        // Character membership in a scene, with the per-scene role and notes
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS character_scenes (
                scene_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                role TEXT,
                notes TEXT,
                PRIMARY KEY (scene_id, character_id),
                FOREIGN KEY (scene_id) REFERENCES scenes(id) ON DELETE CASCADE,
                FOREIGN KEY (character_id) REFERENCES characters(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Scene membership in a chapter; position is the narrative order
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS scene_chapters (
                chapter_id TEXT NOT NULL,
                scene_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (chapter_id, scene_id),
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE,
                FOREIGN KEY (scene_id) REFERENCES scenes(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Reverse lookups (character -> scenes, scene -> chapters)
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_character_scenes_character ON character_scenes(character_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_scene_chapters_scene ON scene_chapters(scene_id)",
            [],
        )?;

        Ok(())
    }

    // ========== BOOK ==========

    /// Create the book record on first save, overwrite it afterwards
    pub fn upsert_book(&self, book: &Book) -> Result<()> {
        write_book(&self.conn, book, &Utc::now().to_rfc3339())?;
        debug!("Saved book info: {}", book.title);
        Ok(())
    }

    pub fn get_book(&self) -> Result<Option<Book>> {
        let book = self
            .conn
            .query_row(
                "SELECT title, author, genre, summary, notes FROM book_info WHERE id = 1",
                [],
                |row| {
                    Ok(Book {
                        title: row.get(0)?,
                        author: row.get(1)?,
                        genre: row.get(2)?,
                        summary: row.get(3)?,
                        notes: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(book)
    }

    // ========== CHARACTERS ==========

    /// Insert a character, or overwrite every field of the one with the same name
    pub fn upsert_character(&self, character: &Character) -> Result<()> {
        write_character(&self.conn, character, &Utc::now().to_rfc3339())?;
        debug!("Saved character: {}", character.name);
        Ok(())
    }

    /// All characters in insertion order
    pub fn get_characters(&self) -> Result<Vec<Character>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, role, appearance, personality, background, motivation,
                    relationships, skills, notes, age, gender
             FROM characters
             ORDER BY rowid",
        )?;

        let characters = stmt
            .query_map([], |row| {
                Ok(Character {
                    name: row.get(0)?,
                    role: row.get(1)?,
                    appearance: row.get(2)?,
                    personality: row.get(3)?,
                    background: row.get(4)?,
                    motivation: row.get(5)?,
                    relationships: row.get(6)?,
                    skills: row.get(7)?,
                    notes: row.get(8)?,
                    age: read_age(row, 9)?,
                    gender: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(characters)
    }

    /// Delete a character and its scene memberships. Returns false if absent.
    pub fn delete_character(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM characters WHERE name = ?1", params![name])?;

        if deleted > 0 {
            info!("Deleted character: {}", name);
        }
        Ok(deleted > 0)
    }

    pub fn count_characters(&self) -> Result<usize> {
        self.count("characters")
    }

    // ========== SCENES ==========

    /// Insert or overwrite a scene together with its full character membership
    pub fn upsert_scene(&self, scene: &Scene) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_scene(&tx, scene, &Utc::now().to_rfc3339())?;
        tx.commit()?;

        debug!(
            "Saved scene: {} ({} characters)",
            scene.title,
            scene.characters.len()
        );
        Ok(())
    }

    /// All scenes in insertion order, each with its characters in saved order
    pub fn get_scenes(&self) -> Result<Vec<Scene>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, location, day, time, notes
             FROM scenes
             ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    Scene {
                        title: row.get(1)?,
                        description: row.get(2)?,
                        location: row.get(3)?,
                        day: row.get(4)?,
                        time: row.get(5)?,
                        notes: row.get(6)?,
                        ..Scene::default()
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut members = self.conn.prepare(
            "SELECT c.name, cs.role, cs.notes
             FROM character_scenes cs
             JOIN characters c ON c.id = cs.character_id
             WHERE cs.scene_id = ?1
             ORDER BY cs.position",
        )?;

        let mut scenes = Vec::with_capacity(rows.len());
        for (scene_id, mut scene) in rows {
            let memberships = members
                .query_map(params![scene_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for (name, role, notes) in memberships {
                if let Some(role) = role {
                    scene.character_roles.insert(name.clone(), role);
                }
                if let Some(notes) = notes {
                    scene.character_notes.insert(name.clone(), notes);
                }
                scene.characters.push(name);
            }
            scenes.push(scene);
        }

        Ok(scenes)
    }

    /// Delete a scene, its character memberships and its chapter placements
    pub fn delete_scene(&self, title: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM scenes WHERE title = ?1", params![title])?;

        if deleted > 0 {
            info!("Deleted scene: {}", title);
        }
        Ok(deleted > 0)
    }

    pub fn count_scenes(&self) -> Result<usize> {
        self.count("scenes")
    }

    // ========== CHAPTERS ==========

    /// Insert or overwrite a chapter together with its ordered scene sequence
    pub fn upsert_chapter(&self, chapter: &Chapter) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_chapter(&tx, chapter, &Utc::now().to_rfc3339())?;
        tx.commit()?;

        debug!(
            "Saved chapter: {} ({} scenes)",
            chapter.title,
            chapter.scenes.len()
        );
        Ok(())
    }

    /// All chapters in insertion order, each with its scenes in narrative order
    pub fn get_chapters(&self) -> Result<Vec<Chapter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, description, notes
             FROM chapters
             ORDER BY rowid",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    Chapter {
                        title: row.get(1)?,
                        description: row.get(2)?,
                        notes: row.get(3)?,
                        scenes: Vec::new(),
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut members = self.conn.prepare(
            "SELECT s.title
             FROM scene_chapters sc
             JOIN scenes s ON s.id = sc.scene_id
             WHERE sc.chapter_id = ?1
             ORDER BY sc.position",
        )?;

        let mut chapters = Vec::with_capacity(rows.len());
        for (chapter_id, mut chapter) in rows {
            chapter.scenes = members
                .query_map(params![chapter_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            chapters.push(chapter);
        }

        Ok(chapters)
    }

    pub fn delete_chapter(&self, title: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM chapters WHERE title = ?1", params![title])?;

        if deleted > 0 {
            info!("Deleted chapter: {}", title);
        }
        Ok(deleted > 0)
    }

    pub fn count_chapters(&self) -> Result<usize> {
        self.count("chapters")
    }

    // ========== IMPORT ==========

    /// Replace the whole store with the contents of an export document.
    /// Either every record is written or nothing changes.
    pub fn replace_all(&self, snapshot: &StorySnapshot) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute_batch(
            "DELETE FROM scene_chapters;
             DELETE FROM character_scenes;
             DELETE FROM chapters;
             DELETE FROM scenes;
             DELETE FROM characters;
             DELETE FROM book_info;",
        )?;

        if let Some(ref book) = snapshot.book_info {
            write_book(&tx, book, &now)?;
        }
        for character in &snapshot.characters {
            write_character(&tx, character, &now)?;
        }
        for scene in &snapshot.scenes {
            write_scene(&tx, scene, &now)?;
        }
        for chapter in &snapshot.chapters {
            write_chapter(&tx, chapter, &now)?;
        }

        tx.commit()?;

        info!(
            "Replaced store contents: {} characters, {} scenes, {} chapters",
            snapshot.characters.len(),
            snapshot.scenes.len(),
            snapshot.chapters.len()
        );
        Ok(())
    }

    fn count(&self, table: &str) -> Result<usize> {
        let query = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = self.conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn write_book(conn: &Connection, book: &Book, now: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO book_info (id, title, author, genre, summary, notes, created_at, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            genre = excluded.genre,
            summary = excluded.summary,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![book.title, book.author, book.genre, book.summary, book.notes, now],
    )?;
    Ok(())
}

fn write_character(conn: &Connection, character: &Character, now: &str) -> Result<()> {
    // The generated id is only used on first insert; an existing row keeps its id
    let id = generate_character_id();

    conn.execute(
        "INSERT INTO characters (id, name, role, appearance, personality, background,
                                 motivation, relationships, skills, notes, age, gender,
                                 created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
         ON CONFLICT(name) DO UPDATE SET
            role = excluded.role,
            appearance = excluded.appearance,
            personality = excluded.personality,
            background = excluded.background,
            motivation = excluded.motivation,
            relationships = excluded.relationships,
            skills = excluded.skills,
            notes = excluded.notes,
            age = excluded.age,
            gender = excluded.gender,
            updated_at = excluded.updated_at",
        params![
            id.0,
            character.name,
            character.role,
            character.appearance,
            character.personality,
            character.background,
            character.motivation,
            character.relationships,
            character.skills,
            character.notes,
            character.age.map(i64::from),
            character.gender,
            now,
        ],
    )?;
    Ok(())
}

fn write_scene(conn: &Connection, scene: &Scene, now: &str) -> Result<()> {
    let id = generate_scene_id();

    conn.execute(
        "INSERT INTO scenes (id, title, description, location, day, time, notes,
                             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(title) DO UPDATE SET
            description = excluded.description,
            location = excluded.location,
            day = excluded.day,
            time = excluded.time,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![
            id.0,
            scene.title,
            scene.description,
            scene.location,
            scene.day,
            scene.time,
            scene.notes,
            now,
        ],
    )?;

    let scene_id: String = conn.query_row(
        "SELECT id FROM scenes WHERE title = ?1",
        params![scene.title],
        |row| row.get(0),
    )?;

    conn.execute(
        "DELETE FROM character_scenes WHERE scene_id = ?1",
        params![scene_id],
    )?;

    for (position, name) in scene.characters.iter().enumerate() {
        let character_id = lookup_id(conn, EntityKind::Character, name)?.ok_or_else(|| {
            StoryError::validation(format!(
                "Scene '{}' references unknown character '{}'",
                scene.title, name
            ))
        })?;

        conn.execute(
            "INSERT INTO character_scenes (scene_id, character_id, position, role, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                scene_id,
                character_id,
                position as i64,
                scene.character_roles.get(name),
                scene.character_notes.get(name),
            ],
        )?;
    }

    Ok(())
}

fn write_chapter(conn: &Connection, chapter: &Chapter, now: &str) -> Result<()> {
    let id = generate_chapter_id();

    conn.execute(
        "INSERT INTO chapters (id, title, description, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(title) DO UPDATE SET
            description = excluded.description,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![id.0, chapter.title, chapter.description, chapter.notes, now],
    )?;

    let chapter_id: String = conn.query_row(
        "SELECT id FROM chapters WHERE title = ?1",
        params![chapter.title],
        |row| row.get(0),
    )?;

    conn.execute(
        "DELETE FROM scene_chapters WHERE chapter_id = ?1",
        params![chapter_id],
    )?;

    for (position, title) in chapter.scenes.iter().enumerate() {
        let scene_id = lookup_id(conn, EntityKind::Scene, title)?.ok_or_else(|| {
            StoryError::validation(format!(
                "Chapter '{}' references unknown scene '{}'",
                chapter.title, title
            ))
        })?;

        conn.execute(
            "INSERT INTO scene_chapters (chapter_id, scene_id, position) VALUES (?1, ?2, ?3)",
            params![chapter_id, scene_id, position as i64],
        )?;
    }

    Ok(())
}

/// Resolve a natural key to its row id
/// Stored ages outside the `u32` range are a conversion error, never truncated
fn read_age(row: &Row, idx: usize) -> rusqlite::Result<Option<u32>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|age| {
            u32::try_from(age)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
        })
        .transpose()
}

fn lookup_id(conn: &Connection, kind: EntityKind, key: &str) -> Result<Option<String>> {
    let query = match kind {
        EntityKind::Character => "SELECT id FROM characters WHERE name = ?1",
        EntityKind::Scene => "SELECT id FROM scenes WHERE title = ?1",
        EntityKind::Chapter => "SELECT id FROM chapters WHERE title = ?1",
        EntityKind::Book => return Ok(None),
    };

    let id = conn
        .query_row(query, params![key], |row| row.get(0))
        .optional()?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn scene_with(title: &str, characters: &[&str]) -> Scene {
        let mut scene = Scene::titled(title);
        scene.characters = characters.iter().map(|c| c.to_string()).collect();
        scene
    }

    fn chapter_with(title: &str, scenes: &[&str]) -> Chapter {
        let mut chapter = Chapter::titled(title);
        chapter.scenes = scenes.iter().map(|s| s.to_string()).collect();
        chapter
    }

    #[test]
    fn test_database_creation() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        assert!(db.get_book().unwrap().is_none());
        assert_eq!(db.count_characters().unwrap(), 0);
        assert_eq!(db.count_scenes().unwrap(), 0);
        assert_eq!(db.count_chapters().unwrap(), 0);
    }

    #[test]
    fn test_book_is_singleton() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        let mut book = Book {
            title: "The Lost Kingdom".to_string(),
            author: "Jane Doe".to_string(),
            ..Book::default()
        };
        db.upsert_book(&book).unwrap();

        book.genre = "Fantasy".to_string();
        db.upsert_book(&book).unwrap();

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM book_info", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.get_book().unwrap(), Some(book));
    }

    #[test]
    fn test_character_upsert_is_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        let mut lira = Character::named("Lira");
        lira.role = "Protagonist".to_string();
        lira.age = Some(19);

        db.upsert_character(&lira).unwrap();
        db.upsert_character(&lira).unwrap();

        assert_eq!(db.get_characters().unwrap(), vec![lira]);
    }

    #[test]
    fn test_out_of_range_age_is_an_error() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();
        db.upsert_character(&Character::named("Lira")).unwrap();

        db.conn
            .execute("UPDATE characters SET age = -3 WHERE name = 'Lira'", [])
            .unwrap();
        assert!(matches!(db.get_characters(), Err(StoryError::Storage(_))));

        db.conn
            .execute("UPDATE characters SET age = 5000000000 WHERE name = 'Lira'", [])
            .unwrap();
        assert!(db.get_characters().is_err());
    }

    #[test]
    fn test_character_upsert_keeps_row_id_and_order() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        db.upsert_character(&Character::named("Lira")).unwrap();
        db.upsert_character(&Character::named("Kael")).unwrap();
        let first_id = lookup_id(&db.conn, EntityKind::Character, "Lira").unwrap();

        let mut updated = Character::named("Lira");
        updated.notes = "Carries the map".to_string();
        db.upsert_character(&updated).unwrap();

        assert_eq!(lookup_id(&db.conn, EntityKind::Character, "Lira").unwrap(), first_id);
        let names: Vec<String> = db.get_characters().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Lira", "Kael"]);
    }

    #[test]
    fn test_scene_membership_round_trip() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        db.upsert_character(&Character::named("Lira")).unwrap();
        db.upsert_character(&Character::named("Kael")).unwrap();

        let mut scene = scene_with("Dawn", &["Kael", "Lira"]);
        scene.character_roles.insert("Kael".into(), "Mentor".into());
        scene.character_notes.insert("Lira".into(), "Hides the map".into());
        db.upsert_scene(&scene).unwrap();

        assert_eq!(db.get_scenes().unwrap(), vec![scene]);
    }

    #[test]
    fn test_scene_with_unknown_character_is_rolled_back() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        db.upsert_character(&Character::named("Lira")).unwrap();

        let result = db.upsert_scene(&scene_with("Dawn", &["Lira", "Ghost"]));
        assert!(matches!(result, Err(StoryError::Validation(_))));
        assert_eq!(db.count_scenes().unwrap(), 0);
    }

    #[test]
    fn test_delete_character_removes_memberships() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        db.upsert_character(&Character::named("Lira")).unwrap();
        db.upsert_character(&Character::named("Kael")).unwrap();
        let mut scene = scene_with("Dawn", &["Lira", "Kael"]);
        scene.character_roles.insert("Lira".into(), "Lead".into());
        db.upsert_scene(&scene).unwrap();

        assert!(db.delete_character("Lira").unwrap());

        let scenes = db.get_scenes().unwrap();
        assert_eq!(scenes[0].characters, vec!["Kael".to_string()]);
        assert!(scenes[0].character_roles.is_empty());
    }

    #[test]
    fn test_delete_scene_removes_chapter_placements() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        db.upsert_scene(&Scene::titled("S1")).unwrap();
        db.upsert_scene(&Scene::titled("S2")).unwrap();
        db.upsert_chapter(&chapter_with("Ch", &["S1", "S2"])).unwrap();

        assert!(db.delete_scene("S1").unwrap());
        assert_eq!(db.get_chapters().unwrap()[0].scenes, vec!["S2".to_string()]);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        assert!(!db.delete_character("Nobody").unwrap());
        assert!(!db.delete_scene("Nowhere").unwrap());
        assert!(!db.delete_chapter("Never").unwrap());
    }

    #[test]
    fn test_chapter_order_is_preserved() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        for title in ["S1", "S2", "S3"] {
            db.upsert_scene(&Scene::titled(title)).unwrap();
        }
        db.upsert_chapter(&chapter_with("Ch", &["S3", "S1", "S2"])).unwrap();

        assert_eq!(
            db.get_chapters().unwrap()[0].scenes,
            vec!["S3".to_string(), "S1".to_string(), "S2".to_string()]
        );
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::new(temp.path()).unwrap();

        db.upsert_character(&Character::named("Lira")).unwrap();

        let broken = StorySnapshot {
            export_timestamp: Utc::now().to_rfc3339(),
            book_info: None,
            characters: vec![Character::named("Kael")],
            scenes: vec![scene_with("Dawn", &["Lira"])],
            chapters: vec![],
        };
        assert!(db.replace_all(&broken).is_err());

        let names: Vec<String> = db.get_characters().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Lira"]);
    }
}

use bookwright_schemas::{
    Book, Chapter, ChapterContext, Character, CharacterAppearance, CharacterContext, ChatContext,
    ChatFocus, EntityKind, FocusRef, Scene, SceneContext, StorySnapshot, StoryStats,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::error::{Result, StoryError};
use crate::export;

const DEFAULT_SCENE_ROLE: &str = "Supporting";

/// Result of a mutating operation: a status line for the user plus the
/// updated data.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub status: String,
    pub data: T,
}

impl<T> Outcome<T> {
    pub fn new(status: impl Into<String>, data: T) -> Self {
        Self {
            status: status.into(),
            data,
        }
    }
}

/// What a delete removed. `cascaded` names the records whose references to
/// the deleted key were cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deletion {
    pub removed: bool,
    pub cascaded: Vec<String>,
}

// ============================================================================
// Working Set
// ============================================================================

/// In-memory mirror of every record in the store.
///
/// Lookups are linear scans by natural key; collections keep store order.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    book: Option<Book>,
    characters: Vec<Character>,
    scenes: Vec<Scene>,
    chapters: Vec<Chapter>,
}

impl WorkingSet {
    /// Read every record from the store
    pub fn load(db: &Database) -> Result<Self> {
        Ok(Self {
            book: db.get_book()?,
            characters: db.get_characters()?,
            scenes: db.get_scenes()?,
            chapters: db.get_chapters()?,
        })
    }

    pub fn book(&self) -> Option<&Book> {
        self.book.as_ref()
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn find_character(&self, name: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.name == name)
    }

    pub fn find_scene(&self, title: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.title == title)
    }

    pub fn find_chapter(&self, title: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.title == title)
    }

    /// Scenes the character appears in, in scene order
    pub fn scenes_for_character(&self, name: &str) -> Vec<&Scene> {
        self.scenes.iter().filter(|s| s.has_character(name)).collect()
    }

    /// Chapters that contain the scene
    pub fn chapters_for_scene(&self, title: &str) -> Vec<&Chapter> {
        self.chapters.iter().filter(|c| c.has_scene(title)).collect()
    }

    /// Chapters containing at least one scene the character appears in
    pub fn chapters_for_character(&self, name: &str) -> Vec<&Chapter> {
        let scene_titles: HashSet<&str> = self
            .scenes_for_character(name)
            .into_iter()
            .map(|s| s.title.as_str())
            .collect();

        self.chapters
            .iter()
            .filter(|c| c.scenes.iter().any(|s| scene_titles.contains(s.as_str())))
            .collect()
    }

    pub fn stats(&self) -> StoryStats {
        StoryStats {
            has_book: self.book.is_some(),
            characters: self.characters.len(),
            scenes: self.scenes.len(),
            chapters: self.chapters.len(),
        }
    }

    fn put_character(&mut self, character: Character) -> bool {
        match self.characters.iter_mut().find(|c| c.name == character.name) {
            Some(existing) => {
                *existing = character;
                false
            }
            None => {
                self.characters.push(character);
                true
            }
        }
    }

    fn put_scene(&mut self, scene: Scene) -> bool {
        match self.scenes.iter_mut().find(|s| s.title == scene.title) {
            Some(existing) => {
                *existing = scene;
                false
            }
            None => {
                self.scenes.push(scene);
                true
            }
        }
    }

    fn put_chapter(&mut self, chapter: Chapter) -> bool {
        match self.chapters.iter_mut().find(|c| c.title == chapter.title) {
            Some(existing) => {
                *existing = chapter;
                false
            }
            None => {
                self.chapters.push(chapter);
                true
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// The editing session: the store plus its in-memory mirror.
///
/// Every mutation is committed to the store first and only then applied to
/// the working set, so a failed write leaves both unchanged.
pub struct Session {
    db: Database,
    working: WorkingSet,
}

impl Session {
    /// Open the store at `path` and load the working set
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(Database::new(path)?)
    }

    pub fn new(db: Database) -> Result<Self> {
        let working = WorkingSet::load(&db)?;
        info!(
            "Session loaded: {} characters, {} scenes, {} chapters",
            working.characters.len(),
            working.scenes.len(),
            working.chapters.len()
        );
        Ok(Self { db, working })
    }

    /// Replace the working set wholesale from the store
    pub fn load(&mut self) -> Result<()> {
        self.working = WorkingSet::load(&self.db)?;
        debug!("Working set reloaded from store");
        Ok(())
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ========== BOOK ==========

    pub fn save_book(&mut self, book: Book) -> Result<Outcome<Book>> {
        self.db.upsert_book(&book)?;
        let status = if self.working.book.is_some() {
            format!("Updated book: {}", book.title)
        } else {
            format!("Saved book: {}", book.title)
        };
        self.working.book = Some(book.clone());

        Ok(Outcome::new(status, book))
    }

    // ========== CHARACTERS ==========

    /// Save a character; an existing name is overwritten in full
    pub fn save_character(&mut self, character: Character) -> Result<Outcome<Character>> {
        let character = normalize_character(character)?;
        self.db.upsert_character(&character)?;

        let status = if self.working.put_character(character.clone()) {
            format!("Saved new character: {}", character.name)
        } else {
            format!("Updated character: {}", character.name)
        };
        info!("{}", status);

        Ok(Outcome::new(status, character))
    }

    /// Delete a character and remove it from every scene
    pub fn delete_character(&mut self, name: &str) -> Result<Outcome<Deletion>> {
        let name = name.trim();
        let removed = self.db.delete_character(name)?;

        self.working.characters.retain(|c| c.name != name);
        let mut cascaded = Vec::new();
        for scene in &mut self.working.scenes {
            if scene.purge_character(name) {
                cascaded.push(scene.title.clone());
            }
        }

        let status = deletion_status(EntityKind::Character, name, removed, &cascaded, "scene");
        Ok(Outcome::new(status, Deletion { removed, cascaded }))
    }

    // ========== SCENES ==========

    /// Save a scene with its full membership; an existing title is overwritten
    pub fn save_scene(&mut self, scene: Scene) -> Result<Outcome<Scene>> {
        let scene = check_scene(&self.working, scene)?;
        let is_new = self.working.find_scene(&scene.title).is_none();

        let status = if is_new {
            format!("Saved new scene: {}", scene.title)
        } else {
            format!("Updated scene: {}", scene.title)
        };
        self.commit_scene(scene, status)
    }

    /// Delete a scene and remove it from every chapter
    pub fn delete_scene(&mut self, title: &str) -> Result<Outcome<Deletion>> {
        let title = title.trim();
        let removed = self.db.delete_scene(title)?;

        self.working.scenes.retain(|s| s.title != title);
        let mut cascaded = Vec::new();
        for chapter in &mut self.working.chapters {
            let before = chapter.scenes.len();
            chapter.scenes.retain(|s| s != title);
            if chapter.scenes.len() != before {
                cascaded.push(chapter.title.clone());
            }
        }

        let status = deletion_status(EntityKind::Scene, title, removed, &cascaded, "chapter");
        Ok(Outcome::new(status, Deletion { removed, cascaded }))
    }

    // ========== CHAPTERS ==========

    /// Save a chapter with its ordered scenes; an existing title is overwritten
    pub fn save_chapter(&mut self, chapter: Chapter) -> Result<Outcome<Chapter>> {
        let chapter = check_chapter(&self.working, chapter)?;
        let is_new = self.working.find_chapter(&chapter.title).is_none();

        let status = if is_new {
            format!("Saved new chapter: {}", chapter.title)
        } else {
            format!("Updated chapter: {}", chapter.title)
        };
        self.commit_chapter(chapter, status)
    }

    pub fn delete_chapter(&mut self, title: &str) -> Result<Outcome<Deletion>> {
        let title = title.trim();
        let removed = self.db.delete_chapter(title)?;
        self.working.chapters.retain(|c| c.title != title);

        let status = deletion_status(EntityKind::Chapter, title, removed, &[], "");
        Ok(Outcome::new(
            status,
            Deletion {
                removed,
                cascaded: Vec::new(),
            },
        ))
    }

    // ========== CHARACTER <-> SCENE ==========

    /// Add a character to a scene. Adding an existing member changes nothing.
    pub fn add_character_to_scene(&mut self, title: &str, name: &str) -> Result<Outcome<Scene>> {
        let (title, name) = (title.trim(), name.trim());
        let mut scene = self.existing_scene(title)?;
        if self.working.find_character(name).is_none() {
            return Err(StoryError::unknown(EntityKind::Character, name));
        }

        if scene.has_character(name) {
            return Ok(Outcome::new(
                format!("{} is already in scene {}", name, title),
                scene,
            ));
        }

        scene.characters.push(name.to_string());
        self.commit_scene(scene, format!("Added {} to scene {}", name, title))
    }

    /// Remove a character from a scene together with its role and notes
    pub fn remove_character_from_scene(
        &mut self,
        title: &str,
        name: &str,
    ) -> Result<Outcome<Scene>> {
        let (title, name) = (title.trim(), name.trim());
        let mut scene = self.existing_scene(title)?;

        if !scene.purge_character(name) {
            return Ok(Outcome::new(
                format!("{} is not in scene {}", name, title),
                scene,
            ));
        }

        self.commit_scene(scene, format!("Removed {} from scene {}", name, title))
    }

    /// Set a member's role and notes for one scene. Empty values clear them.
    pub fn set_character_scene_details(
        &mut self,
        title: &str,
        name: &str,
        role: &str,
        notes: &str,
    ) -> Result<Outcome<Scene>> {
        let (title, name) = (title.trim(), name.trim());
        let mut scene = self.existing_scene(title)?;

        if !scene.has_character(name) {
            return Err(StoryError::validation(format!(
                "{} is not in scene {}",
                name, title
            )));
        }

        set_or_clear(&mut scene.character_roles, name, role);
        set_or_clear(&mut scene.character_notes, name, notes);

        self.commit_scene(scene, format!("Updated scene details for {} in {}", name, title))
    }

    /// Put a character into a fresh placeholder scene named after it.
    /// If that scene already exists the character is added to it instead.
    pub fn add_character_to_new_scene(&mut self, name: &str) -> Result<Outcome<Scene>> {
        let name = name.trim();
        if self.working.find_character(name).is_none() {
            return Err(StoryError::unknown(EntityKind::Character, name));
        }

        let title = format!("New Scene with {}", name);
        if self.working.find_scene(&title).is_some() {
            return self.add_character_to_scene(&title, name);
        }

        let mut scene = Scene::titled(title);
        scene.day = "Day 1".to_string();
        scene.time = "Morning".to_string();
        scene.location = "New Location".to_string();
        scene.characters.push(name.to_string());
        scene
            .character_roles
            .insert(name.to_string(), DEFAULT_SCENE_ROLE.to_string());

        self.commit_scene(scene, format!("Added {} to new scene", name))
    }

    /// One row per scene the character appears in
    pub fn character_appearances(&self, name: &str) -> Vec<CharacterAppearance> {
        let name = name.trim();
        self.working
            .scenes_for_character(name)
            .into_iter()
            .map(|scene| CharacterAppearance {
                scene_title: scene.title.clone(),
                day: scene.day.clone(),
                time: scene.time.clone(),
                location: scene.location.clone(),
                role: scene
                    .character_roles
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_SCENE_ROLE.to_string()),
                notes: scene.character_notes.get(name).cloned().unwrap_or_default(),
            })
            .collect()
    }

    // ========== SCENE <-> CHAPTER ==========

    /// Append scenes to a chapter; titles already present are skipped
    pub fn assign_scenes(&mut self, title: &str, scene_titles: &[String]) -> Result<Outcome<Chapter>> {
        let title = title.trim();
        let mut chapter = self.existing_chapter(title)?;

        let mut added = 0;
        for scene_title in scene_titles {
            let scene_title = scene_title.trim();
            if self.working.find_scene(scene_title).is_none() {
                return Err(StoryError::unknown(EntityKind::Scene, scene_title));
            }
            if !chapter.has_scene(scene_title) {
                chapter.scenes.push(scene_title.to_string());
                added += 1;
            }
        }

        if added == 0 {
            return Ok(Outcome::new(
                format!("No new scenes assigned to {}", title),
                chapter,
            ));
        }

        self.commit_chapter(chapter, format!("Assigned {} scenes to {}", added, title))
    }

    pub fn remove_scene_from_chapter(
        &mut self,
        title: &str,
        scene_title: &str,
    ) -> Result<Outcome<Chapter>> {
        let (title, scene_title) = (title.trim(), scene_title.trim());
        let mut chapter = self.existing_chapter(title)?;

        if !chapter.has_scene(scene_title) {
            return Ok(Outcome::new(
                format!("Scene {} is not in {}", scene_title, title),
                chapter,
            ));
        }

        chapter.scenes.retain(|s| s != scene_title);
        self.commit_chapter(chapter, format!("Removed scene {} from {}", scene_title, title))
    }

    /// Replace a chapter's scene order.
    ///
    /// `order` must be exactly a permutation of the chapter's current scenes;
    /// anything else is rejected and the chapter is left as it was.
    pub fn reorder_chapter(&mut self, title: &str, order: &[String]) -> Result<Outcome<Chapter>> {
        let title = title.trim();
        let mut chapter = self.existing_chapter(title)?;

        let order: Vec<String> = order.iter().map(|s| s.trim().to_string()).collect();
        let current: HashSet<&str> = chapter.scenes.iter().map(String::as_str).collect();

        let mut seen = HashSet::new();
        let mut repeated = Vec::new();
        let mut unknown = Vec::new();
        for scene_title in &order {
            if !seen.insert(scene_title.as_str()) {
                repeated.push(scene_title.clone());
            } else if !current.contains(scene_title.as_str()) {
                unknown.push(scene_title.clone());
            }
        }
        let missing: Vec<String> = chapter
            .scenes
            .iter()
            .filter(|s| !seen.contains(s.as_str()))
            .cloned()
            .collect();

        if !(missing.is_empty() && unknown.is_empty() && repeated.is_empty()) {
            let mut problems = Vec::new();
            if !missing.is_empty() {
                problems.push(format!("missing {}", missing.join(", ")));
            }
            if !unknown.is_empty() {
                problems.push(format!("not in chapter {}", unknown.join(", ")));
            }
            if !repeated.is_empty() {
                problems.push(format!("repeated {}", repeated.join(", ")));
            }
            warn!("Rejected reorder of {}: {}", title, problems.join("; "));
            return Err(StoryError::validation(format!(
                "Reorder of {} rejected: {}",
                title,
                problems.join("; ")
            )));
        }

        chapter.scenes = order;
        self.commit_chapter(chapter, format!("Reordered scenes in {}", title))
    }

    // ========== ASSISTANT CONTEXT ==========

    /// Gather the records a chat message is about
    pub fn chat_context(&self, focus: Option<&FocusRef>) -> Result<ChatContext> {
        let focus = match focus {
            None => None,
            Some(FocusRef::Character(name)) => {
                let name = name.trim();
                let character = self
                    .working
                    .find_character(name)
                    .cloned()
                    .ok_or_else(|| StoryError::unknown(EntityKind::Character, name))?;
                Some(ChatFocus::Character(CharacterContext {
                    character,
                    scenes: cloned(self.working.scenes_for_character(name)),
                    chapters: cloned(self.working.chapters_for_character(name)),
                }))
            }
            Some(FocusRef::Scene(title)) => {
                let title = title.trim();
                let scene = self
                    .working
                    .find_scene(title)
                    .cloned()
                    .ok_or_else(|| StoryError::unknown(EntityKind::Scene, title))?;
                let characters = scene
                    .characters
                    .iter()
                    .filter_map(|name| self.working.find_character(name).cloned())
                    .collect();
                Some(ChatFocus::Scene(SceneContext {
                    characters,
                    chapters: cloned(self.working.chapters_for_scene(title)),
                    scene,
                }))
            }
            Some(FocusRef::Chapter(title)) => {
                let title = title.trim();
                let chapter = self
                    .working
                    .find_chapter(title)
                    .cloned()
                    .ok_or_else(|| StoryError::unknown(EntityKind::Chapter, title))?;
                Some(ChatFocus::Chapter(ChapterContext {
                    scenes: self.chapter_scenes(&chapter),
                    chapter,
                }))
            }
        };

        Ok(ChatContext {
            book: self.working.book.clone(),
            focus,
            chapters: self.working.chapters.clone(),
        })
    }

    /// A chapter and the characters appearing in its scenes, in first-appearance order
    pub fn chapter_cast(&self, title: &str) -> Result<(Chapter, Vec<Character>)> {
        let title = title.trim();
        let chapter = self.existing_chapter(title)?;

        let mut seen = HashSet::new();
        let mut cast = Vec::new();
        for scene in self.chapter_scenes(&chapter) {
            for name in &scene.characters {
                if seen.insert(name.clone()) {
                    if let Some(character) = self.working.find_character(name) {
                        cast.push(character.clone());
                    }
                }
            }
        }

        Ok((chapter, cast))
    }

    // ========== EXPORT / IMPORT ==========

    /// Snapshot of the working set, stamped now
    pub fn snapshot(&self) -> StorySnapshot {
        export::snapshot(&self.working, chrono::Utc::now())
    }

    /// Replace the whole story with the contents of an export document
    pub fn import_snapshot(&mut self, snapshot: StorySnapshot) -> Result<Outcome<StoryStats>> {
        let staged = stage_snapshot(snapshot)?;
        self.db.replace_all(&staged)?;
        self.load()?;

        let stats = self.working.stats();
        let status = format!(
            "Imported {} characters, {} scenes, {} chapters",
            stats.characters, stats.scenes, stats.chapters
        );
        info!("{}", status);
        Ok(Outcome::new(status, stats))
    }

    // ========== INTERNALS ==========

    fn existing_scene(&self, title: &str) -> Result<Scene> {
        self.working
            .find_scene(title)
            .cloned()
            .ok_or_else(|| StoryError::unknown(EntityKind::Scene, title))
    }

    fn existing_chapter(&self, title: &str) -> Result<Chapter> {
        self.working
            .find_chapter(title)
            .cloned()
            .ok_or_else(|| StoryError::unknown(EntityKind::Chapter, title))
    }

    fn chapter_scenes(&self, chapter: &Chapter) -> Vec<Scene> {
        chapter
            .scenes
            .iter()
            .filter_map(|title| self.working.find_scene(title).cloned())
            .collect()
    }

    fn commit_scene(&mut self, scene: Scene, status: String) -> Result<Outcome<Scene>> {
        self.db.upsert_scene(&scene)?;
        self.working.put_scene(scene.clone());
        info!("{}", status);
        Ok(Outcome::new(status, scene))
    }

    fn commit_chapter(&mut self, chapter: Chapter, status: String) -> Result<Outcome<Chapter>> {
        self.db.upsert_chapter(&chapter)?;
        self.working.put_chapter(chapter.clone());
        info!("{}", status);
        Ok(Outcome::new(status, chapter))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn normalize_key(kind: EntityKind, raw: &str) -> Result<String> {
    let key = raw.trim();
    if key.is_empty() {
        let field = if kind == EntityKind::Character { "name" } else { "title" };
        return Err(StoryError::validation(format!(
            "{} {} must not be empty",
            kind.label(),
            field
        )));
    }
    Ok(key.to_string())
}

fn normalize_character(mut character: Character) -> Result<Character> {
    character.name = normalize_key(EntityKind::Character, &character.name)?;
    Ok(character)
}

/// Normalize a scene and check it against the characters in `working`
fn check_scene(working: &WorkingSet, mut scene: Scene) -> Result<Scene> {
    scene.title = normalize_key(EntityKind::Scene, &scene.title)?;

    let mut seen = HashSet::new();
    let mut characters = Vec::with_capacity(scene.characters.len());
    for name in &scene.characters {
        let name = name.trim();
        if name.is_empty() || !seen.insert(name.to_string()) {
            continue;
        }
        if working.find_character(name).is_none() {
            return Err(StoryError::validation(format!(
                "Scene {} references unknown character {}",
                scene.title, name
            )));
        }
        characters.push(name.to_string());
    }
    scene.characters = characters;

    for (map_name, map) in [
        ("role", &mut scene.character_roles),
        ("notes", &mut scene.character_notes),
    ] {
        let entries = std::mem::take(map);
        for (name, value) in entries {
            let name = name.trim().to_string();
            if !seen.contains(&name) {
                return Err(StoryError::validation(format!(
                    "Scene {} has a {} entry for {}, who is not in the scene",
                    scene.title, map_name, name
                )));
            }
            map.insert(name, value);
        }
    }

    Ok(scene)
}

/// Normalize a chapter and check it against the scenes in `working`
fn check_chapter(working: &WorkingSet, mut chapter: Chapter) -> Result<Chapter> {
    chapter.title = normalize_key(EntityKind::Chapter, &chapter.title)?;

    let mut seen = HashSet::new();
    let mut scenes = Vec::with_capacity(chapter.scenes.len());
    for title in &chapter.scenes {
        let title = title.trim();
        if title.is_empty() || !seen.insert(title.to_string()) {
            continue;
        }
        if working.find_scene(title).is_none() {
            return Err(StoryError::validation(format!(
                "Chapter {} references unknown scene {}",
                chapter.title, title
            )));
        }
        scenes.push(title.to_string());
    }
    chapter.scenes = scenes;

    Ok(chapter)
}

/// Validate an export document record by record, as if each were saved in turn
fn stage_snapshot(snapshot: StorySnapshot) -> Result<StorySnapshot> {
    let mut staged = WorkingSet {
        book: snapshot.book_info,
        ..WorkingSet::default()
    };

    for character in snapshot.characters {
        let character = normalize_character(character)?;
        if !staged.put_character(character.clone()) {
            return Err(StoryError::validation(format!(
                "Duplicate character in import: {}",
                character.name
            )));
        }
    }
    for scene in snapshot.scenes {
        let scene = check_scene(&staged, scene)?;
        let title = scene.title.clone();
        if !staged.put_scene(scene) {
            return Err(StoryError::validation(format!(
                "Duplicate scene in import: {}",
                title
            )));
        }
    }
    for chapter in snapshot.chapters {
        let chapter = check_chapter(&staged, chapter)?;
        let title = chapter.title.clone();
        if !staged.put_chapter(chapter) {
            return Err(StoryError::validation(format!(
                "Duplicate chapter in import: {}",
                title
            )));
        }
    }

    Ok(StorySnapshot {
        export_timestamp: snapshot.export_timestamp,
        book_info: staged.book,
        characters: staged.characters,
        scenes: staged.scenes,
        chapters: staged.chapters,
    })
}

fn set_or_clear(
    map: &mut std::collections::BTreeMap<String, String>,
    name: &str,
    value: &str,
) {
    let value = value.trim();
    if value.is_empty() {
        map.remove(name);
    } else {
        map.insert(name.to_string(), value.to_string());
    }
}

fn deletion_status(
    kind: EntityKind,
    key: &str,
    removed: bool,
    cascaded: &[String],
    cascade_noun: &str,
) -> String {
    if !removed {
        return format!("No {} named {}", kind.as_str(), key);
    }
    if cascaded.is_empty() {
        format!("Deleted {}: {}", kind.as_str(), key)
    } else {
        format!(
            "Deleted {}: {} (removed from {} {}{})",
            kind.as_str(),
            key,
            cascaded.len(),
            cascade_noun,
            if cascaded.len() == 1 { "" } else { "s" }
        )
    }
}

fn cloned<T: Clone>(items: Vec<&T>) -> Vec<T> {
    items.into_iter().cloned().collect()
}

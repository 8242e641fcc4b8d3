use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Surrogate ID Types
// ============================================================================

// Row identifiers used inside the store only. Records are addressed by their
// natural key (name/title) everywhere else.

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "book")]
    Book,
    #[serde(rename = "character")]
    Character,
    #[serde(rename = "scene")]
    Scene,
    #[serde(rename = "chapter")]
    Chapter,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Book => "book",
            EntityKind::Character => "character",
            EntityKind::Scene => "scene",
            EntityKind::Chapter => "chapter",
        }
    }

    /// Capitalized name for status messages
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Book => "Book",
            EntityKind::Character => "Character",
            EntityKind::Scene => "Scene",
            EntityKind::Chapter => "Chapter",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Story Records
// ============================================================================

/// Book metadata. At most one exists per store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub summary: String,
    pub notes: String,
}

/// A character, identified by `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub name: String,
    pub role: String,
    pub appearance: String,
    pub personality: String,
    pub background: String,
    pub motivation: String,
    pub relationships: String,
    pub skills: String,
    pub notes: String,
    pub age: Option<u32>,
    pub gender: String,
}

impl Character {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A scene, identified by `title`.
///
/// `characters` is an ordered set of character names. `character_roles` and
/// `character_notes` are keyed by those names and never hold a key that is
/// missing from `characters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub title: String,
    pub description: String,
    pub location: String,
    pub day: String,
    pub time: String,
    pub notes: String,
    pub characters: Vec<String>,
    pub character_roles: BTreeMap<String, String>,
    pub character_notes: BTreeMap<String, String>,
}

impl Scene {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn has_character(&self, name: &str) -> bool {
        self.characters.iter().any(|c| c == name)
    }

    /// Drop a character together with its role and notes entries.
    /// Returns false if the character was not present.
    pub fn purge_character(&mut self, name: &str) -> bool {
        let before = self.characters.len();
        self.characters.retain(|c| c != name);
        self.character_roles.remove(name);
        self.character_notes.remove(name);
        self.characters.len() != before
    }
}

/// A chapter, identified by `title`. `scenes` is the narrative order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chapter {
    pub title: String,
    pub description: String,
    pub notes: String,
    pub scenes: Vec<String>,
}

impl Chapter {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn has_scene(&self, title: &str) -> bool {
        self.scenes.iter().any(|s| s == title)
    }
}

/// One row of a character's scene listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAppearance {
    pub scene_title: String,
    pub day: String,
    pub time: String,
    pub location: String,
    pub role: String,
    pub notes: String,
}

// ============================================================================
// Export Document
// ============================================================================

/// Complete snapshot of a story. Every key is always present: an absent book
/// serializes as `null` and empty collections as `[]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySnapshot {
    pub export_timestamp: String, // RFC3339
    pub book_info: Option<Book>,
    pub characters: Vec<Character>,
    pub scenes: Vec<Scene>,
    pub chapters: Vec<Chapter>,
}

// ============================================================================
// Assistant Context
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterContext {
    pub character: Character,
    pub scenes: Vec<Scene>,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneContext {
    pub scene: Scene,
    pub characters: Vec<Character>,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterContext {
    pub chapter: Chapter,
    pub scenes: Vec<Scene>, // in chapter order
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatFocus {
    Character(CharacterContext),
    Scene(SceneContext),
    Chapter(ChapterContext),
}

/// Everything the assistant sees when answering a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContext {
    pub book: Option<Book>,
    pub focus: Option<ChatFocus>,
    pub chapters: Vec<Chapter>,
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryStats {
    pub has_book: bool,
    pub characters: usize,
    pub scenes: usize,
    pub chapters: usize,
}

/// Which record a chat message is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key")]
pub enum FocusRef {
    #[serde(rename = "character")]
    Character(String),
    #[serde(rename = "scene")]
    Scene(String),
    #[serde(rename = "chapter")]
    Chapter(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub focus: Option<FocusRef>,
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDetailsRequest {
    pub role: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitlesRequest {
    pub titles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportFileRequest {
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub outline: String,
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn generate_character_id() -> CharacterId {
    CharacterId(format!("chr_{}", ulid::Ulid::new()))
}

pub fn generate_scene_id() -> SceneId {
    SceneId(format!("scn_{}", ulid::Ulid::new()))
}

pub fn generate_chapter_id() -> ChapterId {
    ChapterId(format!("chp_{}", ulid::Ulid::new()))
}

use bookwright_schemas::{
    Book, Chapter, ChapterContext, Character, CharacterContext, ChatContext, ChatFocus,
    SceneContext,
};

const DEFAULT_SCENE_ROLE: &str = "Supporting";

/// Prompt renderer for chat and drafting requests
pub struct PromptRenderer;

impl PromptRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Chat prompt: current-record context followed by the user's message
    pub fn chat_prompt(&self, context: &ChatContext, message: &str) -> String {
        format!(
            "You are a helpful writing assistant. Use the following context to help answer questions about developing this story:\n\n{}\n\nUser: {}\nAssistant: ",
            self.render_context(context),
            message.trim()
        )
    }

    /// First-draft request for a chapter from its outline and cast
    pub fn chapter_draft_prompt(&self, title: &str, outline: &str, characters: &[Character]) -> String {
        let mut prompt = format!("Write the first draft of a book chapter titled '{}'.\n\n", title);
        prompt.push_str(&format!("Chapter Outline:\n{}\n\n", outline.trim()));

        if !characters.is_empty() {
            prompt.push_str("Main Characters involved:\n");
            for character in characters {
                prompt.push_str(&format!("\n{}:\n", character.name));
                let mut lines = Vec::new();
                push_field(&mut lines, "- Role", &character.role);
                push_field(&mut lines, "- Background", &character.background);
                push_field(&mut lines, "- Appearance", &character.appearance);
                push_field(&mut lines, "- Personality", &character.personality);
                push_field(&mut lines, "- Motivation", &character.motivation);
                for line in lines {
                    prompt.push_str(&line);
                    prompt.push('\n');
                }
            }
        }

        prompt.push_str(
            "\nPlease write in an engaging, vivid style with natural dialogue and action beats.",
        );
        prompt
    }

    /// Render the context block shared by every chat prompt
    pub fn render_context(&self, context: &ChatContext) -> String {
        let mut sections = Vec::new();

        if let Some(ref book) = context.book {
            sections.push(self.render_book(book));
        }

        match context.focus {
            Some(ChatFocus::Character(ref focus)) => sections.push(self.render_character(focus)),
            Some(ChatFocus::Scene(ref focus)) => sections.push(self.render_scene(focus)),
            Some(ChatFocus::Chapter(ref focus)) => sections.push(self.render_chapter(focus)),
            None => {}
        }

        if !context.chapters.is_empty() {
            sections.push(self.render_chapter_list(&context.chapters));
        }

        if sections.is_empty() {
            return "No story details have been recorded yet.".to_string();
        }

        sections.join("\n\n")
    }

    fn render_book(&self, book: &Book) -> String {
        let mut lines = Vec::new();
        push_field(&mut lines, "Book", &book.title);
        push_field(&mut lines, "Author", &book.author);
        push_field(&mut lines, "Genre", &book.genre);
        push_field(&mut lines, "Summary", &book.summary);
        lines.join("\n")
    }

    fn render_character(&self, focus: &CharacterContext) -> String {
        let character = &focus.character;
        let mut lines = vec![format!("Current Character: {}", character.name)];
        push_field(&mut lines, "Role", &character.role);
        if let Some(age) = character.age {
            lines.push(format!("Age: {}", age));
        }
        push_field(&mut lines, "Gender", &character.gender);
        push_field(&mut lines, "Appearance", &character.appearance);
        push_field(&mut lines, "Personality", &character.personality);
        push_field(&mut lines, "Background", &character.background);
        push_field(&mut lines, "Motivation", &character.motivation);
        push_field(&mut lines, "Relationships", &character.relationships);
        push_field(&mut lines, "Skills", &character.skills);
        push_field(&mut lines, "Notes", &character.notes);

        if !focus.scenes.is_empty() {
            lines.push(String::new());
            lines.push("Appears in Scenes:".to_string());
            for scene in &focus.scenes {
                let role = scene
                    .character_roles
                    .get(&character.name)
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_SCENE_ROLE);
                lines.push(format!("- {} ({}): {}", scene.title, role, scene.description));
            }
        }

        if !focus.chapters.is_empty() {
            let titles: Vec<&str> = focus.chapters.iter().map(|c| c.title.as_str()).collect();
            lines.push(format!("Chapters: {}", titles.join(", ")));
        }

        lines.join("\n")
    }

    fn render_scene(&self, focus: &SceneContext) -> String {
        let scene = &focus.scene;
        let mut lines = vec![format!("Current Scene: {}", scene.title)];
        push_field(&mut lines, "Description", &scene.description);
        push_field(&mut lines, "Location", &scene.location);
        let when: Vec<&str> = [scene.day.as_str(), scene.time.as_str()]
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .collect();
        if !when.is_empty() {
            lines.push(format!("When: {}", when.join(", ")));
        }
        push_field(&mut lines, "Notes", &scene.notes);

        if !focus.characters.is_empty() {
            lines.push(String::new());
            lines.push("Characters Present:".to_string());
            for character in &focus.characters {
                let role = scene
                    .character_roles
                    .get(&character.name)
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_SCENE_ROLE);
                let mut line = format!("- {} ({})", character.name, role);
                if let Some(notes) = scene.character_notes.get(&character.name) {
                    if !notes.trim().is_empty() {
                        line.push_str(&format!(": {}", notes.trim()));
                    }
                }
                lines.push(line);
            }
        }

        if !focus.chapters.is_empty() {
            let titles: Vec<&str> = focus.chapters.iter().map(|c| c.title.as_str()).collect();
            lines.push(format!("In Chapters: {}", titles.join(", ")));
        }

        lines.join("\n")
    }

    fn render_chapter(&self, focus: &ChapterContext) -> String {
        let chapter = &focus.chapter;
        let mut lines = vec![format!("Current Chapter: {}", chapter.title)];
        push_field(&mut lines, "Description", &chapter.description);
        push_field(&mut lines, "Notes", &chapter.notes);

        if !focus.scenes.is_empty() {
            lines.push(String::new());
            lines.push("Assigned Scenes:".to_string());
            for scene in &focus.scenes {
                lines.push(format!("- {}: {}", scene.title, scene.location));
            }
        }

        lines.join("\n")
    }

    fn render_chapter_list(&self, chapters: &[Chapter]) -> String {
        let mut lines = vec!["All Chapters:".to_string()];
        for chapter in chapters {
            lines.push(format!("- {}: {}", chapter.title, chapter.description));
        }
        lines.join("\n")
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn push_field(lines: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        lines.push(format!("{}: {}", label, value));
    }
}

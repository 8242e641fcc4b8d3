pub mod client;
pub mod prompts;

pub use client::{AssistantConfig, GenerateOptions, OllamaClient, TextGenerator};
pub use prompts::PromptRenderer;

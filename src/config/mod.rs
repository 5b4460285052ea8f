//! Configuration module for ragtube.
//!
//! Handles loading and validating application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RagPrompts};
pub use settings::{
    ChunkingSettings, EmbeddingProvider, EmbeddingSettings, GeneralSettings, IndexSettings,
    PromptSettings, RagSettings, RetrievalSettings, Settings, StoreSettings, SyncSettings,
    YoutubeSettings, YOUTUBE_API_KEY_ENV,
};

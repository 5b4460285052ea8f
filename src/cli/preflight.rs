//! Pre-flight checks before expensive operations.
//!
//! Validates that required credentials are available before starting
//! operations that would otherwise fail midway.

use crate::config::{EmbeddingProvider, Settings, YOUTUBE_API_KEY_ENV};
use crate::error::{RagtubeError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Sync needs the YouTube key and, for remote embeddings, the OpenAI key.
    Sync,
    /// Answering needs the OpenAI key unless the chat server is local.
    Ask,
    /// Search needs the OpenAI key only for remote query embeddings.
    Search,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    let remote_embeddings = settings.embedding.provider == EmbeddingProvider::OpenAI
        && settings.embedding.api_base.is_none();

    match operation {
        Operation::Sync => {
            if settings.youtube.resolved_api_key().is_none() {
                return Err(RagtubeError::ConfigInvalid(format!(
                    "{} not set. Set it with: export {}='...' or youtube.api_key in the config",
                    YOUTUBE_API_KEY_ENV, YOUTUBE_API_KEY_ENV
                )));
            }
            if remote_embeddings {
                check_openai_key()?;
            }
        }
        Operation::Ask => {
            if remote_embeddings || settings.rag.api_base.is_none() {
                check_openai_key()?;
            }
        }
        Operation::Search => {
            if remote_embeddings {
                check_openai_key()?;
            }
        }
    }
    Ok(())
}

fn check_openai_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(RagtubeError::ConfigInvalid(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(RagtubeError::ConfigInvalid(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

//! Error types for ragtube.

use thiserror::Error;

/// Library-level error type for ragtube operations.
#[derive(Error, Debug)]
pub enum RagtubeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Timed out after {seconds}s: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Transcript unavailable for video {0}")]
    TranscriptUnavailable(String),

    #[error("No videos found for channel {0}")]
    NoVideosFound(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Re-ranking failed: {0}")]
    Rerank(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for RagtubeError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RagtubeError::ConstraintViolation(
                    message.clone().unwrap_or_else(|| code.to_string()),
                )
            }
            _ => RagtubeError::Database(err),
        }
    }
}

impl RagtubeError {
    /// Whether this error is recovered per item during a sync rather than
    /// aborting the run.
    pub fn is_item_recoverable(&self) -> bool {
        matches!(
            self,
            RagtubeError::Timeout { .. }
                | RagtubeError::TranscriptUnavailable(_)
                | RagtubeError::Upstream(_)
                | RagtubeError::Http(_)
        )
    }
}

/// Result type alias for ragtube operations.
pub type Result<T> = std::result::Result<T, RagtubeError>;

//! Configuration settings for ragtube.

use crate::error::{RagtubeError, Result};
use crate::index::{DistanceMetric, IndexParams};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides `youtube.api_key`.
pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub youtube: YoutubeSettings,
    pub sync: SyncSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub rag: RagSettings,
    pub store: StoreSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data (database, model cache).
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.ragtube".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Transcript provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// YouTube Data API key. `YOUTUBE_API_KEY` takes precedence when set.
    pub api_key: Option<String>,
    /// Base URL of the Data API.
    pub api_base_url: String,
    /// Base URL for watch pages (caption track discovery).
    pub watch_base_url: String,
    /// Optional HTTPS proxy for every provider request.
    pub https_proxy: Option<String>,
    /// Hard timeout for each provider call, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            watch_base_url: "https://www.youtube.com".to_string(),
            https_proxy: None,
            request_timeout_seconds: 60,
        }
    }
}

impl YoutubeSettings {
    /// Resolve the API key, preferring the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(YOUTUBE_API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.is_empty()))
    }
}

/// Transcript sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Channels synced when none are given on the command line.
    pub channel_ids: Vec<String>,
    /// Caption language code.
    pub language: String,
    /// Maximum concurrent caption fetches within one channel.
    pub max_concurrent_fetches: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            language: "en".to_string(),
            max_concurrent_fetches: 4,
        }
    }
}

/// Content chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Tokens per chunk.
    pub chunk_size: usize,
    /// Tokens shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Path to a `tokenizer.json`, or a Hugging Face Hub model ID to fetch
    /// one from.
    pub tokenizer: String,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            tokenizer: "Xenova/gpt-4".to_string(),
        }
    }
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible embeddings endpoint.
    #[default]
    OpenAI,
    /// In-process fastembed model.
    Local,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAI),
            "local" | "fastembed" => Ok(EmbeddingProvider::Local),
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::OpenAI => write!(f, "openai"),
            EmbeddingProvider::Local => write!(f, "local"),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Embedding model name.
    pub model: String,
    /// System-wide embedding dimensionality.
    pub dimensions: usize,
    /// Override for OpenAI-compatible servers (e.g. a local Ollama).
    pub api_base: Option<String>,
    /// Texts sent per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAI,
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            api_base: None,
            batch_size: 64,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Name the index is stored under.
    pub name: String,
    /// Distance metric (l1, l2, cosine).
    pub metric: String,
    /// Graph degree.
    pub m: usize,
    /// Candidate width while building.
    pub ef_construction: usize,
    /// Candidate width while searching.
    pub ef_search: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "chunk_index".to_string(),
            metric: "l2".to_string(),
            m: 16,
            ef_construction: 64,
            ef_search: 40,
        }
    }
}

/// Retrieval and re-ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates fetched from the vector index.
    pub results_to_retrieve: usize,
    /// Run the cross-encoder pass over the candidates.
    pub rerank_enabled: bool,
    /// Cross-encoder model name.
    pub rerank_model: String,
    /// Chunks kept after re-ranking.
    pub rerank_top_n: usize,
    /// Chunks scoring below this are dropped.
    pub rerank_score_threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            results_to_retrieve: 10,
            rerank_enabled: true,
            rerank_model: "bge-reranker-base".to_string(),
            rerank_top_n: 5,
            rerank_score_threshold: 0.1,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Chat model used to answer.
    pub model: String,
    /// Override for OpenAI-compatible servers.
    pub api_base: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}

/// Corpus store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.ragtube/corpus.db".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// The loaded settings are validated before being returned.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations that would corrupt the corpus or the index.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(RagtubeError::ConfigInvalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if chunking.tokenizer.trim().is_empty() {
            return Err(RagtubeError::ConfigInvalid(
                "chunking.tokenizer must name a tokenizer file or model".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.youtube.request_timeout_seconds == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "youtube.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.sync.max_concurrent_fetches == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "sync.max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }
        if self.retrieval.results_to_retrieve == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "retrieval.results_to_retrieve must be greater than 0".to_string(),
            ));
        }
        if self.retrieval.rerank_enabled && self.retrieval.rerank_top_n == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "retrieval.rerank_top_n must be greater than 0".to_string(),
            ));
        }

        self.index_params()?.validate()
    }

    /// Parsed index parameters.
    pub fn index_params(&self) -> Result<IndexParams> {
        let metric: DistanceMetric = self
            .index
            .metric
            .parse()
            .map_err(RagtubeError::ConfigInvalid)?;

        Ok(IndexParams {
            name: self.index.name.clone(),
            metric,
            m: self.index.m,
            ef_construction: self.index.ef_construction,
            ef_search: self.index.ef_search,
        })
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RagtubeError::ConfigInvalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ragtube")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Directory where local models are cached.
    pub fn model_cache_dir(&self) -> PathBuf {
        self.data_dir().join("models")
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut settings = Settings::default();
        settings.chunking.chunk_size = 25;
        settings.chunking.chunk_overlap = 25;
        assert!(matches!(
            settings.validate(),
            Err(RagtubeError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_blank_tokenizer_rejected() {
        let mut settings = Settings::default();
        settings.chunking.tokenizer = "  ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(RagtubeError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let mut settings = Settings::default();
        settings.index.metric = "hamming".to_string();
        assert!(matches!(
            settings.validate(),
            Err(RagtubeError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [sync]
            channel_ids = ["UC34rhn8Um7R18-BHjPklYlw"]

            [chunking]
            chunk_size = 25
            chunk_overlap = 5

            [index]
            metric = "cosine"
            "#,
        )
        .unwrap();

        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.sync.channel_ids.len(), 1);
        assert_eq!(settings.sync.language, "en");
        assert_eq!(settings.chunking.chunk_size, 25);
        assert_eq!(settings.index_params().unwrap().metric, DistanceMetric::Cosine);
    }

    #[test]
    fn test_invalid_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chunking]\nchunk_size = 10\nchunk_overlap = 20\n").unwrap();

        assert!(matches!(
            Settings::load_from(Some(&path)),
            Err(RagtubeError::ConfigInvalid(_))
        ));
    }
}

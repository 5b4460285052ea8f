//! In-process embeddings with fastembed.

use super::Embedder;
use crate::error::{RagtubeError, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

/// Embedder running a BGE-family model locally.
///
/// fastembed needs `&mut self` to embed, so the model sits behind a mutex
/// and runs on the blocking pool.
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbedder {
    /// Load (downloading on first use) the named model into `cache_dir`.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self> {
        let model_enum = parse_model_name(model_name)?;
        std::fs::create_dir_all(&cache_dir)?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| RagtubeError::Embedding(format!("Model initialization failed: {}", e)))?;

        let dimensions = model
            .embed(vec!["test"], None)
            .map_err(|e| RagtubeError::Embedding(format!("Failed to probe dimensions: {}", e)))?
            .first()
            .map(|v| v.len())
            .ok_or_else(|| RagtubeError::Embedding("Model returned no embedding".to_string()))?;

        info!("Loaded embedding model {} ({} dimensions)", model_name, dimensions);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagtubeError::Embedding("No embedding returned".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|e| {
                RagtubeError::Embedding(format!("Failed to acquire model lock: {}", e))
            })?;
            model
                .embed(texts, None)
                .map_err(|e| RagtubeError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| RagtubeError::Embedding(format!("Embedding task failed: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Map a model name to the fastembed model.
pub fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "bge-small-en-v1.5" | "bgesmallenv15" | "baai/bge-small-en-v1.5" => {
            Ok(fastembed::EmbeddingModel::BGESmallENV15)
        }
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" | "baai/bge-base-en-v1.5" => {
            Ok(fastembed::EmbeddingModel::BGEBaseENV15)
        }
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" | "baai/bge-large-en-v1.5" => {
            Ok(fastembed::EmbeddingModel::BGELargeENV15)
        }
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        _ => Err(RagtubeError::ConfigInvalid(format!(
            "Unknown local embedding model: {}. Supported models: bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, all-MiniLM-L6-v2 (add -q suffix for quantized bge-small/base)",
            name
        ))),
    }
}

//! Embedding generation for chunks and queries.

mod local;
mod openai;

pub use local::LocalEmbedder;
pub use openai::OpenAIEmbedder;

use crate::config::{EmbeddingProvider, Settings};
use crate::error::{RagtubeError, Result};
use crate::store::{Chunk, CorpusStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Create the configured embedder.
pub async fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.embedding.provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAIEmbedder::new(&settings.embedding)?),
        EmbeddingProvider::Local => {
            let model = settings.embedding.model.clone();
            let cache_dir = settings.model_cache_dir();
            let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::new(&model, cache_dir))
                .await
                .map_err(|e| RagtubeError::Embedding(format!("Model loading failed: {}", e)))??;
            Arc::new(embedder)
        }
    };

    if embedder.dimensions() != settings.embedding.dimensions {
        return Err(RagtubeError::ConfigInvalid(format!(
            "embedding model {} produces {} dimensions, embedding.dimensions is {}",
            settings.embedding.model,
            embedder.dimensions(),
            settings.embedding.dimensions
        )));
    }
    Ok(embedder)
}

/// Computes embeddings for every chunk that lacks one.
pub struct EmbeddingTask {
    store: Arc<CorpusStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl EmbeddingTask {
    /// Fails when the embedder's width differs from the store's.
    pub fn new(store: Arc<CorpusStore>, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(RagtubeError::ConfigInvalid(format!(
                "embedder produces {} dimensions, store holds {}",
                embedder.dimensions(),
                store.dimensions()
            )));
        }
        Ok(Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
        })
    }

    pub fn missing_chunks(&self) -> Result<Vec<Chunk>> {
        self.store.chunks_missing_embedding()
    }

    /// Embed every pending chunk and write the results in one transaction.
    /// Returns the number of chunks embedded.
    #[instrument(skip(self))]
    pub async fn launch(&self) -> Result<usize> {
        let chunks = self.missing_chunks()?;
        if chunks.is_empty() {
            debug!("No chunks need embeddings");
            return Ok(0);
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagtubeError::Embedding(format!(
                    "requested {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(batch.iter().map(|c| c.id).zip(vectors));
            debug!("Embedded {}/{} chunks", embeddings.len(), chunks.len());
        }

        let written = self.store.write_embeddings(&embeddings)?;
        info!("Embedded {} chunks", written);
        Ok(written)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{Caption, Channel, Video};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder returning fixed vectors per text, or a hash-derived one.
    pub struct FakeEmbedder {
        pub dimensions: usize,
        pub fixed: HashMap<String, Vec<f32>>,
        pub calls: AtomicUsize,
    }

    impl FakeEmbedder {
        pub fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                fixed: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.fixed.insert(text.to_string(), vector);
            self
        }

        fn vector_for(&self, text: &str) -> Vec<f32> {
            if let Some(v) = self.fixed.get(text) {
                return v.clone();
            }
            let seed = text.bytes().fold(7u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
            (0..self.dimensions)
                .map(|i| ((seed.wrapping_add(i as u32 * 97) % 1000) as f32) / 1000.0)
                .collect()
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector_for(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

    fn store_with_chunks(n: usize) -> Arc<CorpusStore> {
        let store = Arc::new(CorpusStore::in_memory(3).unwrap());
        store.insert_channel_if_absent(&Channel::new("UC1", "one")).unwrap();
        let mut video = Video::new("v1", "t", Utc::now(), "UC1");
        video.content = Some("x".to_string());
        store
            .insert_transcribed_video(&video, &[Caption::new("x", 0.0, 1.0, "v1")])
            .unwrap();
        let contents: Vec<String> = (0..n).map(|i| format!("chunk {}", i)).collect();
        store.insert_chunks("v1", &contents).unwrap();
        store
    }

    #[tokio::test]
    async fn test_launch_embeds_everything_once() {
        let store = store_with_chunks(5);
        let embedder = Arc::new(FakeEmbedder::new(3));
        let task = EmbeddingTask::new(store.clone(), embedder.clone(), 2).unwrap();

        assert_eq!(task.launch().await.unwrap(), 5);
        assert!(task.missing_chunks().unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

        assert_eq!(task.launch().await.unwrap(), 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_loudly() {
        let store = store_with_chunks(1);
        assert!(matches!(
            EmbeddingTask::new(store.clone(), Arc::new(FakeEmbedder::new(4)), 8),
            Err(RagtubeError::ConfigInvalid(_))
        ));
        assert_eq!(store.chunks_missing_embedding().unwrap().len(), 1);
    }

    /// Claims one width, returns another.
    struct LyingEmbedder;

    #[async_trait]
    impl Embedder for LyingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 2])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 2]).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn test_wrong_vectors_are_not_written() {
        let store = store_with_chunks(2);
        let task = EmbeddingTask::new(store.clone(), Arc::new(LyingEmbedder), 8).unwrap();

        assert!(matches!(
            task.launch().await,
            Err(RagtubeError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert_eq!(store.chunks_missing_embedding().unwrap().len(), 2);
    }
}

//! Pipeline orchestrator for ragtube.
//!
//! Runs the ingestion stages in order (transcript sync, chunking, embedding,
//! index build) and assembles the query-side components from settings.

use crate::chunking::{load_tokenizer, ChunkTask};
use crate::config::{Prompts, Settings};
use crate::embedding::{create_embedder, Embedder, EmbeddingTask};
use crate::error::{RagtubeError, Result};
use crate::index::{build_index, load_index, refresh_index, BuildOutcome};
use crate::rag::{OpenAIGenerator, RagEngine};
use crate::retrieval::{FastembedReranker, RerankStage, Retriever};
use crate::store::CorpusStore;
use crate::transcript::{ChannelSync, TranscriptProvider, TranscriptSync, YoutubeProvider};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::{info, instrument};

/// What happened to the vector index at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    /// The index did not exist and was built over this many chunks.
    Built(usize),
    /// The index existed and this many chunks were added to it.
    Refreshed(usize),
}

/// Result of a full ingestion run.
#[derive(Debug)]
pub struct PipelineReport {
    pub channels: Vec<ChannelSync>,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    pub index: IndexUpdate,
}

impl PipelineReport {
    /// Channels whose sync failed.
    pub fn failed_channels(&self) -> impl Iterator<Item = &ChannelSync> {
        self.channels.iter().filter(|c| c.result.is_err())
    }
}

/// The main orchestrator for the ragtube pipeline.
pub struct Pipeline {
    settings: Settings,
    store: Arc<CorpusStore>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Option<Arc<Tokenizer>>,
}

impl Pipeline {
    /// Open the configured store and embedder. Settings are validated first
    /// so a bad configuration fails before any I/O.
    pub async fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let store = Arc::new(CorpusStore::new(
            &settings.sqlite_path(),
            settings.embedding.dimensions,
        )?);
        let embedder = create_embedder(&settings).await?;

        Ok(Self {
            settings,
            store,
            embedder,
            tokenizer: None,
        })
    }

    /// Create a pipeline with custom components.
    pub fn with_components(
        settings: Settings,
        store: Arc<CorpusStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            settings,
            store,
            embedder,
            tokenizer: None,
        }
    }

    /// Chunk with `tokenizer` instead of loading the configured one.
    pub fn with_tokenizer(mut self, tokenizer: Arc<Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn store(&self) -> Arc<CorpusStore> {
        self.store.clone()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The supplied chunking tokenizer, or the configured one.
    async fn tokenizer(&self) -> Result<Arc<Tokenizer>> {
        if let Some(tokenizer) = &self.tokenizer {
            return Ok(tokenizer.clone());
        }
        let source = self.settings.chunking.tokenizer.clone();
        let tokenizer = tokio::task::spawn_blocking(move || load_tokenizer(&source))
            .await
            .map_err(|e| RagtubeError::Tokenizer(format!("Tokenizer loading failed: {}", e)))??;
        Ok(Arc::new(tokenizer))
    }

    /// The YouTube provider built from settings.
    pub fn youtube_provider(&self) -> Result<Arc<dyn TranscriptProvider>> {
        Ok(Arc::new(YoutubeProvider::new(&self.settings.youtube)?))
    }

    /// Run every stage to completion, in order. Channel failures are
    /// reported, not propagated; failures of later stages are.
    #[instrument(skip(self, provider))]
    pub async fn run(
        &self,
        provider: Arc<dyn TranscriptProvider>,
        channel_ids: &[String],
    ) -> Result<PipelineReport> {
        let sync = TranscriptSync::new(self.store.clone(), provider, &self.settings);
        let channels = sync.sync_channels(channel_ids).await;

        let tokenizer = self.tokenizer().await?;
        let chunks_created =
            ChunkTask::new(self.store.clone(), tokenizer, &self.settings.chunking)?.launch()?;

        let chunks_embedded = EmbeddingTask::new(
            self.store.clone(),
            self.embedder.clone(),
            self.settings.embedding.batch_size,
        )?
        .launch()
        .await?;

        let index = self.update_index()?;

        info!(
            "Pipeline finished: {} chunks created, {} embedded, index {:?}",
            chunks_created, chunks_embedded, index
        );
        Ok(PipelineReport {
            channels,
            chunks_created,
            chunks_embedded,
            index,
        })
    }

    /// Build the configured index, or refresh it when it already exists.
    pub fn update_index(&self) -> Result<IndexUpdate> {
        let params = self.settings.index_params()?;
        match build_index(&self.store, &params)? {
            BuildOutcome::Created { indexed } => Ok(IndexUpdate::Built(indexed)),
            BuildOutcome::AlreadyExists => {
                Ok(IndexUpdate::Refreshed(refresh_index(&self.store, &params.name)?))
            }
        }
    }

    /// A retriever over the persisted index, or an exact scan when no index
    /// has been built.
    pub fn build_retriever(&self) -> Result<Retriever> {
        let params = self.settings.index_params()?;
        let retriever = Retriever::new(
            self.store.clone(),
            self.embedder.clone(),
            &params,
            self.settings.retrieval.results_to_retrieve,
        );

        Ok(match load_index(&self.store, &params.name)? {
            Some(graph) => retriever.with_index(graph),
            None => retriever,
        })
    }

    /// The answering engine: retriever, optional re-ranker, chat model and
    /// prompts from settings.
    pub async fn build_rag_engine(&self) -> Result<RagEngine> {
        let prompts = Prompts::load(
            self.settings.prompts.custom_dir.as_deref(),
            Some(&self.settings.prompts.variables),
        )?;
        let generator = Arc::new(OpenAIGenerator::new(&self.settings.rag)?);
        let engine = RagEngine::new(self.build_retriever()?, generator).with_prompts(prompts);

        if !self.settings.retrieval.rerank_enabled {
            return Ok(engine);
        }

        let model = self.settings.retrieval.rerank_model.clone();
        let cache_dir = self.settings.model_cache_dir();
        let reranker = tokio::task::spawn_blocking(move || FastembedReranker::new(&model, cache_dir))
            .await
            .map_err(|e| RagtubeError::Rerank(format!("Model loading failed: {}", e)))??;

        Ok(engine.with_rerank(RerankStage::from_settings(
            Arc::new(reranker),
            &self.settings.retrieval,
        )))
    }
}

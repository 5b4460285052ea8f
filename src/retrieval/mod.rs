//! Retrieval of the chunks closest to a query.
//!
//! Uses the persisted HNSW graph when one is loaded, falling back to an
//! exact scan of the stored embeddings.

mod rerank;

pub use rerank::{apply_rerank_scores, sigmoid, FastembedReranker, RerankStage, Reranker};

use crate::embedding::Embedder;
use crate::error::{RagtubeError, Result};
use crate::index::{sync_graph, DistanceMetric, HnswGraph, IndexParams};
use crate::store::{watch_url, CorpusStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument, warn};

/// A retrieved chunk with its parent video's presentation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    pub chunk_id: i64,
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub publish_time: DateTime<Utc>,
    pub content: String,
    /// Distance for l1/l2, similarity for cosine; relevance after re-ranking.
    pub score: f32,
}

impl ScoredChunk {
    pub fn url(&self) -> String {
        watch_url(&self.video_id)
    }
}

/// Nearest-neighbour retriever over chunk embeddings.
pub struct Retriever {
    store: Arc<CorpusStore>,
    embedder: Arc<dyn Embedder>,
    metric: DistanceMetric,
    results_to_retrieve: usize,
    ef_search: usize,
    index: Option<RwLock<HnswGraph>>,
}

impl Retriever {
    /// Retriever ranking by the metric and search width of `params`.
    pub fn new(
        store: Arc<CorpusStore>,
        embedder: Arc<dyn Embedder>,
        params: &IndexParams,
        results_to_retrieve: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            metric: params.metric,
            results_to_retrieve,
            ef_search: params.ef_search,
            index: None,
        }
    }

    /// Search through `graph` instead of scanning. Ignored when the graph was
    /// built for another metric.
    pub fn with_index(mut self, graph: HnswGraph) -> Self {
        if graph.metric() == self.metric {
            self.index = Some(RwLock::new(graph));
        } else {
            warn!(
                "Index was built for {} but retrieval uses {}, scanning instead",
                graph.metric(),
                self.metric
            );
        }
        self
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// The `results_to_retrieve` chunks closest to `query`, optionally
    /// restricted to one channel.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, query: &str, channel_id: Option<&str>) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;
        self.retrieve_by_embedding(&embedding, channel_id)
    }

    /// Like [`Retriever::retrieve`] for an already embedded query.
    pub fn retrieve_by_embedding(
        &self,
        embedding: &[f32],
        channel_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        if embedding.len() != self.store.dimensions() {
            return Err(RagtubeError::DimensionMismatch {
                expected: self.store.dimensions(),
                got: embedding.len(),
            });
        }

        let k = self.results_to_retrieve;
        let Some(graph) = &self.index else {
            return self.with_context(self.exact_scan(embedding, channel_id)?);
        };

        let reachable = self.store.embedded_chunk_count(channel_id)?.min(k);
        let results = self.with_context(self.search_graph(graph, embedding, channel_id)?)?;
        if results.len() >= reachable {
            return Ok(results);
        }

        debug!(
            "Graph search found {} of {} reachable chunks, scanning instead",
            results.len(),
            reachable
        );
        self.with_context(self.exact_scan(embedding, channel_id)?)
    }

    /// Join ranked chunk IDs with their video metadata. Chunks deleted since
    /// ranking are dropped.
    fn with_context(&self, ranked: Vec<(i64, f32)>) -> Result<Vec<ScoredChunk>> {
        let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
        let mut contexts = self.store.chunk_contexts(&ids)?;

        let results: Vec<ScoredChunk> = ranked
            .into_iter()
            .filter_map(|(id, distance)| {
                contexts.remove(&id).map(|ctx| ScoredChunk {
                    chunk_id: ctx.chunk_id,
                    video_id: ctx.video_id,
                    channel_id: ctx.channel_id,
                    title: ctx.title,
                    publish_time: ctx.publish_time,
                    content: ctx.content,
                    score: self.metric.score(distance),
                })
            })
            .collect();
        debug!("{} of {} requested chunks found", results.len(), self.results_to_retrieve);
        Ok(results)
    }

    fn search_graph(
        &self,
        graph: &RwLock<HnswGraph>,
        embedding: &[f32],
        channel_id: Option<&str>,
    ) -> Result<Vec<(i64, f32)>> {
        self.sync_index(graph)?;

        let allowed = channel_id
            .map(|id| self.store.embedded_chunk_ids_for_channel(id))
            .transpose()?;
        let graph = graph.read().map_err(lock_error)?;
        Ok(graph.search(embedding, self.results_to_retrieve, self.ef_search, allowed.as_ref()))
    }

    /// Catch the loaded graph up with chunks embedded or deleted since it
    /// was loaded.
    fn sync_index(&self, graph: &RwLock<HnswGraph>) -> Result<()> {
        let embedded = self.store.embedded_chunk_count(None)?;
        if graph.read().map_err(lock_error)?.len() == embedded {
            return Ok(());
        }

        let mut graph = graph.write().map_err(lock_error)?;
        if graph.len() != embedded {
            let (added, rebuilt) = sync_graph(&self.store, &mut graph)?;
            debug!("Index caught up with the store: {} added, rebuilt: {}", added, rebuilt);
        }
        Ok(())
    }

    /// Exact ranking; ties keep row order.
    fn exact_scan(&self, embedding: &[f32], channel_id: Option<&str>) -> Result<Vec<(i64, f32)>> {
        let mut ranked: Vec<(i64, f32)> = self
            .store
            .embedded_vectors(channel_id)?
            .into_iter()
            .map(|(id, vector)| (id, self.metric.distance(embedding, &vector)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(self.results_to_retrieve);
        Ok(ranked)
    }
}

fn lock_error<T>(e: PoisonError<T>) -> RagtubeError {
    RagtubeError::Index(format!("Failed to acquire index lock: {}", e))
}

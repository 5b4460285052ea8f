//! Cross-encoder re-ranking of retrieved chunks.

use super::ScoredChunk;
use crate::config::RetrievalSettings;
use crate::error::{RagtubeError, Result};
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// Relevance model scoring (query, document) pairs.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score in `[0, 1]` per document, in input order.
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Cross-encoder running in-process with fastembed.
pub struct FastembedReranker {
    model: Arc<Mutex<TextRerank>>,
}

impl FastembedReranker {
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self> {
        let model_enum = parse_model_name(model_name)?;
        std::fs::create_dir_all(&cache_dir)?;

        let options = RerankInitOptions::new(model_enum)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);
        let model = TextRerank::try_new(options)
            .map_err(|e| RagtubeError::Rerank(format!("Model initialization failed: {}", e)))?;

        info!("Loaded re-ranking model {}", model_name);
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl Reranker for FastembedReranker {
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.clone();
        let query = query.to_string();
        let documents = documents.to_vec();
        let count = documents.len();

        let results = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| RagtubeError::Rerank(format!("Failed to acquire model lock: {}", e)))?;
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), docs, false, None)
                .map_err(|e| RagtubeError::Rerank(e.to_string()))
        })
        .await
        .map_err(|e| RagtubeError::Rerank(format!("Re-ranking task failed: {}", e)))??;

        // Results come back sorted by score; restore input order.
        let mut scores = vec![0.0; count];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = sigmoid(result.score);
            }
        }
        Ok(scores)
    }
}

fn parse_model_name(name: &str) -> Result<RerankerModel> {
    match name.to_lowercase().as_str() {
        "bge-reranker-base" | "baai/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" | "jinaai/jina-reranker-v1-turbo-en" => {
            Ok(RerankerModel::JINARerankerV1TurboEn)
        }
        _ => Err(RagtubeError::ConfigInvalid(format!(
            "Unknown re-ranking model: {}. Supported models: bge-reranker-base, bge-reranker-v2-m3, jina-reranker-v1-turbo-en",
            name
        ))),
    }
}

/// Re-score candidates, sort by relevance, drop those under `threshold` and
/// keep at most `top_n`.
pub fn apply_rerank_scores(
    candidates: Vec<ScoredChunk>,
    scores: &[f32],
    top_n: usize,
    threshold: f32,
) -> Vec<ScoredChunk> {
    let mut rescored: Vec<ScoredChunk> = candidates
        .into_iter()
        .zip(scores)
        .map(|(mut chunk, &score)| {
            chunk.score = score;
            chunk
        })
        .collect();

    rescored.sort_by(|a, b| b.score.total_cmp(&a.score));
    rescored
        .into_iter()
        .filter(|c| c.score >= threshold)
        .take(top_n)
        .collect()
}

/// Precision pass applied to the retriever's over-fetched candidates.
pub struct RerankStage {
    reranker: Arc<dyn Reranker>,
    top_n: usize,
    score_threshold: f32,
}

impl RerankStage {
    pub fn new(reranker: Arc<dyn Reranker>, top_n: usize, score_threshold: f32) -> Self {
        Self {
            reranker,
            top_n,
            score_threshold,
        }
    }

    pub fn from_settings(reranker: Arc<dyn Reranker>, settings: &RetrievalSettings) -> Self {
        Self::new(reranker, settings.rerank_top_n, settings.rerank_score_threshold)
    }

    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scores = self.reranker.score(query, &documents).await?;
        if scores.len() != candidates.len() {
            return Err(RagtubeError::Rerank(format!(
                "scored {} of {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let kept = apply_rerank_scores(candidates, &scores, self.top_n, self.score_threshold);
        debug!("Kept {} candidates after re-ranking", kept.len());
        Ok(kept)
    }
}

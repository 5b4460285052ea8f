//! Approximate nearest-neighbour index over chunk embeddings.
//!
//! Index definitions and their HNSW graphs are persisted in the corpus store
//! under a name. Building is checked-first, dropping is idempotent.

mod hnsw;

pub use hnsw::HnswGraph;

use crate::error::{RagtubeError, Result};
use crate::store::{CorpusStore, IndexRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Distance function between embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    L1,
    L2,
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors; lower is closer for every metric.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L1 => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }

    /// Score reported to callers: the raw distance for l1/l2, the cosine
    /// similarity for cosine.
    pub fn score(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            _ => distance,
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l1" => Ok(DistanceMetric::L1),
            "l2" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            _ => Err(format!("Unknown distance metric: {} (expected l1, l2 or cosine)", s)),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::L1 => write!(f, "l1"),
            DistanceMetric::L2 => write!(f, "l2"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Parameters of a named index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub name: String,
    pub metric: DistanceMetric,
    /// Graph degree.
    pub m: usize,
    /// Candidate width while building.
    pub ef_construction: usize,
    /// Candidate width while searching.
    pub ef_search: usize,
}

impl IndexParams {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RagtubeError::ConfigInvalid("index.name must not be empty".to_string()));
        }
        if self.m < 2 {
            return Err(RagtubeError::ConfigInvalid(format!(
                "index.m must be at least 2, got {}",
                self.m
            )));
        }
        if self.ef_construction < self.m {
            return Err(RagtubeError::ConfigInvalid(format!(
                "index.ef_construction ({}) must be at least index.m ({})",
                self.ef_construction, self.m
            )));
        }
        if self.ef_search == 0 {
            return Err(RagtubeError::ConfigInvalid(
                "index.ef_search must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of [`build_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Created { indexed: usize },
    AlreadyExists,
}

/// Create the named index unless it already exists.
#[instrument(skip(store, params), fields(name = %params.name, metric = %params.metric))]
pub fn build_index(store: &CorpusStore, params: &IndexParams) -> Result<BuildOutcome> {
    params.validate()?;

    if store.get_index_record(&params.name)?.is_some() {
        info!("Index {} already exists", params.name);
        return Ok(BuildOutcome::AlreadyExists);
    }

    let vectors = store.embedded_vectors(None)?;
    let mut graph = HnswGraph::with_capacity(params.metric, params.m, params.ef_construction, vectors.len());
    for (id, vector) in vectors {
        graph.insert(id, vector);
    }
    let indexed = graph.len();

    let record = IndexRecord {
        name: params.name.clone(),
        metric: params.metric.to_string(),
        m: params.m,
        ef_construction: params.ef_construction,
        dimensions: store.dimensions(),
        graph: graph.to_json()?,
    };

    match store.insert_index_record(&record) {
        Ok(()) => {
            info!("Built index {} over {} chunks", params.name, indexed);
            Ok(BuildOutcome::Created { indexed })
        }
        // Lost a race with a concurrent build of the same name.
        Err(RagtubeError::ConstraintViolation(_)) => Ok(BuildOutcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

/// Insert chunks embedded since the index was built. Returns the number of
/// chunks added.
#[instrument(skip(store))]
pub fn refresh_index(store: &CorpusStore, name: &str) -> Result<usize> {
    let record = store
        .get_index_record(name)?
        .ok_or_else(|| RagtubeError::NotFound(format!("vector index {}", name)))?;

    let (graph, added, rebuilt) = restore(store, &record)?;
    if added > 0 || rebuilt {
        store.update_index_graph(name, &graph.to_json()?)?;
        info!("Refreshed index {} ({} chunks indexed)", name, graph.len());
    }
    Ok(added)
}

/// Remove the named index. Returns whether it existed.
#[instrument(skip(store))]
pub fn drop_index(store: &CorpusStore, name: &str) -> Result<bool> {
    let dropped = store.delete_index_record(name)?;
    if dropped {
        info!("Dropped index {}", name);
    }
    Ok(dropped)
}

/// Load the named index, completed with any chunk embedded after it was
/// last persisted.
pub fn load_index(store: &CorpusStore, name: &str) -> Result<Option<HnswGraph>> {
    match store.get_index_record(name)? {
        Some(record) => Ok(Some(restore(store, &record)?.0)),
        None => Ok(None),
    }
}

/// Rebuild the in-memory graph of a record. Returns the graph, the number of
/// chunks inserted on top of the persisted ones and whether it was rebuilt.
fn restore(store: &CorpusStore, record: &IndexRecord) -> Result<(HnswGraph, usize, bool)> {
    let metric: DistanceMetric = record
        .metric
        .parse()
        .map_err(RagtubeError::Index)?;
    let vectors = store.embedded_vectors(None)?;
    let lookup: HashMap<i64, Vec<f32>> = vectors.iter().cloned().collect();

    let (mut graph, rebuilt) = match HnswGraph::from_json(&record.graph, &lookup) {
        Ok(graph) => (graph, false),
        Err(e @ (RagtubeError::Index(_) | RagtubeError::Json(_))) => {
            warn!("Index {} is stale ({}), rebuilding", record.name, e);
            let graph = HnswGraph::with_capacity(metric, record.m, record.ef_construction, vectors.len());
            (graph, true)
        }
        Err(e) => return Err(e),
    };

    let added = insert_missing(&mut graph, vectors);
    Ok((graph, added, rebuilt))
}

fn insert_missing(graph: &mut HnswGraph, vectors: Vec<(i64, Vec<f32>)>) -> usize {
    let mut added = 0;
    for (id, vector) in vectors {
        if !graph.contains(id) {
            graph.insert(id, vector);
            added += 1;
        }
    }
    added
}

/// Bring an in-memory graph in line with the store's embeddings.
///
/// New chunks are inserted. When an indexed chunk lost its embedding the
/// graph is rebuilt, since `hnsw_rs` cannot remove points. Returns the
/// number of chunks inserted and whether the graph was rebuilt.
pub fn sync_graph(store: &CorpusStore, graph: &mut HnswGraph) -> Result<(usize, bool)> {
    let vectors = store.embedded_vectors(None)?;
    let present: HashSet<i64> = vectors.iter().map(|(id, _)| *id).collect();

    let rebuilt = graph.ids().iter().any(|id| !present.contains(id));
    if rebuilt {
        debug!("Graph holds deleted chunks, rebuilding");
        *graph = graph.emptied();
    }
    let added = insert_missing(graph, vectors);
    Ok((added, rebuilt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Caption, Channel, Video};
    use chrono::Utc;

    fn params(metric: DistanceMetric) -> IndexParams {
        IndexParams {
            name: "chunk_index".to_string(),
            metric,
            m: 16,
            ef_construction: 64,
            ef_search: 40,
        }
    }

    fn store_with_chunks(embeddings: &[[f32; 2]]) -> CorpusStore {
        let store = CorpusStore::in_memory(2).unwrap();
        store.insert_channel_if_absent(&Channel::new("UC1", "one")).unwrap();
        let mut video = Video::new("v1", "t", Utc::now(), "UC1");
        video.content = Some("x".to_string());
        store
            .insert_transcribed_video(&video, &[Caption::new("x", 0.0, 1.0, "v1")])
            .unwrap();

        let contents: Vec<String> = (0..embeddings.len()).map(|i| format!("c{}", i)).collect();
        store.insert_chunks("v1", &contents).unwrap();
        let chunks = store.chunks_missing_embedding().unwrap();
        let pairs: Vec<(i64, Vec<f32>)> = chunks
            .iter()
            .zip(embeddings)
            .map(|(c, e)| (c.id, e.to_vec()))
            .collect();
        store.write_embeddings(&pairs).unwrap();
        store
    }

    #[test]
    fn test_distances() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert_eq!(DistanceMetric::L1.distance(&a, &b), 2.0);
        assert!((DistanceMetric::L2.distance(&a, &b) - 2f32.sqrt()).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!(DistanceMetric::Cosine.distance(&a, &a).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.distance(&a, &[0.0, 0.0]), 1.0);
        assert!((DistanceMetric::Cosine.score(0.25) - 0.75).abs() < 1e-6);
        assert_eq!(DistanceMetric::L2.score(0.25), 0.25);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert!("dot".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_params_validation() {
        assert!(params(DistanceMetric::L2).validate().is_ok());

        let mut p = params(DistanceMetric::L2);
        p.m = 1;
        assert!(matches!(p.validate(), Err(RagtubeError::ConfigInvalid(_))));

        let mut p = params(DistanceMetric::L2);
        p.ef_construction = 8;
        assert!(matches!(p.validate(), Err(RagtubeError::ConfigInvalid(_))));
    }

    #[test]
    fn test_build_is_checked_first() {
        let store = store_with_chunks(&[[0.0, 1.0], [1.0, 0.0]]);
        assert_eq!(
            build_index(&store, &params(DistanceMetric::L2)).unwrap(),
            BuildOutcome::Created { indexed: 2 }
        );
        assert_eq!(
            build_index(&store, &params(DistanceMetric::Cosine)).unwrap(),
            BuildOutcome::AlreadyExists
        );
        assert_eq!(
            store.get_index_record("chunk_index").unwrap().unwrap().metric,
            "l2"
        );
    }

    #[test]
    fn test_invalid_params_fail_before_touching_store() {
        let store = store_with_chunks(&[[0.0, 1.0]]);
        let mut p = params(DistanceMetric::L2);
        p.m = 0;
        assert!(build_index(&store, &p).is_err());
        assert!(store.get_index_record("chunk_index").unwrap().is_none());
    }

    #[test]
    fn test_drop_is_idempotent() {
        let store = store_with_chunks(&[[0.0, 1.0]]);
        build_index(&store, &params(DistanceMetric::L2)).unwrap();
        assert!(drop_index(&store, "chunk_index").unwrap());
        assert!(!drop_index(&store, "chunk_index").unwrap());
        assert!(load_index(&store, "chunk_index").unwrap().is_none());
    }

    #[test]
    fn test_refresh_adds_new_chunks() {
        let store = store_with_chunks(&[[0.0, 1.0]]);
        build_index(&store, &params(DistanceMetric::L2)).unwrap();

        store.insert_chunks("v1", &["late".to_string()]).unwrap();
        let late = store.chunks_missing_embedding().unwrap()[0].id;
        store.write_embeddings(&[(late, vec![3.0, 3.0])]).unwrap();

        // Loading always sees the late chunk, refreshing persists it.
        assert!(load_index(&store, "chunk_index").unwrap().unwrap().contains(late));
        assert_eq!(refresh_index(&store, "chunk_index").unwrap(), 1);
        assert_eq!(refresh_index(&store, "chunk_index").unwrap(), 0);
    }

    #[test]
    fn test_stale_graph_is_rebuilt() {
        let store = store_with_chunks(&[[0.0, 1.0], [1.0, 0.0]]);
        build_index(&store, &params(DistanceMetric::L2)).unwrap();
        store.clear_embeddings().unwrap();

        let graph = load_index(&store, "chunk_index").unwrap().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_sync_graph_follows_store() {
        let store = store_with_chunks(&[[0.0, 1.0], [1.0, 0.0]]);
        build_index(&store, &params(DistanceMetric::L2)).unwrap();
        let mut graph = load_index(&store, "chunk_index").unwrap().unwrap();
        assert_eq!(sync_graph(&store, &mut graph).unwrap(), (0, false));

        store.insert_chunks("v1", &["late".to_string()]).unwrap();
        let late = store.chunks_missing_embedding().unwrap()[0].id;
        store.write_embeddings(&[(late, vec![3.0, 3.0])]).unwrap();
        assert_eq!(sync_graph(&store, &mut graph).unwrap(), (1, false));
        assert!(graph.contains(late));

        store.delete_video("v1").unwrap();
        assert_eq!(sync_graph(&store, &mut graph).unwrap(), (0, true));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_unreadable_graph_is_rebuilt() {
        let store = store_with_chunks(&[[0.0, 1.0], [1.0, 0.0]]);
        build_index(&store, &params(DistanceMetric::L2)).unwrap();
        store.update_index_graph("chunk_index", "{\"nodes\":[]}").unwrap();

        let graph = load_index(&store, "chunk_index").unwrap().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(refresh_index(&store, "chunk_index").unwrap(), 2);
    }

    #[test]
    fn test_refresh_unknown_index() {
        let store = CorpusStore::in_memory(2).unwrap();
        assert!(matches!(
            refresh_index(&store, "missing"),
            Err(RagtubeError::NotFound(_))
        ));
    }
}

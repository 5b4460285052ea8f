//! HNSW graph over chunk embeddings, backed by `hnsw_rs`.
//!
//! Only the indexed chunk IDs and the graph parameters are persisted. The
//! vectors live in the corpus store and the graph is re-inserted from them
//! on load.

use super::DistanceMetric;
use crate::error::{RagtubeError, Result};
use hnsw_rs::filter::FilterT;
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Upper bound on graph layers; `hnsw_rs` supports at most 16.
const MAX_LAYER: usize = 16;

enum Inner {
    L1(Hnsw<'static, f32, DistL1>),
    L2(Hnsw<'static, f32, DistL2>),
    Cosine(Hnsw<'static, f32, DistCosine>),
}

impl Inner {
    fn new(metric: DistanceMetric, m: usize, ef_construction: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        match metric {
            DistanceMetric::L1 => {
                Inner::L1(Hnsw::new(m, capacity, MAX_LAYER, ef_construction, DistL1 {}))
            }
            DistanceMetric::L2 => {
                Inner::L2(Hnsw::new(m, capacity, MAX_LAYER, ef_construction, DistL2 {}))
            }
            DistanceMetric::Cosine => {
                Inner::Cosine(Hnsw::new(m, capacity, MAX_LAYER, ef_construction, DistCosine {}))
            }
        }
    }

    fn insert(&self, vector: &[f32], data_id: usize) {
        match self {
            Inner::L1(hnsw) => hnsw.insert_slice((vector, data_id)),
            Inner::L2(hnsw) => hnsw.insert_slice((vector, data_id)),
            Inner::Cosine(hnsw) => hnsw.insert_slice((vector, data_id)),
        }
    }

    fn search(&self, query: &[f32], k: usize, ef: usize, filter: Option<&dyn FilterT>) -> Vec<Neighbour> {
        match self {
            Inner::L1(hnsw) => hnsw.search_filter(query, k, ef, filter),
            Inner::L2(hnsw) => hnsw.search_filter(query, k, ef, filter),
            Inner::Cosine(hnsw) => hnsw.search_filter(query, k, ef, filter),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedGraph {
    metric: DistanceMetric,
    m: usize,
    ef_construction: usize,
    /// Chunk IDs in insertion order.
    ids: Vec<i64>,
}

/// Approximate nearest-neighbour graph keyed by chunk ID.
pub struct HnswGraph {
    metric: DistanceMetric,
    m: usize,
    ef_construction: usize,
    inner: Inner,
    order: Vec<i64>,
    vectors: HashMap<i64, Vec<f32>>,
}

impl HnswGraph {
    pub fn new(metric: DistanceMetric, m: usize, ef_construction: usize) -> Self {
        Self::with_capacity(metric, m, ef_construction, 0)
    }

    /// Like [`HnswGraph::new`], sized for `capacity` vectors.
    pub fn with_capacity(metric: DistanceMetric, m: usize, ef_construction: usize, capacity: usize) -> Self {
        Self {
            metric,
            m,
            ef_construction,
            inner: Inner::new(metric, m, ef_construction, capacity),
            order: Vec::new(),
            vectors: HashMap::new(),
        }
    }

    /// An empty graph with the same parameters.
    pub fn emptied(&self) -> Self {
        Self::with_capacity(self.metric, self.m, self.ef_construction, self.len())
    }

    /// Re-insert a persisted graph from the store's vectors.
    ///
    /// Fails when an indexed chunk no longer has an embedding, which means the
    /// graph is stale and must be rebuilt.
    pub fn from_json(json: &str, vectors: &HashMap<i64, Vec<f32>>) -> Result<Self> {
        let persisted: PersistedGraph = serde_json::from_str(json)?;
        let mut graph = Self::with_capacity(
            persisted.metric,
            persisted.m,
            persisted.ef_construction,
            vectors.len(),
        );
        for id in persisted.ids {
            let vector = vectors.get(&id).ok_or_else(|| {
                RagtubeError::Index(format!("chunk {} is indexed but has no embedding", id))
            })?;
            graph.insert(id, vector.clone());
        }
        debug!("Restored HNSW graph with {} vectors", graph.len());
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&PersistedGraph {
            metric: self.metric,
            m: self.m,
            ef_construction: self.ef_construction,
            ids: self.order.clone(),
        })?)
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.vectors.contains_key(&id)
    }

    /// Indexed chunk IDs in insertion order.
    pub fn ids(&self) -> &[i64] {
        &self.order
    }

    /// Insert a vector. Inserting an ID twice is a no-op.
    pub fn insert(&mut self, id: i64, vector: Vec<f32>) {
        if self.vectors.contains_key(&id) {
            return;
        }
        self.inner.insert(&vector, id as usize);
        self.order.push(id);
        self.vectors.insert(id, vector);
    }

    /// Approximate `k` nearest neighbours as `(chunk id, distance)` pairs,
    /// closest first.
    ///
    /// `ef` is the candidate width and is raised to `k` when smaller. When
    /// `allowed` is given only those IDs are returned.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        allowed: Option<&HashSet<i64>>,
    ) -> Vec<(i64, f32)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let in_allowed = |data_id: &usize| allowed.map_or(true, |ids| ids.contains(&(*data_id as i64)));
        let filter: Option<&dyn FilterT> = match allowed {
            Some(_) => Some(&in_allowed as &dyn FilterT),
            None => None,
        };

        // Distances are recomputed from the stored vectors so graph and
        // exact scans report identical scores.
        let mut hits: Vec<(i64, f32)> = self
            .inner
            .search(query, k, ef.max(k), filter)
            .into_iter()
            .filter_map(|n| {
                let id = n.d_id as i64;
                self.vectors
                    .get(&id)
                    .map(|vector| (id, self.metric.distance(query, vector)))
            })
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<(i64, Vec<f32>)> {
        (0..n)
            .map(|i| (i as i64 + 1, vec![(i % 10) as f32, (i / 10) as f32]))
            .collect()
    }

    fn exact(points: &[(i64, Vec<f32>)], query: &[f32], k: usize) -> Vec<i64> {
        let mut scored: Vec<(f32, i64)> = points
            .iter()
            .map(|(id, v)| (DistanceMetric::L2.distance(query, v), *id))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, id)| id).collect()
    }

    #[test]
    fn test_empty_graph_returns_nothing() {
        let graph = HnswGraph::new(DistanceMetric::L2, 16, 64);
        assert!(graph.search(&[0.0, 0.0], 5, 40, None).is_empty());
    }

    #[test]
    fn test_small_graph_matches_exact_search() {
        let points = grid(100);
        let mut graph = HnswGraph::new(DistanceMetric::L2, 16, 64);
        for (id, v) in &points {
            graph.insert(*id, v.clone());
        }

        let query = [4.3, 6.8];
        let found: Vec<i64> = graph.search(&query, 5, 100, None).into_iter().map(|(id, _)| id).collect();
        assert_eq!(found, exact(&points, &query, 5));
    }

    #[test]
    fn test_results_are_sorted_by_distance() {
        let mut graph = HnswGraph::new(DistanceMetric::L1, 4, 16);
        for (id, v) in grid(50) {
            graph.insert(id, v);
        }
        let results = graph.search(&[3.0, 3.0], 10, 40, None);
        assert_eq!(results.len(), 10);
        assert!(results.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_filter_restricts_ids() {
        let mut graph = HnswGraph::new(DistanceMetric::L2, 16, 64);
        for (id, v) in grid(30) {
            graph.insert(id, v);
        }
        let allowed: HashSet<i64> = [3, 17, 25].into_iter().collect();
        let results = graph.search(&[0.0, 0.0], 10, 64, Some(&allowed));
        assert!(!results.is_empty());
        assert!(results.iter().all(|(id, _)| allowed.contains(id)));
    }

    #[test]
    fn test_json_round_trip_reinserts_vectors() {
        let points = grid(20);
        let mut graph = HnswGraph::new(DistanceMetric::Cosine, 8, 32);
        for (id, v) in &points {
            graph.insert(*id, v.clone());
        }
        let json = graph.to_json().unwrap();

        let vectors: HashMap<i64, Vec<f32>> = points.iter().cloned().collect();
        let restored = HnswGraph::from_json(&json, &vectors).unwrap();
        assert_eq!(restored.len(), 20);
        assert_eq!(restored.metric(), DistanceMetric::Cosine);
        assert!(restored.contains(7));
        assert_eq!(restored.ids(), graph.ids());

        let mut partial = vectors.clone();
        partial.remove(&7);
        assert!(matches!(
            HnswGraph::from_json(&json, &partial),
            Err(RagtubeError::Index(_))
        ));
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let mut graph = HnswGraph::new(DistanceMetric::L2, 16, 64);
        graph.insert(1, vec![0.0, 1.0]);
        graph.insert(1, vec![5.0, 5.0]);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.search(&[5.0, 5.0], 1, 16, None)[0], (1, 41f32.sqrt()));
    }
}

//! In-process approximate-nearest-neighbor (ANN) search.
//!
//! This module defines the capability surface a vector index must expose
//! (`AnnIndex`) and ships one mandatory implementation — an exact flat scan
//! — plus an optional HNSW-backed approximate implementation gated behind
//! the `ann_hnsw` feature. Neither implementation owns persistence; callers
//! (the storage backends) are responsible for durably recording embeddings
//! and rebuilding an index from them on load.

use crate::index::VectorMetric;
use crate::model::NodeId;
use crate::{Error, Result};

/// A single search hit: the node id and a "higher is better" score, already
/// converted from the index's raw distance via `VectorMetric::score`.
pub type VectorHit = (NodeId, f64);

/// Capability contract for an in-process ANN index.
///
/// Implementations are not required to be thread-safe on their own —
/// backends wrap them behind whatever locking discipline they already use
/// for the rest of the graph.
pub trait AnnIndex: Send + Sync {
    /// Insert or replace the embedding for `node`. Errors if `vector.len()`
    /// does not match `dim()`.
    fn add(&mut self, node: NodeId, vector: Vec<f32>) -> Result<()>;

    /// Remove a node's embedding, if present.
    fn remove(&mut self, node: NodeId);

    /// Return up to `k` nearest neighbors to `query`, scored and sorted
    /// highest-first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Number of embeddings currently indexed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dim(&self) -> usize;

    fn metric(&self) -> VectorMetric;
}

fn raw_distance(metric: VectorMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        VectorMetric::L2 => a.iter().zip(b).map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        }).sum::<f64>().sqrt(),
        VectorMetric::Dot => a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum(),
        VectorMetric::Cosine => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
            let na: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
            let nb: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
            if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
        }
    }
}

/// Exact brute-force index: scores every stored vector against the query.
/// This is the one implementation every deployment can rely on, used both
/// as the default backing for `MemoryBackend` and as the reranking step
/// behind an approximate candidate set.
#[derive(Debug, Default)]
pub struct FlatIndex {
    dim: usize,
    metric: VectorMetric,
    entries: Vec<(NodeId, Vec<f32>)>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: VectorMetric) -> Self {
        Self { dim, metric, entries: Vec::new() }
    }
}

impl AnnIndex for FlatIndex {
    fn add(&mut self, node: NodeId, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::ExecutionError(format!(
                "vector has {} dimensions, index expects {}", vector.len(), self.dim
            )));
        }
        self.entries.retain(|(id, _)| *id != node);
        self.entries.push((node, vector));
        Ok(())
    }

    fn remove(&mut self, node: NodeId) {
        self.entries.retain(|(id, _)| *id != node);
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if query.len() != self.dim {
            return Err(Error::ExecutionError(format!(
                "query has {} dimensions, index expects {}", query.len(), self.dim
            )));
        }
        let mut scored: Vec<VectorHit> = self.entries.iter()
            .map(|(id, v)| (*id, self.metric.score(raw_distance(self.metric, query, v))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> VectorMetric {
        self.metric
    }
}

/// Exact re-ranking of a candidate set: compute the true distance for each
/// candidate under `metric` and return them sorted, truncated to `k`. Used
/// by `Graph::semantic_search` after an ANN index returns an over-fetched
/// candidate window and/or a structural filter narrows it.
pub fn exact_rerank(
    metric: VectorMetric,
    query: &[f32],
    candidates: &[(NodeId, Vec<f32>)],
    k: usize,
) -> Vec<VectorHit> {
    let mut scored: Vec<VectorHit> = candidates.iter()
        .map(|(id, v)| (*id, metric.score(raw_distance(metric, query, v))))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(feature = "ann_hnsw")]
mod hnsw;
#[cfg(feature = "ann_hnsw")]
pub use hnsw::HnswIndex;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_index_search_orders_by_score() {
        let mut idx = FlatIndex::new(2, VectorMetric::L2);
        idx.add(NodeId(1), vec![0.0, 0.0]).unwrap();
        idx.add(NodeId(2), vec![1.0, 0.0]).unwrap();
        idx.add(NodeId(3), vec![5.0, 5.0]).unwrap();
        let hits = idx.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, NodeId(1));
        assert_eq!(hits[1].0, NodeId(2));
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_flat_index_rejects_wrong_dimension() {
        let mut idx = FlatIndex::new(3, VectorMetric::Cosine);
        assert!(idx.add(NodeId(1), vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn test_flat_index_remove() {
        let mut idx = FlatIndex::new(1, VectorMetric::Dot);
        idx.add(NodeId(1), vec![1.0]).unwrap();
        idx.remove(NodeId(1));
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn test_cosine_metric_score_matches_similarity() {
        let mut idx = FlatIndex::new(2, VectorMetric::Cosine);
        idx.add(NodeId(1), vec![1.0, 0.0]).unwrap();
        let hits = idx.search(&[1.0, 0.0], 1).unwrap();
        assert!((hits[0].1 - 1.0).abs() < 1e-9);
    }
}

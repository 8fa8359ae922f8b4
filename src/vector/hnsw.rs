//! Approximate index backed by `hnsw_rs`, gated behind the `ann_hnsw`
//! feature. Only available for the L2 metric, matching the distance the
//! graph below is built with; callers asking for cosine or dot-product
//! similarity get `FlatIndex` instead (see `vector::mod`'s registry
//! construction).

use std::collections::HashMap;

use hnsw_rs::prelude::*;

use crate::index::VectorMetric;
use crate::model::NodeId;
use crate::{Error, Result};

use super::{AnnIndex, VectorHit};

const MAX_LAYER: usize = 16;
const EF_SEARCH: usize = 64;

/// Approximate nearest-neighbor index over L2 distance.
///
/// `hnsw_rs` indexes by a `usize` id, not `NodeId` directly, so this keeps
/// a side table mapping index-local ids back to node ids. `Hnsw` has no
/// in-place delete, so `remove` rebuilds the whole graph from the
/// remaining stored vectors — acceptable here because every raw vector is
/// already retained for `rerank=true` (spec.md §4.5) and the spec only
/// requires removal to be best-effort.
pub struct HnswIndex {
    dim: usize,
    max_nb_connection: usize,
    ef_construction: usize,
    vectors: HashMap<NodeId, Vec<f32>>,
    order: Vec<NodeId>,
    graph: Option<Hnsw<'static, f32, DistL2>>,
}

impl HnswIndex {
    pub fn new(dim: usize, max_nb_connection: usize, ef_construction: usize) -> Self {
        Self {
            dim,
            max_nb_connection,
            ef_construction,
            vectors: HashMap::new(),
            order: Vec::new(),
            graph: None,
        }
    }

    fn rebuild(&mut self) {
        if self.vectors.is_empty() {
            self.graph = None;
            self.order.clear();
            return;
        }
        self.order = self.vectors.keys().copied().collect();
        self.order.sort_by_key(|n| n.0);

        let hnsw = Hnsw::<f32, DistL2>::new(
            self.max_nb_connection,
            self.vectors.len(),
            MAX_LAYER,
            self.ef_construction,
            DistL2 {},
        );
        for (local_id, node) in self.order.iter().enumerate() {
            let v = &self.vectors[node];
            hnsw.insert((v, local_id));
        }
        self.graph = Some(hnsw);
    }
}

impl AnnIndex for HnswIndex {
    fn add(&mut self, node: NodeId, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::ExecutionError(format!(
                "vector has {} dimensions, index expects {}", vector.len(), self.dim
            )));
        }
        self.vectors.insert(node, vector);
        self.rebuild();
        Ok(())
    }

    fn remove(&mut self, node: NodeId) {
        if self.vectors.remove(&node).is_some() {
            self.rebuild();
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if query.len() != self.dim {
            return Err(Error::ExecutionError(format!(
                "query has {} dimensions, index expects {}", query.len(), self.dim
            )));
        }
        let Some(graph) = &self.graph else { return Ok(Vec::new()) };
        let neighbours = graph.search(query, k, EF_SEARCH);
        let mut hits: Vec<VectorHit> = neighbours.into_iter()
            .filter_map(|n| {
                let node = *self.order.get(n.d_id)?;
                Some((node, VectorMetric::L2.score(n.distance as f64)))
            })
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.0.cmp(&b.0.0)));
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> VectorMetric {
        VectorMetric::L2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hnsw_search_finds_nearest() {
        let mut idx = HnswIndex::new(2, 16, 100);
        idx.add(NodeId(1), vec![0.0, 0.0]).unwrap();
        idx.add(NodeId(2), vec![10.0, 10.0]).unwrap();
        let hits = idx.search(&[0.1, 0.1], 1).unwrap();
        assert_eq!(hits[0].0, NodeId(1));
    }

    #[test]
    fn test_hnsw_rejects_wrong_dimension() {
        let mut idx = HnswIndex::new(3, 16, 100);
        assert!(idx.add(NodeId(1), vec![1.0, 0.0]).is_err());
    }

    #[test]
    fn test_hnsw_remove_then_search_excludes_node() {
        let mut idx = HnswIndex::new(1, 16, 100);
        idx.add(NodeId(1), vec![0.0]).unwrap();
        idx.add(NodeId(2), vec![5.0]).unwrap();
        idx.remove(NodeId(1));
        let hits = idx.search(&[0.0], 2).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, NodeId(2));
    }
}

//! End-to-end integration tests for the vector-search subsystem.
//!
//! Covers `Graph::create_vector_index`/`upsert_embedding`/`semantic_search`
//! and the `db.vector.search` Cypher procedure, against `MemoryBackend`.

use graphene::{Graph, Node, PropertyMap, Value, VectorMetric, VectorMethod};

// ============================================================================
// 1. Flat index returns exact top-k by L2 distance
// ============================================================================

#[test]
fn test_semantic_search_exact_l2_ordering() {
    let graph = Graph::open_memory().unwrap();

    graph
        .mutate(
            "CREATE (:Item {name: 'x'}), (:Item {name: 'y'}), (:Item {name: 'z'})",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph
        .execute("MATCH (n:Item) RETURN n ORDER BY n.name", PropertyMap::new())
        .unwrap();
    let ids: Vec<_> = result
        .rows
        .iter()
        .map(|r| r.get::<Node>("n").unwrap().id)
        .collect();

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 3, VectorMetric::L2)
        .unwrap();

    graph.upsert_embedding("item_vecs", ids[0], vec![1.0, 0.0, 0.0]).unwrap();
    graph.upsert_embedding("item_vecs", ids[1], vec![0.0, 1.0, 0.0]).unwrap();
    graph.upsert_embedding("item_vecs", ids[2], vec![0.0, 0.0, 1.0]).unwrap();

    let hits = graph
        .semantic_search("item_vecs", vec![0.9, 0.1, 0.0], 2, None)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0.id, ids[0]);
    assert_eq!(hits[1].0.id, ids[1]);
    assert!(hits[0].1 > hits[1].1);
}

// ============================================================================
// 2. Structural filter by label narrows the candidate set to empty
// ============================================================================

#[test]
fn test_semantic_search_label_filter_excludes_all() {
    let graph = Graph::open_memory().unwrap();

    graph.mutate("CREATE (:Item {name: 'x'})", PropertyMap::new()).unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n", PropertyMap::new()).unwrap();
    let id = result.rows[0].get::<Node>("n").unwrap().id;

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 3, VectorMetric::L2)
        .unwrap();
    graph.upsert_embedding("item_vecs", id, vec![1.0, 0.0, 0.0]).unwrap();

    let hits = graph
        .semantic_search("item_vecs", vec![0.9, 0.1, 0.0], 2, Some("Unknown"))
        .unwrap();
    assert!(hits.is_empty());
}

// ============================================================================
// 3. Re-upserting the same node id replaces the prior embedding
// ============================================================================

#[test]
fn test_upsert_embedding_replaces_prior_vector() {
    let graph = Graph::open_memory().unwrap();

    graph.mutate("CREATE (:Item {name: 'x'})", PropertyMap::new()).unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n", PropertyMap::new()).unwrap();
    let id = result.rows[0].get::<Node>("n").unwrap().id;

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 2, VectorMetric::L2)
        .unwrap();

    graph.upsert_embedding("item_vecs", id, vec![10.0, 10.0]).unwrap();
    graph.upsert_embedding("item_vecs", id, vec![0.0, 0.0]).unwrap();

    let hits = graph.semantic_search("item_vecs", vec![0.0, 0.0], 1, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].1 > 0.99, "score should reflect the most recent (near-zero distance) vector, got {}", hits[0].1);
}

// ============================================================================
// 4. Deleting a node cascades its vector-index entry
// ============================================================================

#[test]
fn test_delete_node_cascades_vector_index() {
    let graph = Graph::open_memory().unwrap();

    graph.mutate("CREATE (:Item {name: 'x'})", PropertyMap::new()).unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n", PropertyMap::new()).unwrap();
    let id = result.rows[0].get::<Node>("n").unwrap().id;

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 2, VectorMetric::L2)
        .unwrap();
    graph.upsert_embedding("item_vecs", id, vec![1.0, 1.0]).unwrap();

    graph
        .mutate("MATCH (n:Item) DETACH DELETE n", PropertyMap::new())
        .unwrap();

    let hits = graph.semantic_search("item_vecs", vec![1.0, 1.0], 5, None).unwrap();
    assert!(hits.is_empty());
}

// ============================================================================
// 5. `CALL db.vector.search(...)` surfaces the same search via Cypher
// ============================================================================

#[test]
fn test_call_db_vector_search_procedure() {
    let graph = Graph::open_memory().unwrap();

    graph
        .mutate(
            "CREATE (:Item {name: 'a'}), (:Item {name: 'b'})",
            PropertyMap::new(),
        )
        .unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n ORDER BY n.name", PropertyMap::new()).unwrap();
    let ids: Vec<_> = result.rows.iter().map(|r| r.get::<Node>("n").unwrap().id).collect();

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 2, VectorMetric::Cosine)
        .unwrap();
    graph.upsert_embedding("item_vecs", ids[0], vec![1.0, 0.0]).unwrap();
    graph.upsert_embedding("item_vecs", ids[1], vec![0.0, 1.0]).unwrap();

    let result = graph
        .execute(
            "CALL db.vector.search('item_vecs', [1.0, 0.0], 1) YIELD node, score RETURN node.name AS name, score",
            PropertyMap::new(),
        )
        .unwrap();

    assert_eq!(result.rows.len(), 1);
    let name: String = result.rows[0].get("name").unwrap();
    assert_eq!(name, "a");
    let score: f64 = result.rows[0].get("score").unwrap();
    assert!((score - 1.0).abs() < 1e-6);
}

// ============================================================================
// 6. Searching an unknown index name fails loudly, not silently empty
// ============================================================================

#[test]
fn test_semantic_search_unknown_index_errors() {
    let graph = Graph::open_memory().unwrap();
    let err = graph.semantic_search("does_not_exist", vec![0.0], 1, None);
    assert!(err.is_err());
}

// ============================================================================
// 7. Wrong-dimension vector is rejected rather than silently truncated
// ============================================================================

#[test]
fn test_upsert_embedding_dimension_mismatch() {
    let graph = Graph::open_memory().unwrap();
    graph.mutate("CREATE (:Item {name: 'x'})", PropertyMap::new()).unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n", PropertyMap::new()).unwrap();
    let id = result.rows[0].get::<Node>("n").unwrap().id;

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 3, VectorMetric::L2)
        .unwrap();

    let err = graph.upsert_embedding("item_vecs", id, vec![1.0, 0.0]);
    assert!(err.is_err());
}

// ============================================================================
// 8. rerank=true-equivalent: registering a reranker changes ordering
// ============================================================================

#[test]
fn test_register_reranker_changes_ordering() {
    let graph = Graph::open_memory().unwrap();

    graph
        .mutate(
            "CREATE (:Item {name: 'near', prio: 0}), (:Item {name: 'far', prio: 100})",
            PropertyMap::new(),
        )
        .unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n ORDER BY n.name", PropertyMap::new()).unwrap();
    let far_id = result.rows[0].get::<Node>("n").unwrap().id;
    let near_id = result.rows[1].get::<Node>("n").unwrap().id;

    graph
        .create_vector_index("item_vecs", "Item", "embedding", 1, VectorMetric::L2)
        .unwrap();
    graph.upsert_embedding("item_vecs", far_id, vec![0.0]).unwrap();
    graph.upsert_embedding("item_vecs", near_id, vec![1.0]).unwrap();

    // Without a reranker, "far" (node named 'far', vector 0.0) wins on raw distance to 0.0.
    let hits = graph.semantic_search("item_vecs", vec![0.0], 1, None).unwrap();
    let winner: String = hits[0].0.get("name").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }).unwrap();
    assert_eq!(winner, "far");

    // A reranker that always prefers higher `prio` flips the winner.
    graph.register_reranker(Some(std::sync::Arc::new(|_query: &[f32], node: &Node| {
        match node.get("prio") {
            Some(Value::Int(p)) => *p as f64,
            _ => 0.0,
        }
    })));

    let hits = graph.semantic_search("item_vecs", vec![0.0], 1, None).unwrap();
    let winner: String = hits[0].0.get("name").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }).unwrap();
    assert_eq!(winner, "near");
}

// ============================================================================
// 9. An explicit `hnsw` method index (feature `ann_hnsw`, default-on)
//    answers searches, not just the flat fallback.
// ============================================================================

#[test]
#[cfg(feature = "ann_hnsw")]
fn test_semantic_search_over_hnsw_method_index() {
    let graph = Graph::open_memory().unwrap();

    graph
        .mutate(
            "CREATE (:Item {name: 'x'}), (:Item {name: 'y'})",
            PropertyMap::new(),
        )
        .unwrap();
    let result = graph.execute("MATCH (n:Item) RETURN n ORDER BY n.name", PropertyMap::new()).unwrap();
    let ids: Vec<_> = result.rows.iter().map(|r| r.get::<Node>("n").unwrap().id).collect();

    graph
        .create_vector_index_with_method("item_vecs", "Item", "embedding", 2, VectorMetric::L2, VectorMethod::Hnsw)
        .unwrap();
    graph.upsert_embedding("item_vecs", ids[0], vec![0.0, 0.0]).unwrap();
    graph.upsert_embedding("item_vecs", ids[1], vec![9.0, 9.0]).unwrap();

    let hits = graph.semantic_search("item_vecs", vec![0.1, 0.1], 1, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0.id, ids[0]);
}

// ============================================================================
// 10. Requesting the `hnsw` method with a non-L2 metric is rejected
//     eagerly, at index-creation time.
// ============================================================================

#[test]
fn test_hnsw_method_rejects_non_l2_metric() {
    let graph = Graph::open_memory().unwrap();
    let err = graph.create_vector_index_with_method(
        "item_vecs", "Item", "embedding", 2, VectorMetric::Cosine, VectorMethod::Hnsw,
    );
    assert!(err.is_err());
}

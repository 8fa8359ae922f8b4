//! End-to-end integration tests for `MERGE` semantics and idempotence.

use graphene::{ConstraintKind, Graph, Node, PropertyMap, Value};

// ============================================================================
// 1. MERGE creates on first run, ON CREATE SET applies
// ============================================================================

#[test]
fn test_merge_creates_with_on_create_set() {
    let graph = Graph::open_memory().unwrap();

    graph
        .mutate(
            "MERGE (p:Person {email: 'a@x'}) ON CREATE SET p.n = 1 ON MATCH SET p.n = p.n + 1",
            PropertyMap::new(),
        )
        .unwrap();

    let result = graph.execute("MATCH (p:Person) RETURN p", PropertyMap::new()).unwrap();
    assert_eq!(result.rows.len(), 1);
    let node = result.rows[0].get::<Node>("p").unwrap();
    assert_eq!(node.get("n"), Some(&Value::Int(1)));
}

// ============================================================================
// 2. Running the same MERGE twice is idempotent on node count, ON MATCH
//    SET fires on the second run (spec.md §8 scenario 4).
// ============================================================================

#[test]
fn test_merge_idempotence_with_unique_constraint() {
    let graph = Graph::open_memory().unwrap();
    graph.create_constraint("Person", "email", ConstraintKind::Unique).unwrap();

    let query = "MERGE (p:Person {email: 'a@x'}) ON CREATE SET p.n = 1 ON MATCH SET p.n = p.n + 1";
    graph.mutate(query, PropertyMap::new()).unwrap();
    graph.mutate(query, PropertyMap::new()).unwrap();

    let result = graph.execute("MATCH (p:Person {email: 'a@x'}) RETURN p", PropertyMap::new()).unwrap();
    assert_eq!(result.rows.len(), 1, "MERGE must not create duplicates across runs");
    let node = result.rows[0].get::<Node>("p").unwrap();
    assert_eq!(node.get("n"), Some(&Value::Int(2)));
}

// ============================================================================
// 3. MERGE without ON CREATE/ON MATCH still binds the existing node
// ============================================================================

#[test]
fn test_merge_matches_existing_without_on_clauses() {
    let graph = Graph::open_memory().unwrap();
    graph.create_constraint("Person", "email", ConstraintKind::Unique).unwrap();

    graph
        .mutate("CREATE (:Person {email: 'a@x', name: 'Alice'})", PropertyMap::new())
        .unwrap();
    graph
        .mutate("MERGE (p:Person {email: 'a@x'}) RETURN p", PropertyMap::new())
        .unwrap();

    let result = graph.execute("MATCH (p:Person) RETURN count(p)", PropertyMap::new()).unwrap();
    let count: i64 = result.rows[0].get("count").unwrap();
    assert_eq!(count, 1);
}

// ============================================================================
// 4. MERGE on a relationship pattern creates the relationship once
// ============================================================================

#[test]
fn test_merge_relationship_idempotent() {
    let graph = Graph::open_memory().unwrap();

    graph
        .mutate(
            "CREATE (:Person {name: 'Alice'}), (:Person {name: 'Bob'})",
            PropertyMap::new(),
        )
        .unwrap();

    let query = "MATCH (a:Person {name: 'Alice'}), (b:Person {name: 'Bob'}) \
                 MERGE (a)-[r:KNOWS]->(b) ON CREATE SET r.since = 2020";
    graph.mutate(query, PropertyMap::new()).unwrap();
    graph.mutate(query, PropertyMap::new()).unwrap();

    let result = graph
        .execute("MATCH ()-[r:KNOWS]->() RETURN count(r)", PropertyMap::new())
        .unwrap();
    let count: i64 = result.rows[0].get("count").unwrap();
    assert_eq!(count, 1, "MERGE on a relationship pattern must not duplicate edges");
}

// ============================================================================
// 5. Two distinct merge keys create two distinct nodes
// ============================================================================

#[test]
fn test_merge_distinct_keys_create_distinct_nodes() {
    let graph = Graph::open_memory().unwrap();
    graph.create_constraint("Person", "email", ConstraintKind::Unique).unwrap();

    graph.mutate("MERGE (p:Person {email: 'a@x'})", PropertyMap::new()).unwrap();
    graph.mutate("MERGE (p:Person {email: 'b@x'})", PropertyMap::new()).unwrap();

    let result = graph.execute("MATCH (p:Person) RETURN count(p)", PropertyMap::new()).unwrap();
    let count: i64 = result.rows[0].get("count").unwrap();
    assert_eq!(count, 2);
}

// ============================================================================
// 6. A second conflicting MERGE attempt against a unique constraint from
//    a value that collides on a *different* property than the merge key
//    still only matches on the merge key.
// ============================================================================

#[test]
fn test_merge_only_keys_on_declared_properties() {
    let graph = Graph::open_memory().unwrap();
    graph.create_constraint("Person", "email", ConstraintKind::Unique).unwrap();

    graph
        .mutate("MERGE (p:Person {email: 'a@x'}) ON CREATE SET p.name = 'Alice'", PropertyMap::new())
        .unwrap();
    graph
        .mutate("MERGE (p:Person {email: 'a@x'}) ON CREATE SET p.name = 'SomeoneElse'", PropertyMap::new())
        .unwrap();

    let result = graph.execute("MATCH (p:Person {email: 'a@x'}) RETURN p", PropertyMap::new()).unwrap();
    assert_eq!(result.rows.len(), 1);
    let node = result.rows[0].get::<Node>("p").unwrap();
    assert_eq!(node.get("name"), Some(&Value::String("Alice".into())));
}

//! # Storage Backend Trait
//!
//! This is the contract between the query engine and any storage engine.
//! Every operation the graph model needs is defined here. Execution is
//! synchronous from the caller's perspective — there is no `async fn`
//! anywhere in this trait, matching the single-process, single-writer
//! embedding model this crate targets.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | Pure-Rust reference implementation, no durability |
//! | `SqliteBackend` | `sqlite` | Production backend over a single SQLite connection |

pub mod memory;
pub mod procedures;
pub mod sqlite;

use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::index::{ConstraintKind, ConstraintDescriptor, IndexDescriptor, IndexType, VectorIndexDescriptor, VectorMetric, VectorMethod};
use crate::vector::VectorHit;
use crate::{Error, Result};

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Backwards-compatible alias: a constraint kind as seen from the storage layer.
pub type ConstraintType = ConstraintKind;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Configuration shared by every concrete backend.
///
/// `path = None` means in-memory (no persistence); `Some(path)` opens or
/// creates a file-backed store at that path.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub path: Option<std::path::PathBuf>,
    pub read_only: bool,
    pub cache_size_mb: usize,
    /// Hard ceiling on `*..N` variable-length expansion, independent of
    /// whatever bound the query itself specifies.
    pub variable_length_max_hops: usize,
    pub fulltext_enabled: bool,
    pub vector_default_candidate_multiplier: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            cache_size_mb: 64,
            variable_length_max_hops: 15,
            fulltext_enabled: true,
            vector_default_candidate_multiplier: 4,
        }
    }
}

impl BackendConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: Some(path.into()), ..Self::default() }
    }
}

// ============================================================================
// Expand depth specification
// ============================================================================

/// Depth specification for graph expansion.
#[derive(Debug, Clone, Copy)]
pub enum ExpandDepth {
    /// Exact depth
    Exact(usize),
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
    /// Unbounded (up to implementation limit)
    Unbounded,
}

// ============================================================================
// Backend capabilities
// ============================================================================

/// What a backend can do — used by the planner for optimization decisions.
///
/// All fields default to false / empty. Backends override via `capabilities()`.
#[derive(Debug, Clone, Default)]
pub struct BackendCapabilities {
    pub supports_vector_index: bool,
    pub supports_fulltext_index: bool,
    pub supports_procedures: bool,
    pub supports_batch_writes: bool,
    pub supports_constraints: bool,
    pub max_batch_size: Option<usize>,
    pub supported_procedures: Vec<String>,
}

// ============================================================================
// Procedure result
// ============================================================================

/// Result of a procedure call or raw query execution.
///
/// This lightweight type lives in the storage layer so that `call_procedure()`
/// and `execute_raw()` can return structured results without importing from
/// the execution module.
#[derive(Debug, Clone, Default)]
pub struct ProcedureResult {
    pub columns: Vec<String>,
    pub rows: Vec<std::collections::HashMap<String, Value>>,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Any backend that implements this trait can serve as the storage layer.
/// The trait is intentionally broad — backends should return
/// `Error::ExecutionError("not supported")` for operations they can't handle
/// rather than having a hundred optional methods.
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend, flushing any pending writes.
    fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction. Write transactions acquire the backend's
    /// single-writer lock for their lifetime.
    fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    fn create_node(&self, tx: &mut Self::Tx, labels: &[&str], props: PropertyMap) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Returns true if it existed.
    /// Fails if the node still has relationships (Neo4j semantics).
    fn delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool>;

    /// Set a property on a node (upsert).
    fn set_node_property(&self, tx: &mut Self::Tx, id: NodeId, key: &str, val: Value) -> Result<()>;

    /// Remove a property from a node entirely (the key no longer appears in `KEYS(n)`).
    fn remove_node_property(&self, tx: &mut Self::Tx, id: NodeId, key: &str) -> Result<()>;

    /// Add a label to a node.
    fn add_label(&self, tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()>;

    /// Remove a label from a node. Removing the last label is permitted.
    fn remove_label(&self, tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()>;

    /// Delete a node and all its relationships in one operation.
    /// Neo4j: `DETACH DELETE n`
    ///
    /// Default: get all relationships, delete each, then delete the node.
    fn detach_delete_node(&self, tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let rels = self.get_relationships(tx, id, Direction::Both, None)?;
        for rel in &rels {
            self.delete_relationship(tx, rel.id)?;
        }
        self.delete_node(tx, id)
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Set a property on a relationship (upsert).
    fn set_relationship_property(&self, tx: &mut Self::Tx, id: RelId, key: &str, val: Value) -> Result<()>;

    /// Remove a property from a relationship.
    fn remove_relationship_property(&self, tx: &mut Self::Tx, id: RelId, key: &str) -> Result<()>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    /// Expand from a node: bounded-depth traversal, returning one `Path` per
    /// distinct walk discovered (edge-unique, not node-unique — a walk may
    /// revisit a node but never the same relationship twice).
    fn expand(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>> {
        let (min, max) = match depth {
            ExpandDepth::Exact(n) => (n, n),
            ExpandDepth::Range { min, max } => (min, max),
            ExpandDepth::Unbounded => (1, 15),
        };
        let start = match self.get_node(tx, node)? {
            Some(n) => n,
            None => return Ok(Vec::new()),
        };
        let mut results = Vec::new();
        let mut frontier = vec![Path::single(start.clone())];
        let mut depth_reached = 0usize;
        while depth_reached < max && !frontier.is_empty() {
            depth_reached += 1;
            let mut next_frontier = Vec::new();
            for path in &frontier {
                let tail = path.end().clone();
                let rels = self.get_relationships(tx, tail.id, dir, None)?;
                for rel in rels {
                    if !rel_types.is_empty() && !rel_types.iter().any(|t| *t == rel.rel_type) {
                        continue;
                    }
                    if path.contains_relationship(rel.id) {
                        continue;
                    }
                    let other_id = rel.other_node(tail.id).unwrap_or(tail.id);
                    let other = match self.get_node(tx, other_id)? {
                        Some(n) => n,
                        None => continue,
                    };
                    let mut extended = path.clone();
                    extended.append(rel, other);
                    if depth_reached >= min {
                        results.push(extended.clone());
                    }
                    next_frontier.push(extended);
                }
            }
            frontier = next_frontier;
        }
        Ok(results)
    }

    // ========================================================================
    // Index
    // ========================================================================

    /// Create an index on a label+property combination.
    fn create_index(&self, label: &str, property: &str, index_type: IndexType) -> Result<()>;

    /// Drop an index.
    fn drop_index(&self, label: &str, property: &str) -> Result<()>;

    /// List every index currently registered.
    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        Ok(Vec::new())
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of nodes.
    fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// All distinct labels in the graph.
    fn labels(&self, tx: &Self::Tx) -> Result<Vec<String>>;

    /// All distinct relationship types in the graph.
    fn relationship_types(&self, tx: &Self::Tx) -> Result<Vec<String>>;

    /// All distinct property keys in use on nodes or relationships.
    fn property_keys(&self, tx: &Self::Tx) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.all_nodes(tx)?
            .iter()
            .flat_map(|n| n.properties.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes (no label filter).
    fn all_nodes(&self, tx: &Self::Tx) -> Result<Vec<Node>>;

    /// Find all nodes with a given label.
    fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value (index-backed if available).
    fn nodes_by_property(&self, tx: &Self::Tx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>>;

    /// Find all relationships of a given type.
    ///
    /// Default: scans all nodes and collects outgoing relationships of that type.
    fn relationships_by_type(&self, tx: &Self::Tx, rel_type: &str) -> Result<Vec<Relationship>> {
        let mut result = Vec::new();
        for node in &self.all_nodes(tx)? {
            result.extend(self.get_relationships(tx, node.id, Direction::Outgoing, Some(rel_type))?);
        }
        Ok(result)
    }

    // ========================================================================
    // Snapshot reads for expression evaluation
    // ========================================================================
    //
    // `EXISTS { pattern }`, pattern comprehensions, and the `startNode()`/
    // `endNode()` functions run inside expression evaluation, which only
    // holds a `&B` (no open `Self::Tx`) — it is evaluated per-row, often
    // from deep inside a predicate or projection closure that was never
    // handed one. These wrap the tx-scoped reads above in their own
    // short-lived read-only transaction so expression evaluation can reach
    // storage without threading a transaction through every `eval_expr`
    // call site.

    /// All nodes with the given label, for use from expression evaluation.
    fn nodes_by_label_for_exists(&self, label: &str) -> Result<Vec<Node>> {
        let tx = self.begin_tx(TxMode::ReadOnly)?;
        let result = self.nodes_by_label(&tx, label);
        self.commit_tx(tx)?;
        result
    }

    /// All nodes, for use from expression evaluation.
    fn all_nodes_for_exists(&self) -> Result<Vec<Node>> {
        let tx = self.begin_tx(TxMode::ReadOnly)?;
        let result = self.all_nodes(&tx);
        self.commit_tx(tx)?;
        result
    }

    /// A single node by id, for use from expression evaluation.
    fn get_node_for_exists(&self, id: NodeId) -> Result<Option<Node>> {
        let tx = self.begin_tx(TxMode::ReadOnly)?;
        let result = self.get_node(&tx, id);
        self.commit_tx(tx)?;
        result
    }

    /// A node's relationships, for use from expression evaluation.
    fn get_relationships_for_exists(&self, node: NodeId, dir: Direction) -> Result<Vec<Relationship>> {
        let tx = self.begin_tx(TxMode::ReadOnly)?;
        let result = self.get_relationships(&tx, node, dir, None);
        self.commit_tx(tx)?;
        result
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Create a schema constraint. Neo4j: `CREATE CONSTRAINT ...`
    ///
    /// Default returns "not supported".
    fn create_constraint(&self, _label: &str, _property: &str, _kind: ConstraintKind) -> Result<()> {
        Err(Error::ExecutionError("constraints not supported by this backend".into()))
    }

    /// Drop a schema constraint.
    fn drop_constraint(&self, _label: &str, _property: &str) -> Result<()> {
        Err(Error::ExecutionError("constraints not supported by this backend".into()))
    }

    /// List every constraint currently registered.
    fn list_constraints(&self) -> Result<Vec<ConstraintDescriptor>> {
        Ok(Vec::new())
    }

    // ========================================================================
    // Full-text search
    // ========================================================================

    /// Create a full-text index over a label+property.
    fn create_fulltext_index(&self, _label: &str, _property: &str) -> Result<()> {
        Err(Error::ExecutionError("fulltext indexes not supported by this backend".into()))
    }

    /// Query a full-text index. Returns (node, score) pairs, highest score first.
    fn fulltext_query(&self, _tx: &Self::Tx, _label: &str, _property: &str, _query: &str) -> Result<Vec<(Node, f64)>> {
        Err(Error::ExecutionError("fulltext indexes not supported by this backend".into()))
    }

    /// Whether the backend's full-text engine is backed by SQLite FTS5
    /// (vs. a naive substring scan).
    fn has_fts5(&self) -> bool {
        false
    }

    // ========================================================================
    // Vector search
    // ========================================================================

    /// Register a vector index over a label+property, keyed by node id.
    ///
    /// Default returns "not supported"; backends that carry durable storage
    /// for embeddings (or an in-process ANN structure) override this.
    fn create_vector_index(
        &self,
        _name: &str,
        _label: &str,
        _property: &str,
        _dimensions: usize,
        _metric: VectorMetric,
        _method: VectorMethod,
    ) -> Result<()> {
        Err(Error::ExecutionError("vector indexes not supported by this backend".into()))
    }

    /// Drop a vector index and all its stored embeddings.
    fn drop_vector_index(&self, _name: &str) -> Result<()> {
        Err(Error::ExecutionError("vector indexes not supported by this backend".into()))
    }

    /// List every vector index currently registered.
    fn list_vector_indexes(&self) -> Result<Vec<VectorIndexDescriptor>> {
        Ok(Vec::new())
    }

    /// Store (or replace) the embedding for `node` in the named index.
    fn upsert_embedding(&self, _tx: &mut Self::Tx, _index: &str, _node: NodeId, _vector: Vec<f32>) -> Result<()> {
        Err(Error::ExecutionError("vector indexes not supported by this backend".into()))
    }

    /// Remove a node's embedding from the named index, if present. Called
    /// automatically on node deletion so a deleted node can never surface
    /// as a vector search hit.
    fn remove_embedding(&self, _tx: &mut Self::Tx, _index: &str, _node: NodeId) -> Result<()> {
        Ok(())
    }

    /// Find the `k` nearest neighbors of `query` in the named index.
    /// `candidate_multiplier` controls how many extra candidates an
    /// approximate index should over-fetch before any structural filtering
    /// or exact reranking is applied by the caller.
    fn vector_search(
        &self,
        _tx: &Self::Tx,
        _index: &str,
        _query: &[f32],
        _k: usize,
        _candidate_multiplier: usize,
    ) -> Result<Vec<VectorHit>> {
        Err(Error::ExecutionError("vector indexes not supported by this backend".into()))
    }

    // ========================================================================
    // Batch operations
    // ========================================================================

    /// Batch create nodes.
    ///
    /// Default falls back to sequential `create_node` calls.
    fn create_nodes_batch(&self, tx: &mut Self::Tx, nodes: Vec<(Vec<String>, PropertyMap)>) -> Result<Vec<NodeId>> {
        let mut ids = Vec::with_capacity(nodes.len());
        for (labels, props) in nodes {
            let label_refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
            ids.push(self.create_node(tx, &label_refs, props)?);
        }
        Ok(ids)
    }

    /// Batch create relationships.
    ///
    /// Default falls back to sequential `create_relationship` calls.
    fn create_relationships_batch(
        &self,
        tx: &mut Self::Tx,
        rels: Vec<(NodeId, NodeId, String, PropertyMap)>,
    ) -> Result<Vec<RelId>> {
        let mut ids = Vec::with_capacity(rels.len());
        for (src, dst, rel_type, props) in rels {
            ids.push(self.create_relationship(tx, src, dst, &rel_type, props)?);
        }
        Ok(ids)
    }

    // ========================================================================
    // Escape hatches
    // ========================================================================

    /// Pass-through for backend-native queries (e.g. raw SQL against the
    /// relational substrate). Not every backend supports this.
    fn execute_raw(&self, _tx: &Self::Tx, _query: &str, _params: PropertyMap) -> Result<ProcedureResult> {
        Err(Error::ExecutionError("raw query execution not supported".into()))
    }

    /// Call a registered procedure. Neo4j: `CALL name(args) YIELD cols`.
    fn call_procedure(&self, _tx: &Self::Tx, _name: &str, _args: Vec<Value>) -> Result<ProcedureResult> {
        Err(Error::ExecutionError("procedures not supported".into()))
    }

    // ========================================================================
    // Capability negotiation
    // ========================================================================

    /// Report what this backend can do. The planner consults this to choose
    /// between e.g. an index lookup and a full label scan.
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}

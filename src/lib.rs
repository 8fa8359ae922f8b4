//! # graphene — embeddable property graph database
//!
//! An in-process graph database exposing a Neo4j-compatible data model —
//! multi-labeled nodes, typed directed relationships, JSON-valued
//! properties — queried through a Cypher-dialect query language, with a
//! pluggable vector-search subsystem for nearest-neighbor lookups over
//! node embeddings.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between query engine and storage
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value` cross all boundaries
//! 3. **Parser owns nothing**: Cypher → AST is a pure function
//! 4. **Backend-agnostic planner**: logical plans don't know about storage
//! 5. **Synchronous core**: single-writer/multi-reader, no async runtime required
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphene::{Graph, Node, Value, PropertyMap};
//!
//! # fn example() -> graphene::Result<()> {
//! let graph = Graph::open_memory()?;
//!
//! let mut params = PropertyMap::new();
//! params.insert("name".into(), Value::from("Ada"));
//! graph.mutate("CREATE (n:Person {name: $name})", params)?;
//!
//! let result = graph.execute("MATCH (n:Person) RETURN n", PropertyMap::new())?;
//! for row in &result.rows {
//!     println!("{:?}", row.get::<Node>("n")?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `storage::memory` | Pure-Rust reference implementation, no durability |
//! | `SqliteBackend` | `storage::sqlite` | Production backend over a single SQLite connection |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod cypher;
pub mod planner;
pub mod execution;
pub mod storage;
pub mod tx;
pub mod index;
pub mod vector;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Path, Value, PropertyMap,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{
    StorageBackend, BackendConfig, ConstraintType,
    BackendCapabilities, ProcedureResult, ExpandDepth,
};

// ============================================================================
// Re-exports: Index / vector descriptors
// ============================================================================

pub use index::{ConstraintKind, ConstraintDescriptor, IndexDescriptor, IndexType, VectorIndexDescriptor, VectorMetric, VectorMethod};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Re-exports: Execution
// ============================================================================

pub use execution::{QueryResult, ResultRow};

use std::sync::Arc;
use parking_lot::Mutex;

/// A scoring function used to exactly rerank a vector-search candidate set.
/// Receives the original query vector and a candidate node; returns a
/// "higher is better" score. Registering one lets a caller plug in a richer
/// similarity (e.g. one that also consults node properties) without the
/// crate depending on any particular embedding model.
pub type RerankFn = Arc<dyn Fn(&[f32], &Node) -> f64 + Send + Sync>;

/// The primary entry point. A `Graph` wraps a storage backend and provides
/// Cypher execution plus a set of programmatic convenience operations that
/// mirror what the Cypher surface can already express.
pub struct Graph<B: StorageBackend> {
    backend: B,
    config: BackendConfig,
    reranker: Mutex<Option<RerankFn>>,
}

impl<B: StorageBackend> Graph<B> {
    /// Create a Graph with the given backend and default configuration.
    pub fn with_backend(backend: B) -> Self {
        Self { backend, config: BackendConfig::default(), reranker: Mutex::new(None) }
    }

    /// Create a Graph with the given backend and configuration.
    pub fn with_backend_and_config(backend: B, config: BackendConfig) -> Self {
        Self { backend, config, reranker: Mutex::new(None) }
    }

    // ========================================================================
    // Cypher execution
    // ========================================================================

    /// Execute a read-only Cypher query with parameters.
    pub fn execute<P>(&self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        tracing::debug!(query, "executing read-only statement");
        let start = std::time::Instant::now();

        let params: PropertyMap = params.into();
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &params)?;
        let optimized = planner::optimize(logical)?;

        let mut tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let result = execution::execute(&self.backend, &mut tx, &optimized, params)?;
        self.backend.commit_tx(tx)?;

        tracing::info!(rows = result.rows.len(), elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "statement executed");
        Ok(result)
    }

    /// Execute a write query (CREATE, MERGE, DELETE, SET, etc.)
    pub fn mutate<P>(&self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        tracing::debug!(query, "executing write statement");
        let start = std::time::Instant::now();

        let params: PropertyMap = params.into();
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &params)?;
        let optimized = planner::optimize(logical)?;

        let mut tx = self.backend.begin_tx(TxMode::ReadWrite)?;
        let result = match execution::execute(&self.backend, &mut tx, &optimized, params) {
            Ok(r) => r,
            Err(e) => {
                self.backend.rollback_tx(tx)?;
                if matches!(e, Error::ConstraintViolation(_)) {
                    tracing::warn!(query, error = %e, "write statement aborted by constraint violation");
                }
                return Err(e);
            }
        };
        self.backend.commit_tx(tx)?;

        tracing::info!(rows = result.rows.len(), elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "statement executed");
        Ok(result)
    }

    /// Begin an explicit transaction spanning several statements. Entering
    /// the scope acquires whatever the backend's writer/reader discipline
    /// requires; the `ExplicitTx`'s `Drop` guarantees release on every exit
    /// path (commit, rollback, or an early return that never calls either).
    pub fn begin(&self, mode: TxMode) -> Result<ExplicitTx<'_, B>> {
        let tx = self.backend.begin_tx(mode)?;
        tracing::debug!(tx = tx.id().0, ?mode, "began explicit transaction scope");
        Ok(ExplicitTx { graph: self, tx: Some(tx) })
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ========================================================================
    // Traversal convenience
    // ========================================================================

    /// Relationships incident to `node`, optionally filtered by direction
    /// and type.
    pub fn get_neighbors(&self, node: NodeId, dir: Direction, rel_type: Option<&str>) -> Result<Vec<Relationship>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let rels = self.backend.get_relationships(&tx, node, dir, rel_type)?;
        self.backend.commit_tx(tx)?;
        Ok(rels)
    }

    /// All walks between `from` and `to` of exactly `hops` relationships.
    pub fn find_path(&self, from: NodeId, to: NodeId, rel_types: &[&str], hops: usize) -> Result<Vec<Path>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let paths = self.backend.expand(&tx, from, Direction::Both, rel_types, ExpandDepth::Exact(hops))?;
        self.backend.commit_tx(tx)?;
        Ok(paths.into_iter().filter(|p| p.end().id == to).collect())
    }

    /// The shortest walk between `from` and `to`, up to `max_hops`, or
    /// `None` if they are not connected within that bound.
    pub fn find_shortest_path(&self, from: NodeId, to: NodeId, rel_types: &[&str], max_hops: usize) -> Result<Option<Path>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let paths = self.backend.expand(&tx, from, Direction::Both, rel_types, ExpandDepth::Range { min: 1, max: max_hops })?;
        self.backend.commit_tx(tx)?;
        Ok(paths.into_iter().filter(|p| p.end().id == to).min_by_key(|p| p.len()))
    }

    // ========================================================================
    // Schema: property indexes & constraints
    // ========================================================================

    pub fn create_node_index(&self, label: &str, property: &str) -> Result<()> {
        self.backend.create_index(label, property, IndexType::BTree)
    }

    pub fn create_fulltext_index(&self, label: &str, property: &str) -> Result<()> {
        self.backend.create_fulltext_index(label, property)
    }

    pub fn create_constraint(&self, label: &str, property: &str, kind: ConstraintKind) -> Result<()> {
        self.backend.create_constraint(label, property, kind)
    }

    pub fn drop_constraint(&self, label: &str, property: &str) -> Result<()> {
        self.backend.drop_constraint(label, property)
    }

    pub fn list_constraints(&self) -> Result<Vec<ConstraintDescriptor>> {
        self.backend.list_constraints()
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        self.backend.list_indexes()
    }

    pub fn drop_index(&self, label: &str, property: &str) -> Result<()> {
        self.backend.drop_index(label, property)
    }

    // ========================================================================
    // Full-text search
    // ========================================================================

    pub fn text_search(&self, label: &str, property: &str, query: &str) -> Result<Vec<(Node, f64)>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let hits = self.backend.fulltext_query(&tx, label, property, query)?;
        self.backend.commit_tx(tx)?;
        Ok(hits)
    }

    pub fn has_fts5(&self) -> bool {
        self.backend.has_fts5()
    }

    // ========================================================================
    // Vector search
    // ========================================================================

    /// Create a vector index using the exact/flat method — always
    /// available, regardless of which ANN backends are compiled in. Use
    /// [`Graph::create_vector_index_with_method`] to opt into an
    /// approximate index.
    pub fn create_vector_index(&self, name: &str, label: &str, property: &str, dimensions: usize, metric: VectorMetric) -> Result<()> {
        self.backend.create_vector_index(name, label, property, dimensions, metric, VectorMethod::Flat)
    }

    /// Create a vector index with an explicit ANN method. Requesting
    /// `VectorMethod::Hnsw` without the crate's `ann_hnsw` feature fails
    /// here, at creation time, not at search time (spec.md's "Optional
    /// backends" design note).
    pub fn create_vector_index_with_method(&self, name: &str, label: &str, property: &str, dimensions: usize, metric: VectorMetric, method: VectorMethod) -> Result<()> {
        self.backend.create_vector_index(name, label, property, dimensions, metric, method)
    }

    pub fn drop_vector_index(&self, name: &str) -> Result<()> {
        self.backend.drop_vector_index(name)
    }

    pub fn list_vector_indexes(&self) -> Result<Vec<VectorIndexDescriptor>> {
        self.backend.list_vector_indexes()
    }

    pub fn upsert_embedding(&self, index: &str, node: NodeId, vector: Vec<f32>) -> Result<()> {
        let mut tx = self.backend.begin_tx(TxMode::ReadWrite)?;
        let result = self.backend.upsert_embedding(&mut tx, index, node, vector);
        match result {
            Ok(()) => { self.backend.commit_tx(tx)?; Ok(()) }
            Err(e) => { self.backend.rollback_tx(tx)?; Err(e) }
        }
    }

    pub fn upsert_embeddings(&self, index: &str, entries: Vec<(NodeId, Vec<f32>)>) -> Result<()> {
        let mut tx = self.backend.begin_tx(TxMode::ReadWrite)?;
        for (node, vector) in entries {
            if let Err(e) = self.backend.upsert_embedding(&mut tx, index, node, vector) {
                self.backend.rollback_tx(tx)?;
                return Err(e);
            }
        }
        self.backend.commit_tx(tx)?;
        Ok(())
    }

    /// Register a reranking function applied to every `semantic_search`
    /// candidate after the ANN/structural stage. Pass `None` to clear it.
    pub fn register_reranker(&self, reranker: Option<RerankFn>) {
        *self.reranker.lock() = reranker;
    }

    /// Nearest-neighbor search over a named vector index, with optional
    /// structural filtering by label and exact reranking (via whatever
    /// function was last passed to `register_reranker`).
    pub fn semantic_search(&self, index: &str, query: Vec<f32>, k: usize, label_filter: Option<&str>) -> Result<Vec<(Node, f64)>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let multiplier = self.config.vector_default_candidate_multiplier;
        let hits = self.backend.vector_search(&tx, index, &query, k, multiplier)?;
        let mut out = Vec::new();
        for (node_id, score) in hits {
            let Some(node) = self.backend.get_node(&tx, node_id)? else { continue };
            if let Some(label) = label_filter {
                if !node.has_label(label) {
                    continue;
                }
            }
            let final_score = match self.reranker.lock().as_ref() {
                Some(reranker) => reranker(&query, &node),
                None => score,
            };
            out.push((node, final_score));
        }
        self.backend.commit_tx(tx)?;
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(k);
        Ok(out)
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    pub fn get_node_count(&self) -> Result<u64> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let n = self.backend.node_count(&tx)?;
        self.backend.commit_tx(tx)?;
        Ok(n)
    }

    pub fn get_relationship_count(&self) -> Result<u64> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let n = self.backend.relationship_count(&tx)?;
        self.backend.commit_tx(tx)?;
        Ok(n)
    }

    pub fn get_all_labels(&self) -> Result<Vec<String>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let labels = self.backend.labels(&tx)?;
        self.backend.commit_tx(tx)?;
        Ok(labels)
    }

    pub fn get_all_relationship_types(&self) -> Result<Vec<String>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly)?;
        let types = self.backend.relationship_types(&tx)?;
        self.backend.commit_tx(tx)?;
        Ok(types)
    }
}

/// In-memory graph for testing and embedding.
impl Graph<storage::MemoryBackend> {
    pub fn open_memory() -> Result<Self> {
        Ok(Self::with_backend(storage::MemoryBackend::new()))
    }
}

/// SQLite-backed graph for durable, single-process embedding.
impl Graph<storage::SqliteBackend> {
    pub fn open_sqlite(config: BackendConfig) -> Result<Self> {
        let backend = storage::SqliteBackend::open(&config)?;
        Ok(Self::with_backend_and_config(backend, config))
    }
}

/// Explicit transaction handle spanning multiple statements. The writer
/// lock (if any) is released on every exit path — `commit`, `rollback`, or
/// an unhandled drop, which rolls back.
pub struct ExplicitTx<'g, B: StorageBackend> {
    graph: &'g Graph<B>,
    tx: Option<B::Tx>,
}

impl<'g, B: StorageBackend> ExplicitTx<'g, B> {
    pub fn execute<P>(&mut self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        let params: PropertyMap = params.into();
        let ast = cypher::parse(query)?;
        let logical = planner::plan(&ast, &params)?;
        let optimized = planner::optimize(logical)?;
        let tx = self.tx.as_mut().ok_or_else(|| Error::TxError("transaction already closed".into()))?;
        execution::execute(&self.graph.backend, tx, &optimized, params)
    }

    pub fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| Error::TxError("transaction already closed".into()))?;
        tracing::debug!(tx = tx.id().0, "committing explicit transaction scope");
        self.graph.backend.commit_tx(tx)
    }

    pub fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| Error::TxError("transaction already closed".into()))?;
        tracing::debug!(tx = tx.id().0, "rolling back explicit transaction scope");
        self.graph.backend.rollback_tx(tx)
    }
}

impl<'g, B: StorageBackend> Drop for ExplicitTx<'g, B> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::debug!(tx = tx.id().0, "rolling back explicit transaction scope on drop without explicit commit/rollback");
            let _ = self.graph.backend.rollback_tx(tx);
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cypher syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Semantic error: {0}")]
    SemanticError(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Planning error: {0}")]
    PlanError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Index and constraint descriptors.
//!
//! These are the schema-catalog types shared between the storage layer
//! (which persists them) and the planner (which consults them when
//! choosing between a label scan and an index lookup).

use serde::{Deserialize, Serialize};

/// Type of index to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    /// B-tree index for equality and range queries.
    BTree,
    /// Full-text search index.
    FullText,
    /// Unique constraint (implies B-tree).
    Unique,
    /// Vector similarity index, keyed by node id.
    Vector,
}

/// A single property index registered on a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub label: String,
    pub property: String,
    pub index_type: IndexType,
}

impl IndexDescriptor {
    pub fn new(label: impl Into<String>, property: impl Into<String>, index_type: IndexType) -> Self {
        Self { label: label.into(), property: property.into(), index_type }
    }
}

/// A constraint on a label+property pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Property value must be unique across nodes with this label.
    Unique,
    /// Property must be present on every node with this label.
    Exists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub label: String,
    pub property: String,
    pub kind: ConstraintKind,
}

impl ConstraintDescriptor {
    pub fn new(label: impl Into<String>, property: impl Into<String>, kind: ConstraintKind) -> Self {
        Self { label: label.into(), property: property.into(), kind }
    }
}

/// Distance metric a vector index compares under. The score convention at
/// the query surface is always "higher is better"; each metric documents
/// how its raw distance is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorMetric {
    /// Euclidean distance, converted to a score via `1 / (1 + d)`.
    L2,
    /// Raw inner product — already "higher is better".
    Dot,
    /// Cosine similarity in `[-1, 1]` — already "higher is better".
    Cosine,
}

impl VectorMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMetric::L2 => "l2",
            VectorMetric::Dot => "dot",
            VectorMetric::Cosine => "cosine",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Some(VectorMetric::L2),
            "dot" | "ip" | "inner_product" => Some(VectorMetric::Dot),
            "cosine" => Some(VectorMetric::Cosine),
            _ => None,
        }
    }

    /// Convert a raw distance/similarity value into a "higher is better" score.
    pub fn score(&self, raw: f64) -> f64 {
        match self {
            VectorMetric::L2 => 1.0 / (1.0 + raw),
            VectorMetric::Dot | VectorMetric::Cosine => raw,
        }
    }
}

/// Which concrete ANN implementation backs a vector index (spec.md §4.5's
/// "method" option). `Flat` is the mandatory exact fallback; `Hnsw` is the
/// approximate implementation, available only when the crate is built with
/// the `ann_hnsw` feature (default-on) — requesting it without the feature
/// fails at `create_vector_index` time, never at search time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorMethod {
    Flat,
    Hnsw,
}

impl Default for VectorMethod {
    fn default() -> Self {
        VectorMethod::Flat
    }
}

impl VectorMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMethod::Flat => "flat",
            VectorMethod::Hnsw => "hnsw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" | "exact" => Some(VectorMethod::Flat),
            "hnsw" => Some(VectorMethod::Hnsw),
            _ => None,
        }
    }
}

/// A registered vector index: which label+property it embeds, its
/// dimensionality, and the metric it compares under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexDescriptor {
    pub name: String,
    pub label: String,
    pub property: String,
    pub dimensions: usize,
    pub metric: VectorMetric,
    pub method: VectorMethod,
}

impl VectorIndexDescriptor {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        property: impl Into<String>,
        dimensions: usize,
        metric: VectorMetric,
        method: VectorMethod,
    ) -> Self {
        Self { name: name.into(), label: label.into(), property: property.into(), dimensions, metric, method }
    }
}

//! Pure-Rust in-memory storage backend.
//!
//! Reference implementation used by the parser/planner/execution test
//! suite. It enforces the same constraint and uniqueness semantics as
//! `SqliteBackend`, but keeps no durable state — everything is lost when
//! the process exits. Do not use this backend where durability matters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::index::{ConstraintDescriptor, ConstraintKind, IndexDescriptor, IndexType, VectorIndexDescriptor, VectorMetric, VectorMethod};
use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::vector::{AnnIndex, FlatIndex, VectorHit};
use crate::{Error, Result};

use super::{BackendCapabilities, ExpandDepth, ProcedureResult, StorageBackend};

struct VectorIndexEntry {
    descriptor: VectorIndexDescriptor,
    index: Box<dyn AnnIndex>,
}

#[derive(Default)]
struct GraphData {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelId, Relationship>,
    next_node_id: u64,
    next_rel_id: u64,
    indexes: Vec<IndexDescriptor>,
    constraints: Vec<ConstraintDescriptor>,
    vector_indexes: HashMap<String, VectorIndexEntry>,
}

/// In-memory, non-durable `StorageBackend`.
pub struct MemoryBackend {
    data: RwLock<GraphData>,
    writer_lock: Arc<Mutex<()>>,
    next_tx_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(GraphData::default()),
            writer_lock: Arc::new(Mutex::new(())),
            next_tx_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction handle for `MemoryBackend`.
///
/// Write transactions carry an owned guard on the backend's writer lock,
/// acquired in `begin_tx` and released on commit/rollback — this is the
/// single-writer/multi-reader discipline the rest of the crate assumes.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    _write_guard: Option<parking_lot::ArcMutexGuard<parking_lot::RawMutex, ()>>,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn id(&self) -> TxId {
        self.id
    }
}

fn check_constraints(
    data: &GraphData,
    labels: &[String],
    props: &PropertyMap,
    exclude: Option<NodeId>,
) -> Result<()> {
    for c in &data.constraints {
        if !labels.iter().any(|l| l == &c.label) {
            continue;
        }
        match c.kind {
            ConstraintKind::Exists => {
                if !props.contains_key(&c.property) {
                    return Err(Error::ConstraintViolation(format!(
                        "node with label {} is missing required property {}",
                        c.label, c.property
                    )));
                }
            }
            ConstraintKind::Unique => {
                if let Some(val) = props.get(&c.property) {
                    let clash = data.nodes.values().any(|n| {
                        Some(n.id) != exclude
                            && n.has_label(&c.label)
                            && n.properties.get(&c.property) == Some(val)
                    });
                    if clash {
                        return Err(Error::ConstraintViolation(format!(
                            "uniqueness constraint violated for {}.{}",
                            c.label, c.property
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx> {
        let id = TxId(self.next_tx_id.fetch_add(1, Ordering::SeqCst));
        let guard = match mode {
            TxMode::ReadWrite => Some(self.writer_lock.lock_arc()),
            TxMode::ReadOnly => None,
        };
        Ok(MemoryTx { id, mode, _write_guard: guard })
    }

    fn commit_tx(&self, _tx: Self::Tx) -> Result<()> {
        Ok(())
    }

    fn rollback_tx(&self, _tx: Self::Tx) -> Result<()> {
        Ok(())
    }

    fn create_node(&self, _tx: &mut Self::Tx, labels: &[&str], props: PropertyMap) -> Result<NodeId> {
        let mut data = self.data.write();
        let owned_labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        check_constraints(&data, &owned_labels, &props, None)?;
        data.next_node_id += 1;
        let id = NodeId(data.next_node_id);
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let node = Node::new(id).with_labels(owned_labels).with_created_at(created_at);
        let node = props.into_iter().fold(node, |n, (k, v)| n.with_property(k, v));
        data.nodes.insert(id, node);
        Ok(id)
    }

    fn get_node(&self, _tx: &Self::Tx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.data.read().nodes.get(&id).cloned())
    }

    fn delete_node(&self, _tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let mut data = self.data.write();
        let connected = data.relationships.values().any(|r| r.src == id || r.dst == id);
        if connected {
            return Err(Error::ConstraintViolation(format!(
                "cannot delete node {id} with existing relationships; use DETACH DELETE"
            )));
        }
        for entry in data.vector_indexes.values_mut() {
            entry.index.remove(id);
        }
        Ok(data.nodes.remove(&id).is_some())
    }

    fn set_node_property(&self, _tx: &mut Self::Tx, id: NodeId, key: &str, val: Value) -> Result<()> {
        let mut data = self.data.write();
        let labels = data.nodes.get(&id).map(|n| n.labels.clone()).unwrap_or_default();
        let mut probe = PropertyMap::new();
        probe.insert(key.to_string(), val.clone());
        check_constraints(&data, &labels, &probe, Some(id))?;
        let node = data.nodes.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.insert(key.to_string(), val);
        Ok(())
    }

    fn remove_node_property(&self, _tx: &mut Self::Tx, id: NodeId, key: &str) -> Result<()> {
        let mut data = self.data.write();
        let node = data.nodes.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.remove(key);
        Ok(())
    }

    fn add_label(&self, _tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()> {
        let mut data = self.data.write();
        let node = data.nodes.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        if !node.has_label(label) {
            node.labels.push(label.to_string());
        }
        Ok(())
    }

    fn remove_label(&self, _tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()> {
        let mut data = self.data.write();
        let node = data.nodes.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.labels.retain(|l| l != label);
        Ok(())
    }

    fn create_relationship(
        &self,
        _tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        let mut data = self.data.write();
        if !data.nodes.contains_key(&src) {
            return Err(Error::NotFound(format!("node {src}")));
        }
        if !data.nodes.contains_key(&dst) {
            return Err(Error::NotFound(format!("node {dst}")));
        }
        data.next_rel_id += 1;
        let id = RelId(data.next_rel_id);
        let rel = props.into_iter().fold(
            Relationship::new(id, src, dst, rel_type),
            |r, (k, v)| r.with_property(k, v),
        );
        data.relationships.insert(id, rel);
        Ok(id)
    }

    fn get_relationship(&self, _tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.data.read().relationships.get(&id).cloned())
    }

    fn delete_relationship(&self, _tx: &mut Self::Tx, id: RelId) -> Result<bool> {
        Ok(self.data.write().relationships.remove(&id).is_some())
    }

    fn set_relationship_property(&self, _tx: &mut Self::Tx, id: RelId, key: &str, val: Value) -> Result<()> {
        let mut data = self.data.write();
        let rel = data.relationships.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.insert(key.to_string(), val);
        Ok(())
    }

    fn remove_relationship_property(&self, _tx: &mut Self::Tx, id: RelId, key: &str) -> Result<()> {
        let mut data = self.data.write();
        let rel = data.relationships.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.remove(key);
        Ok(())
    }

    fn get_relationships(
        &self,
        _tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let data = self.data.read();
        Ok(data.relationships.values()
            .filter(|r| match dir {
                Direction::Outgoing => r.src == node,
                Direction::Incoming => r.dst == node,
                Direction::Both => r.src == node || r.dst == node,
            })
            .filter(|r| rel_type.is_none_or(|t| r.rel_type == t))
            .cloned()
            .collect())
    }

    fn create_index(&self, label: &str, property: &str, index_type: IndexType) -> Result<()> {
        let mut data = self.data.write();
        let descriptor = IndexDescriptor::new(label, property, index_type);
        if !data.indexes.contains(&descriptor) {
            data.indexes.push(descriptor);
        }
        Ok(())
    }

    fn drop_index(&self, label: &str, property: &str) -> Result<()> {
        let mut data = self.data.write();
        data.indexes.retain(|d| !(d.label == label && d.property == property));
        Ok(())
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        Ok(self.data.read().indexes.clone())
    }

    fn node_count(&self, _tx: &Self::Tx) -> Result<u64> {
        Ok(self.data.read().nodes.len() as u64)
    }

    fn relationship_count(&self, _tx: &Self::Tx) -> Result<u64> {
        Ok(self.data.read().relationships.len() as u64)
    }

    fn labels(&self, _tx: &Self::Tx) -> Result<Vec<String>> {
        let data = self.data.read();
        let mut labels: Vec<String> = data.nodes.values().flat_map(|n| n.labels.clone()).collect();
        labels.sort();
        labels.dedup();
        Ok(labels)
    }

    fn relationship_types(&self, _tx: &Self::Tx) -> Result<Vec<String>> {
        let data = self.data.read();
        let mut types: Vec<String> = data.relationships.values().map(|r| r.rel_type.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    fn all_nodes(&self, _tx: &Self::Tx) -> Result<Vec<Node>> {
        Ok(self.data.read().nodes.values().cloned().collect())
    }

    fn nodes_by_label(&self, _tx: &Self::Tx, label: &str) -> Result<Vec<Node>> {
        Ok(self.data.read().nodes.values().filter(|n| n.has_label(label)).cloned().collect())
    }

    fn nodes_by_property(&self, _tx: &Self::Tx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
        Ok(self.data.read().nodes.values()
            .filter(|n| n.has_label(label) && n.get(key) == Some(value))
            .cloned()
            .collect())
    }

    fn create_constraint(&self, label: &str, property: &str, kind: ConstraintKind) -> Result<()> {
        let mut data = self.data.write();
        let descriptor = ConstraintDescriptor::new(label, property, kind);
        if !data.constraints.contains(&descriptor) {
            data.constraints.push(descriptor);
        }
        Ok(())
    }

    fn drop_constraint(&self, label: &str, property: &str) -> Result<()> {
        let mut data = self.data.write();
        data.constraints.retain(|c| !(c.label == label && c.property == property));
        Ok(())
    }

    fn list_constraints(&self) -> Result<Vec<ConstraintDescriptor>> {
        Ok(self.data.read().constraints.clone())
    }

    fn create_fulltext_index(&self, label: &str, property: &str) -> Result<()> {
        self.create_index(label, property, IndexType::FullText)
    }

    fn fulltext_query(&self, tx: &Self::Tx, label: &str, property: &str, query: &str) -> Result<Vec<(Node, f64)>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<(Node, f64)> = self.nodes_by_label(tx, label)?
            .into_iter()
            .filter_map(|n| {
                let haystack = n.get(property)?.as_str()?.to_lowercase();
                let count = haystack.matches(&needle).count();
                if count > 0 {
                    Some((n, count as f64))
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    fn has_fts5(&self) -> bool {
        false
    }

    fn create_vector_index(
        &self,
        name: &str,
        label: &str,
        property: &str,
        dimensions: usize,
        metric: VectorMetric,
        method: VectorMethod,
    ) -> Result<()> {
        let index: Box<dyn AnnIndex> = match method {
            VectorMethod::Flat => Box::new(FlatIndex::new(dimensions, metric)),
            VectorMethod::Hnsw => {
                if metric != VectorMetric::L2 {
                    return Err(Error::ExecutionError(format!(
                        "hnsw vector index method only supports the l2 metric, got {}", metric.as_str()
                    )));
                }
                #[cfg(feature = "ann_hnsw")]
                {
                    Box::new(crate::vector::HnswIndex::new(dimensions, 16, 200))
                }
                #[cfg(not(feature = "ann_hnsw"))]
                {
                    return Err(Error::BackendUnavailable(
                        "hnsw vector index method requires the crate's `ann_hnsw` feature".into(),
                    ));
                }
            }
        };
        let mut data = self.data.write();
        let descriptor = VectorIndexDescriptor::new(name, label, property, dimensions, metric, method);
        data.vector_indexes.insert(name.to_string(), VectorIndexEntry { descriptor, index });
        Ok(())
    }

    fn drop_vector_index(&self, name: &str) -> Result<()> {
        self.data.write().vector_indexes.remove(name);
        Ok(())
    }

    fn list_vector_indexes(&self) -> Result<Vec<VectorIndexDescriptor>> {
        Ok(self.data.read().vector_indexes.values().map(|e| e.descriptor.clone()).collect())
    }

    fn upsert_embedding(&self, _tx: &mut Self::Tx, index: &str, node: NodeId, vector: Vec<f32>) -> Result<()> {
        let mut data = self.data.write();
        let entry = data.vector_indexes.get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("vector index {index}")))?;
        entry.index.add(node, vector)
    }

    fn remove_embedding(&self, _tx: &mut Self::Tx, index: &str, node: NodeId) -> Result<()> {
        if let Some(entry) = self.data.write().vector_indexes.get_mut(index) {
            entry.index.remove(node);
        }
        Ok(())
    }

    fn vector_search(
        &self,
        _tx: &Self::Tx,
        index: &str,
        query: &[f32],
        k: usize,
        candidate_multiplier: usize,
    ) -> Result<Vec<VectorHit>> {
        let data = self.data.read();
        let entry = data.vector_indexes.get(index)
            .ok_or_else(|| Error::NotFound(format!("vector index {index}")))?;
        entry.index.search(query, k.saturating_mul(candidate_multiplier.max(1)))
    }

    fn call_procedure(&self, tx: &Self::Tx, name: &str, args: Vec<Value>) -> Result<ProcedureResult> {
        match name {
            "db.labels" => {
                let rows = self.labels(tx)?.into_iter()
                    .map(|l| HashMap::from([("label".to_string(), Value::String(l))]))
                    .collect();
                Ok(ProcedureResult { columns: vec!["label".into()], rows })
            }
            "db.relationshipTypes" => {
                let rows = self.relationship_types(tx)?.into_iter()
                    .map(|t| HashMap::from([("relationshipType".to_string(), Value::String(t))]))
                    .collect();
                Ok(ProcedureResult { columns: vec!["relationshipType".into()], rows })
            }
            "db.propertyKeys" => {
                let rows = self.property_keys(tx)?.into_iter()
                    .map(|k| HashMap::from([("propertyKey".to_string(), Value::String(k))]))
                    .collect();
                Ok(ProcedureResult { columns: vec!["propertyKey".into()], rows })
            }
            "db.vector.search" => super::procedures::vector_search(self, tx, args),
            "db.index.fulltext.query" => super::procedures::fulltext_query(self, tx, args),
            other => Err(Error::ExecutionError(format!("unknown procedure: {other}"))),
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_vector_index: true,
            supports_fulltext_index: true,
            supports_procedures: true,
            supports_batch_writes: true,
            supports_constraints: true,
            max_batch_size: None,
            supported_procedures: vec![
                "db.labels".into(),
                "db.relationshipTypes".into(),
                "db.propertyKeys".into(),
                "db.vector.search".into(),
                "db.index.fulltext.query".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
    }

    #[test]
    fn test_create_and_get_node() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let id = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.commit_tx(tx).unwrap();

        let tx = b.begin_tx(TxMode::ReadOnly).unwrap();
        let node = b.get_node(&tx, id).unwrap().unwrap();
        assert!(node.has_label("Person"));
    }

    #[test]
    fn test_create_relationship() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let rel_id = b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();
        b.commit_tx(tx).unwrap();

        let tx = b.begin_tx(TxMode::ReadOnly).unwrap();
        let rel = b.get_relationship(&tx, rel_id).unwrap().unwrap();
        assert_eq!(rel.rel_type, "KNOWS");
        assert_eq!(rel.src, a);
        assert_eq!(rel.dst, c);
    }

    #[test]
    fn test_cannot_delete_connected_node() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();

        assert!(b.delete_node(&mut tx, a).is_err());
    }

    #[test]
    fn test_all_nodes() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.create_node(&mut tx, &["Company"], PropertyMap::new()).unwrap();
        assert_eq!(b.all_nodes(&tx).unwrap().len(), 2);
    }

    #[test]
    fn test_detach_delete_node() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();

        assert!(b.detach_delete_node(&mut tx, a).unwrap());
        assert!(b.get_node(&tx, a).unwrap().is_none());
        assert_eq!(b.relationship_count(&tx).unwrap(), 0);
    }

    #[test]
    fn test_relationship_properties() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let rel_id = b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();
        b.set_relationship_property(&mut tx, rel_id, "since", Value::Int(2020)).unwrap();

        let rel = b.get_relationship(&tx, rel_id).unwrap().unwrap();
        assert_eq!(rel.properties.get("since"), Some(&Value::Int(2020)));
    }

    #[test]
    fn test_relationships_by_type() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();
        b.create_relationship(&mut tx, a, c, "FOLLOWS", PropertyMap::new()).unwrap();

        assert_eq!(b.relationships_by_type(&tx, "KNOWS").unwrap().len(), 1);
    }

    #[test]
    fn test_traversal() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let d = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();
        b.create_relationship(&mut tx, c, d, "KNOWS", PropertyMap::new()).unwrap();

        let paths = b.expand(&tx, a, Direction::Outgoing, &["KNOWS"], ExpandDepth::Range { min: 1, max: 2 }).unwrap();
        assert!(paths.iter().any(|p| p.end().id == d));
    }

    #[test]
    fn test_unique_constraint_enforced() {
        let b = backend();
        b.create_constraint("Person", "email", ConstraintKind::Unique).unwrap();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let mut props = PropertyMap::new();
        props.insert("email".into(), Value::String("a@example.com".into()));
        b.create_node(&mut tx, &["Person"], props.clone()).unwrap();
        assert!(b.create_node(&mut tx, &["Person"], props).is_err());
    }

    #[test]
    fn test_exists_constraint_enforced() {
        let b = backend();
        b.create_constraint("Person", "name", ConstraintKind::Exists).unwrap();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        assert!(b.create_node(&mut tx, &["Person"], PropertyMap::new()).is_err());
    }
}

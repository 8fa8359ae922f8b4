//! SQLite-backed storage.
//!
//! The production backend: one `rusqlite::Connection` over a normalized
//! relational schema (nodes / node_labels / relationships keyed by
//! synthetic integer ids, properties carried as a JSON blob column using
//! the codec in `model::value`). Transactions are real SQLite
//! transactions — `BEGIN IMMEDIATE` for writers, `BEGIN DEFERRED` for
//! readers — serialized on the connection by a single-writer lock so two
//! write transactions never interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::index::{ConstraintDescriptor, ConstraintKind, IndexDescriptor, IndexType, VectorIndexDescriptor, VectorMetric, VectorMethod};
use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::vector::{exact_rerank, VectorHit};
use crate::{Error, Result};

use super::{BackendCapabilities, BackendConfig, ProcedureResult, StorageBackend};

const SCHEMA_VERSION: i64 = 1;

pub struct SqliteBackend {
    conn: Mutex<Connection>,
    writer_lock: Arc<Mutex<()>>,
    next_tx_id: AtomicU64,
    fulltext_enabled: bool,
    has_fts5: bool,
}

pub struct SqliteTx {
    id: TxId,
    mode: TxMode,
    _write_guard: Option<parking_lot::ArcMutexGuard<parking_lot::RawMutex, ()>>,
}

impl Transaction for SqliteTx {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn id(&self) -> TxId {
        self.id
    }
}

impl SqliteBackend {
    /// Open (or create) a SQLite-backed graph at the configured path, or
    /// an in-memory database if `config.path` is `None`.
    pub fn open(config: &BackendConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path).map_err(sql_err)?,
            None => Connection::open_in_memory().map_err(sql_err)?,
        };
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", true).map_err(sql_err)?;
        let cache_kib = (config.cache_size_mb * 1024) as i64;
        conn.pragma_update(None, "cache_size", -cache_kib).ok();

        run_migrations(&conn)?;
        let has_fts5 = probe_fts5(&conn);

        tracing::info!(has_fts5, path = ?config.path, "opened sqlite backend");

        Ok(Self {
            conn: Mutex::new(conn),
            writer_lock: Arc::new(Mutex::new(())),
            next_tx_id: AtomicU64::new(1),
            fulltext_enabled: config.fulltext_enabled,
            has_fts5,
        })
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(&BackendConfig::memory())
    }
}

fn sql_err(e: rusqlite::Error) -> Error {
    Error::StorageError(e.to_string())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    ).map_err(sql_err)?;

    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |r| r.get(0))
        .map_err(sql_err)?;

    if current < SCHEMA_VERSION {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY,
                created_at REAL NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS node_labels (
                node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                label TEXT NOT NULL,
                PRIMARY KEY (node_id, label)
            );
            CREATE INDEX IF NOT EXISTS idx_node_labels_label ON node_labels(label);
            CREATE TABLE IF NOT EXISTS relationships (
                id INTEGER PRIMARY KEY,
                src INTEGER NOT NULL REFERENCES nodes(id),
                dst INTEGER NOT NULL REFERENCES nodes(id),
                rel_type TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_rel_src ON relationships(src);
            CREATE INDEX IF NOT EXISTS idx_rel_dst ON relationships(dst);
            CREATE INDEX IF NOT EXISTS idx_rel_type ON relationships(rel_type);
            CREATE TABLE IF NOT EXISTS property_indexes (
                label TEXT NOT NULL,
                property TEXT NOT NULL,
                index_type TEXT NOT NULL,
                PRIMARY KEY (label, property)
            );
            CREATE TABLE IF NOT EXISTS property_constraints (
                label TEXT NOT NULL,
                property TEXT NOT NULL,
                kind TEXT NOT NULL,
                PRIMARY KEY (label, property)
            );
            CREATE TABLE IF NOT EXISTS vector_indexes (
                name TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                property TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                metric TEXT NOT NULL,
                method TEXT NOT NULL DEFAULT 'flat'
            );
            CREATE TABLE IF NOT EXISTS vector_entries (
                index_name TEXT NOT NULL REFERENCES vector_indexes(name) ON DELETE CASCADE,
                node_id INTEGER NOT NULL,
                vector BLOB NOT NULL,
                PRIMARY KEY (index_name, node_id)
            );",
        ).map_err(sql_err)?;

        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(sql_err)?;
        tracing::debug!(version = SCHEMA_VERSION, "applied schema migration");
    }

    Ok(())
}

fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn probe_fts5(conn: &Connection) -> bool {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS __fts5_probe USING fts5(x); DROP TABLE __fts5_probe;",
    ).is_ok()
}

fn fts_table_name(label: &str, property: &str) -> String {
    let sanitize = |s: &str| s.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect::<String>();
    format!("fts_{}_{}", sanitize(label), sanitize(property))
}

fn props_to_json(props: &PropertyMap) -> String {
    let mut obj = serde_json::Map::new();
    for (k, v) in props {
        obj.insert(k.clone(), v.to_json());
    }
    serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_else(|_| "{}".into())
}

fn json_to_props(text: &str) -> Result<PropertyMap> {
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::StorageError(format!("corrupt properties blob: {e}")))?;
    let mut props = PropertyMap::new();
    if let serde_json::Value::Object(obj) = parsed {
        for (k, v) in obj {
            props.insert(k, Value::from_json(&v)?);
        }
    }
    Ok(props)
}

impl SqliteBackend {
    fn load_node(&self, conn: &Connection, id: NodeId) -> Result<Option<Node>> {
        let row: Option<(f64, String)> = conn
            .query_row(
                "SELECT created_at, properties FROM nodes WHERE id = ?1",
                params![id.0 as i64],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(sql_err)?;
        let Some((created_at, props_json)) = row else { return Ok(None) };

        let mut stmt = conn.prepare("SELECT label FROM node_labels WHERE node_id = ?1").map_err(sql_err)?;
        let labels: Vec<String> = stmt
            .query_map(params![id.0 as i64], |r| r.get(0))
            .map_err(sql_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_err)?;

        let props = json_to_props(&props_json)?;
        let node = props.into_iter().fold(
            Node::new(id).with_labels(labels).with_created_at(created_at),
            |n, (k, v)| n.with_property(k, v),
        );
        Ok(Some(node))
    }

    fn load_relationship(&self, conn: &Connection, id: RelId) -> Result<Option<Relationship>> {
        let row: Option<(i64, i64, String, String)> = conn
            .query_row(
                "SELECT src, dst, rel_type, properties FROM relationships WHERE id = ?1",
                params![id.0 as i64],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()
            .map_err(sql_err)?;
        let Some((src, dst, rel_type, props_json)) = row else { return Ok(None) };
        let props = json_to_props(&props_json)?;
        let rel = props.into_iter().fold(
            Relationship::new(id, NodeId(src as u64), NodeId(dst as u64), rel_type),
            |r, (k, v)| r.with_property(k, v),
        );
        Ok(Some(rel))
    }

    fn enforce_constraints(&self, conn: &Connection, labels: &[String], props: &PropertyMap, exclude: Option<NodeId>) -> Result<()> {
        let mut stmt = conn.prepare("SELECT label, property, kind FROM property_constraints").map_err(sql_err)?;
        let constraints: Vec<(String, String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .map_err(sql_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_err)?;

        for (label, property, kind) in constraints {
            if !labels.iter().any(|l| l == &label) {
                continue;
            }
            match kind.as_str() {
                "exists" => {
                    if !props.contains_key(&property) {
                        return Err(Error::ConstraintViolation(format!(
                            "node with label {label} is missing required property {property}"
                        )));
                    }
                }
                "unique" => {
                    if let Some(val) = props.get(&property) {
                        let encoded = serde_json::to_string(&val.to_json()).unwrap_or_default();
                        let exclude_id = exclude.map(|n| n.0 as i64).unwrap_or(-1);
                        let clash: i64 = conn.query_row(
                            "SELECT COUNT(*) FROM nodes n
                             JOIN node_labels nl ON nl.node_id = n.id
                             WHERE nl.label = ?1 AND n.id != ?2
                               AND json_extract(n.properties, '$.' || ?3) = json_extract(?4, '$')",
                            params![label, exclude_id, property, encoded],
                            |r| r.get(0),
                        ).unwrap_or(0);
                        if clash > 0 {
                            return Err(Error::ConstraintViolation(format!(
                                "uniqueness constraint violated for {label}.{property}"
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn fts_sync_node(&self, conn: &Connection, node_id: NodeId, labels: &[String], props: &PropertyMap) -> Result<()> {
        if !self.fulltext_enabled || !self.has_fts5 {
            return Ok(());
        }
        let mut stmt = conn.prepare("SELECT label, property FROM property_indexes WHERE index_type = 'fulltext'").map_err(sql_err)?;
        let targets: Vec<(String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(sql_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_err)?;
        for (label, property) in targets {
            if !labels.iter().any(|l| l == &label) {
                continue;
            }
            let table = fts_table_name(&label, &property);
            conn.execute(&format!("DELETE FROM {table} WHERE node_id = ?1"), params![node_id.0 as i64]).ok();
            if let Some(Value::String(text)) = props.get(&property) {
                conn.execute(
                    &format!("INSERT INTO {table}(node_id, content) VALUES (?1, ?2)"),
                    params![node_id.0 as i64, text],
                ).map_err(sql_err)?;
            }
        }
        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    type Tx = SqliteTx;

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx> {
        let id = TxId(self.next_tx_id.fetch_add(1, Ordering::SeqCst));
        let guard = match mode {
            TxMode::ReadWrite => Some(self.writer_lock.lock_arc()),
            TxMode::ReadOnly => None,
        };
        let conn = self.conn.lock();
        let sql = match mode {
            TxMode::ReadWrite => "BEGIN IMMEDIATE",
            TxMode::ReadOnly => "BEGIN DEFERRED",
        };
        conn.execute_batch(sql).map_err(sql_err)?;
        tracing::debug!(tx = id.0, ?mode, "began transaction");
        Ok(SqliteTx { id, mode, _write_guard: guard })
    }

    fn commit_tx(&self, tx: Self::Tx) -> Result<()> {
        self.conn.lock().execute_batch("COMMIT").map_err(sql_err)?;
        tracing::debug!(tx = tx.id.0, "committed transaction");
        Ok(())
    }

    fn rollback_tx(&self, tx: Self::Tx) -> Result<()> {
        self.conn.lock().execute_batch("ROLLBACK").map_err(sql_err)?;
        tracing::debug!(tx = tx.id.0, "rolled back transaction");
        Ok(())
    }

    fn create_node(&self, _tx: &mut Self::Tx, labels: &[&str], props: PropertyMap) -> Result<NodeId> {
        let conn = self.conn.lock();
        let owned_labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        self.enforce_constraints(&conn, &owned_labels, &props, None)?;

        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let props_json = props_to_json(&props);
        conn.execute(
            "INSERT INTO nodes (created_at, properties) VALUES (?1, ?2)",
            params![created_at, props_json],
        ).map_err(sql_err)?;
        let id = NodeId(conn.last_insert_rowid() as u64);
        for label in &owned_labels {
            conn.execute("INSERT INTO node_labels (node_id, label) VALUES (?1, ?2)", params![id.0 as i64, label])
                .map_err(sql_err)?;
        }
        self.fts_sync_node(&conn, id, &owned_labels, &props)?;
        Ok(id)
    }

    fn get_node(&self, _tx: &Self::Tx, id: NodeId) -> Result<Option<Node>> {
        self.load_node(&self.conn.lock(), id)
    }

    fn delete_node(&self, _tx: &mut Self::Tx, id: NodeId) -> Result<bool> {
        let conn = self.conn.lock();
        let connected: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE src = ?1 OR dst = ?1",
            params![id.0 as i64],
            |r| r.get(0),
        ).map_err(sql_err)?;
        if connected > 0 {
            return Err(Error::ConstraintViolation(format!(
                "cannot delete node {id} with existing relationships; use DETACH DELETE"
            )));
        }
        conn.execute("DELETE FROM node_labels WHERE node_id = ?1", params![id.0 as i64]).map_err(sql_err)?;
        conn.execute("DELETE FROM vector_entries WHERE node_id = ?1", params![id.0 as i64]).map_err(sql_err)?;
        let changed = conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.0 as i64]).map_err(sql_err)?;
        Ok(changed > 0)
    }

    fn set_node_property(&self, _tx: &mut Self::Tx, id: NodeId, key: &str, val: Value) -> Result<()> {
        let conn = self.conn.lock();
        let mut node = self.load_node(&conn, id)?.ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        let mut probe = PropertyMap::new();
        probe.insert(key.to_string(), val.clone());
        self.enforce_constraints(&conn, &node.labels, &probe, Some(id))?;
        node.properties.insert(key.to_string(), val);
        conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = ?2",
            params![props_to_json(&node.properties), id.0 as i64],
        ).map_err(sql_err)?;
        self.fts_sync_node(&conn, id, &node.labels, &node.properties)?;
        Ok(())
    }

    fn remove_node_property(&self, _tx: &mut Self::Tx, id: NodeId, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        let mut node = self.load_node(&conn, id)?.ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.properties.remove(key);
        conn.execute(
            "UPDATE nodes SET properties = ?1 WHERE id = ?2",
            params![props_to_json(&node.properties), id.0 as i64],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn add_label(&self, _tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO node_labels (node_id, label) VALUES (?1, ?2)",
            params![id.0 as i64, label],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn remove_label(&self, _tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM node_labels WHERE node_id = ?1 AND label = ?2",
            params![id.0 as i64, label],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn create_relationship(&self, _tx: &mut Self::Tx, src: NodeId, dst: NodeId, rel_type: &str, props: PropertyMap) -> Result<RelId> {
        let conn = self.conn.lock();
        let exists = |id: NodeId| -> Result<bool> {
            conn.query_row("SELECT 1 FROM nodes WHERE id = ?1", params![id.0 as i64], |_| Ok(()))
                .optional().map_err(sql_err).map(|o| o.is_some())
        };
        if !exists(src)? {
            return Err(Error::NotFound(format!("node {src}")));
        }
        if !exists(dst)? {
            return Err(Error::NotFound(format!("node {dst}")));
        }
        conn.execute(
            "INSERT INTO relationships (src, dst, rel_type, properties) VALUES (?1, ?2, ?3, ?4)",
            params![src.0 as i64, dst.0 as i64, rel_type, props_to_json(&props)],
        ).map_err(sql_err)?;
        Ok(RelId(conn.last_insert_rowid() as u64))
    }

    fn get_relationship(&self, _tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>> {
        self.load_relationship(&self.conn.lock(), id)
    }

    fn delete_relationship(&self, _tx: &mut Self::Tx, id: RelId) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM relationships WHERE id = ?1", params![id.0 as i64]).map_err(sql_err)?;
        Ok(changed > 0)
    }

    fn set_relationship_property(&self, _tx: &mut Self::Tx, id: RelId, key: &str, val: Value) -> Result<()> {
        let conn = self.conn.lock();
        let mut rel = self.load_relationship(&conn, id)?.ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.insert(key.to_string(), val);
        conn.execute(
            "UPDATE relationships SET properties = ?1 WHERE id = ?2",
            params![props_to_json(&rel.properties), id.0 as i64],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn remove_relationship_property(&self, _tx: &mut Self::Tx, id: RelId, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        let mut rel = self.load_relationship(&conn, id)?.ok_or_else(|| Error::NotFound(format!("relationship {id}")))?;
        rel.properties.remove(key);
        conn.execute(
            "UPDATE relationships SET properties = ?1 WHERE id = ?2",
            params![props_to_json(&rel.properties), id.0 as i64],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn get_relationships(&self, _tx: &Self::Tx, node: NodeId, dir: Direction, rel_type: Option<&str>) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock();
        let sql = match dir {
            Direction::Outgoing => "SELECT id FROM relationships WHERE src = ?1",
            Direction::Incoming => "SELECT id FROM relationships WHERE dst = ?1",
            Direction::Both => "SELECT id FROM relationships WHERE src = ?1 OR dst = ?1",
        };
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        let ids: Vec<i64> = stmt
            .query_map(params![node.0 as i64], |r| r.get(0))
            .map_err(sql_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_err)?;
        let mut rels = Vec::new();
        for id in ids {
            if let Some(rel) = self.load_relationship(&conn, RelId(id as u64))? {
                if rel_type.is_none_or(|t| rel.rel_type == t) {
                    rels.push(rel);
                }
            }
        }
        Ok(rels)
    }

    fn create_index(&self, label: &str, property: &str, index_type: IndexType) -> Result<()> {
        let conn = self.conn.lock();
        let type_str = match index_type {
            IndexType::BTree => "btree",
            IndexType::FullText => "fulltext",
            IndexType::Unique => "unique",
            IndexType::Vector => "vector",
        };
        conn.execute(
            "INSERT OR REPLACE INTO property_indexes (label, property, index_type) VALUES (?1, ?2, ?3)",
            params![label, property, type_str],
        ).map_err(sql_err)?;

        if index_type == IndexType::FullText && self.fulltext_enabled && self.has_fts5 {
            let table = fts_table_name(label, property);
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS {table} USING fts5(content, node_id UNINDEXED);"
            )).map_err(sql_err)?;
            let mut stmt = conn.prepare(
                "SELECT n.id, json_extract(n.properties, '$.' || ?2)
                 FROM nodes n JOIN node_labels nl ON nl.node_id = n.id
                 WHERE nl.label = ?1",
            ).map_err(sql_err)?;
            let rows: Vec<(i64, Option<String>)> = stmt
                .query_map(params![label, property], |r| Ok((r.get(0)?, r.get(1)?)))
                .map_err(sql_err)?
                .collect::<rusqlite::Result<_>>()
                .map_err(sql_err)?;
            for (node_id, content) in rows {
                if let Some(content) = content {
                    conn.execute(
                        &format!("INSERT INTO {table}(node_id, content) VALUES (?1, ?2)"),
                        params![node_id, content],
                    ).map_err(sql_err)?;
                }
            }
        }
        Ok(())
    }

    fn drop_index(&self, label: &str, property: &str) -> Result<()> {
        let conn = self.conn.lock();
        let table = fts_table_name(label, property);
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};")).ok();
        conn.execute(
            "DELETE FROM property_indexes WHERE label = ?1 AND property = ?2",
            params![label, property],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn list_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT label, property, index_type FROM property_indexes").map_err(sql_err)?;
        let rows = stmt.query_map([], |r| {
            let label: String = r.get(0)?;
            let property: String = r.get(1)?;
            let kind: String = r.get(2)?;
            Ok((label, property, kind))
        }).map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (label, property, kind) = row.map_err(sql_err)?;
            let index_type = match kind.as_str() {
                "fulltext" => IndexType::FullText,
                "unique" => IndexType::Unique,
                "vector" => IndexType::Vector,
                _ => IndexType::BTree,
            };
            out.push(IndexDescriptor::new(label, property, index_type));
        }
        Ok(out)
    }

    fn node_count(&self, _tx: &Self::Tx) -> Result<u64> {
        Ok(self.conn.lock().query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get::<_, i64>(0)).map_err(sql_err)? as u64)
    }

    fn relationship_count(&self, _tx: &Self::Tx) -> Result<u64> {
        Ok(self.conn.lock().query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get::<_, i64>(0)).map_err(sql_err)? as u64)
    }

    fn labels(&self, _tx: &Self::Tx) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT label FROM node_labels ORDER BY label").map_err(sql_err)?;
        let labels = stmt.query_map([], |r| r.get(0)).map_err(sql_err)?
            .collect::<rusqlite::Result<_>>().map_err(sql_err)?;
        Ok(labels)
    }

    fn relationship_types(&self, _tx: &Self::Tx) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT rel_type FROM relationships ORDER BY rel_type").map_err(sql_err)?;
        let types = stmt.query_map([], |r| r.get(0)).map_err(sql_err)?
            .collect::<rusqlite::Result<_>>().map_err(sql_err)?;
        Ok(types)
    }

    fn all_nodes(&self, _tx: &Self::Tx) -> Result<Vec<Node>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM nodes").map_err(sql_err)?;
        let ids: Vec<i64> = stmt.query_map([], |r| r.get(0)).map_err(sql_err)?
            .collect::<rusqlite::Result<_>>().map_err(sql_err)?;
        ids.into_iter()
            .map(|id| self.load_node(&conn, NodeId(id as u64)))
            .collect::<Result<Vec<Option<Node>>>>()
            .map(|v| v.into_iter().flatten().collect())
    }

    fn nodes_by_label(&self, _tx: &Self::Tx, label: &str) -> Result<Vec<Node>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT node_id FROM node_labels WHERE label = ?1").map_err(sql_err)?;
        let ids: Vec<i64> = stmt.query_map(params![label], |r| r.get(0)).map_err(sql_err)?
            .collect::<rusqlite::Result<_>>().map_err(sql_err)?;
        ids.into_iter()
            .map(|id| self.load_node(&conn, NodeId(id as u64)))
            .collect::<Result<Vec<Option<Node>>>>()
            .map(|v| v.into_iter().flatten().collect())
    }

    fn nodes_by_property(&self, tx: &Self::Tx, label: &str, key: &str, value: &Value) -> Result<Vec<Node>> {
        Ok(self.nodes_by_label(tx, label)?.into_iter().filter(|n| n.get(key) == Some(value)).collect())
    }

    fn create_constraint(&self, label: &str, property: &str, kind: ConstraintKind) -> Result<()> {
        let conn = self.conn.lock();
        let kind_str = match kind {
            ConstraintKind::Unique => "unique",
            ConstraintKind::Exists => "exists",
        };
        conn.execute(
            "INSERT OR REPLACE INTO property_constraints (label, property, kind) VALUES (?1, ?2, ?3)",
            params![label, property, kind_str],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn drop_constraint(&self, label: &str, property: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM property_constraints WHERE label = ?1 AND property = ?2",
            params![label, property],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn list_constraints(&self) -> Result<Vec<ConstraintDescriptor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT label, property, kind FROM property_constraints").map_err(sql_err)?;
        let rows = stmt.query_map([], |r| {
            let label: String = r.get(0)?;
            let property: String = r.get(1)?;
            let kind: String = r.get(2)?;
            Ok((label, property, kind))
        }).map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (label, property, kind) = row.map_err(sql_err)?;
            let kind = if kind == "unique" { ConstraintKind::Unique } else { ConstraintKind::Exists };
            out.push(ConstraintDescriptor::new(label, property, kind));
        }
        Ok(out)
    }

    fn create_fulltext_index(&self, label: &str, property: &str) -> Result<()> {
        self.create_index(label, property, IndexType::FullText)
    }

    fn fulltext_query(&self, _tx: &Self::Tx, label: &str, property: &str, query: &str) -> Result<Vec<(Node, f64)>> {
        if !self.has_fts5 || !self.fulltext_enabled {
            return Err(Error::ExecutionError("fulltext search requires FTS5 support".into()));
        }
        let conn = self.conn.lock();
        let table = fts_table_name(label, property);
        let mut stmt = conn.prepare(&format!(
            "SELECT node_id, bm25({table}) FROM {table} WHERE content MATCH ?1 ORDER BY bm25({table})"
        )).map_err(sql_err)?;
        let rows: Vec<(i64, f64)> = stmt.query_map(params![query], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(sql_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for (node_id, bm25) in rows {
            if let Some(node) = self.load_node(&conn, NodeId(node_id as u64))? {
                // bm25() is lower-is-better; invert so callers get "higher is better".
                out.push((node, -bm25));
            }
        }
        Ok(out)
    }

    fn has_fts5(&self) -> bool {
        self.has_fts5
    }

    /// `method` is persisted for introspection (`list_vector_indexes`) and
    /// validated eagerly, but `vector_search` below always scans
    /// `vector_entries` exactly — this backend keeps no in-process ANN
    /// graph, so there is no approximate path to take regardless of which
    /// method a caller names.
    fn create_vector_index(
        &self,
        name: &str,
        label: &str,
        property: &str,
        dimensions: usize,
        metric: VectorMetric,
        method: VectorMethod,
    ) -> Result<()> {
        if method == VectorMethod::Hnsw {
            #[cfg(not(feature = "ann_hnsw"))]
            return Err(Error::BackendUnavailable(
                "hnsw vector index method requires the crate's `ann_hnsw` feature".into(),
            ));
            if metric != VectorMetric::L2 {
                return Err(Error::ExecutionError(format!(
                    "hnsw vector index method only supports the l2 metric, got {}", metric.as_str()
                )));
            }
        }
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO vector_indexes (name, label, property, dimensions, metric, method) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![name, label, property, dimensions as i64, metric.as_str(), method.as_str()],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn drop_vector_index(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM vector_entries WHERE index_name = ?1", params![name]).map_err(sql_err)?;
        conn.execute("DELETE FROM vector_indexes WHERE name = ?1", params![name]).map_err(sql_err)?;
        Ok(())
    }

    fn list_vector_indexes(&self) -> Result<Vec<VectorIndexDescriptor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name, label, property, dimensions, metric, method FROM vector_indexes").map_err(sql_err)?;
        let rows = stmt.query_map([], |r| {
            let name: String = r.get(0)?;
            let label: String = r.get(1)?;
            let property: String = r.get(2)?;
            let dims: i64 = r.get(3)?;
            let metric: String = r.get(4)?;
            let method: String = r.get(5)?;
            Ok((name, label, property, dims, metric, method))
        }).map_err(sql_err)?;
        let mut out = Vec::new();
        for row in rows {
            let (name, label, property, dims, metric, method) = row.map_err(sql_err)?;
            let metric = VectorMetric::parse(&metric).unwrap_or(VectorMetric::L2);
            let method = VectorMethod::parse(&method).unwrap_or(VectorMethod::Flat);
            out.push(VectorIndexDescriptor::new(name, label, property, dims as usize, metric, method));
        }
        Ok(out)
    }

    fn upsert_embedding(&self, _tx: &mut Self::Tx, index: &str, node: NodeId, vector: Vec<f32>) -> Result<()> {
        let conn = self.conn.lock();
        let dims: i64 = conn.query_row(
            "SELECT dimensions FROM vector_indexes WHERE name = ?1",
            params![index],
            |r| r.get(0),
        ).optional().map_err(sql_err)?
            .ok_or_else(|| Error::NotFound(format!("vector index {index}")))?;
        if vector.len() as i64 != dims {
            return Err(Error::ExecutionError(format!(
                "vector has {} dimensions, index {index} expects {dims}", vector.len()
            )));
        }
        conn.execute(
            "INSERT OR REPLACE INTO vector_entries (index_name, node_id, vector) VALUES (?1, ?2, ?3)",
            params![index, node.0 as i64, vector_to_blob(&vector)],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn remove_embedding(&self, _tx: &mut Self::Tx, index: &str, node: NodeId) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM vector_entries WHERE index_name = ?1 AND node_id = ?2",
            params![index, node.0 as i64],
        ).map_err(sql_err)?;
        Ok(())
    }

    fn vector_search(
        &self,
        _tx: &Self::Tx,
        index: &str,
        query: &[f32],
        k: usize,
        _candidate_multiplier: usize,
    ) -> Result<Vec<VectorHit>> {
        let conn = self.conn.lock();
        let metric: String = conn.query_row(
            "SELECT metric FROM vector_indexes WHERE name = ?1",
            params![index],
            |r| r.get(0),
        ).optional().map_err(sql_err)?
            .ok_or_else(|| Error::NotFound(format!("vector index {index}")))?;
        let metric = VectorMetric::parse(&metric).unwrap_or(VectorMetric::L2);

        let mut stmt = conn.prepare("SELECT node_id, vector FROM vector_entries WHERE index_name = ?1").map_err(sql_err)?;
        let rows: Vec<(i64, Vec<u8>)> = stmt.query_map(params![index], |r| Ok((r.get(0)?, r.get(1)?)))
            .map_err(sql_err)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql_err)?;
        let candidates: Vec<(NodeId, Vec<f32>)> = rows.into_iter()
            .map(|(id, blob)| (NodeId(id as u64), blob_to_vector(&blob)))
            .collect();
        Ok(exact_rerank(metric, query, &candidates, k))
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
            supports_fulltext_index: self.has_fts5,
            supports_procedures: true,
            supports_batch_writes: true,
            supports_constraints: true,
            max_batch_size: Some(10_000),
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

    fn backend() -> SqliteBackend {
        SqliteBackend::open_memory().unwrap()
    }

    #[test]
    fn test_create_and_get_node() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let mut props = PropertyMap::new();
        props.insert("name".into(), Value::String("Ada".into()));
        let id = b.create_node(&mut tx, &["Person"], props).unwrap();
        b.commit_tx(tx).unwrap();

        let tx = b.begin_tx(TxMode::ReadOnly).unwrap();
        let node = b.get_node(&tx, id).unwrap().unwrap();
        assert!(node.has_label("Person"));
        assert_eq!(node.get("name"), Some(&Value::String("Ada".into())));
    }

    #[test]
    fn test_relationship_roundtrip() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let a = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let c = b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        let rel_id = b.create_relationship(&mut tx, a, c, "KNOWS", PropertyMap::new()).unwrap();
        b.commit_tx(tx).unwrap();

        let tx = b.begin_tx(TxMode::ReadOnly).unwrap();
        let rel = b.get_relationship(&tx, rel_id).unwrap().unwrap();
        assert_eq!(rel.rel_type, "KNOWS");
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
    fn test_rollback_discards_writes() {
        let b = backend();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        b.create_node(&mut tx, &["Person"], PropertyMap::new()).unwrap();
        b.rollback_tx(tx).unwrap();

        let tx = b.begin_tx(TxMode::ReadOnly).unwrap();
        assert_eq!(b.node_count(&tx).unwrap(), 0);
    }

    #[test]
    fn test_fulltext_search() {
        let b = backend();
        if !b.has_fts5 {
            return;
        }
        b.create_fulltext_index("Article", "body").unwrap();
        let mut tx = b.begin_tx(TxMode::ReadWrite).unwrap();
        let mut props = PropertyMap::new();
        props.insert("body".into(), Value::String("graph databases are fun".into()));
        b.create_node(&mut tx, &["Article"], props).unwrap();
        b.commit_tx(tx).unwrap();

        let tx = b.begin_tx(TxMode::ReadOnly).unwrap();
        let hits = b.fulltext_query(&tx, "Article", "body", "graph").unwrap();
        assert_eq!(hits.len(), 1);
    }
}

//! Argument parsing shared by the built-in `db.vector.search` and
//! `db.index.fulltext.query` procedures across every `StorageBackend`.
//!
//! Keeping this here (rather than duplicating it in `memory.rs` and
//! `sqlite.rs`) means the two backends can never drift on argument order
//! or error wording for the same procedure name.

use std::collections::HashMap;

use crate::model::Value;
use crate::{Error, Result};

use super::{ProcedureResult, StorageBackend};

fn expect_string(args: &[Value], idx: usize, proc: &str) -> Result<String> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(Error::ExecutionError(format!("{proc}: expected string argument at position {idx}"))),
    }
}

fn expect_vector(args: &[Value], idx: usize, proc: &str) -> Result<Vec<f32>> {
    match args.get(idx) {
        Some(Value::List(items)) => items.iter().map(|v| match v {
            Value::Float(f) => Ok(*f as f32),
            Value::Int(i) => Ok(*i as f32),
            other => Err(Error::ExecutionError(format!("{proc}: vector elements must be numeric, got {other:?}"))),
        }).collect(),
        _ => Err(Error::ExecutionError(format!("{proc}: expected a list of numbers at position {idx}"))),
    }
}

fn expect_usize(args: &[Value], idx: usize, proc: &str) -> Result<usize> {
    match args.get(idx) {
        Some(Value::Int(i)) if *i >= 0 => Ok(*i as usize),
        _ => Err(Error::ExecutionError(format!("{proc}: expected a non-negative integer at position {idx}"))),
    }
}

/// `CALL db.vector.search(indexName, queryVector, k) YIELD node, score`
///
/// An optional fourth map argument may carry `{candidateMultiplier: N}` to
/// override the backend's default over-fetch factor for approximate
/// indexes.
pub fn vector_search<B: StorageBackend>(backend: &B, tx: &B::Tx, args: Vec<Value>) -> Result<ProcedureResult> {
    let proc = "db.vector.search";
    let index = expect_string(&args, 0, proc)?;
    let query = expect_vector(&args, 1, proc)?;
    let k = expect_usize(&args, 2, proc)?;
    let multiplier = match args.get(3) {
        Some(Value::Map(m)) => match m.get("candidateMultiplier") {
            Some(Value::Int(n)) if *n > 0 => *n as usize,
            _ => 4,
        },
        _ => 4,
    };
    let hits = backend.vector_search(tx, &index, &query, k, multiplier)?;
    let mut rows = Vec::with_capacity(hits.len());
    for (node_id, score) in hits {
        let Some(node) = backend.get_node(tx, node_id)? else { continue };
        rows.push(HashMap::from([
            ("node".to_string(), Value::Node(Box::new(node))),
            ("score".to_string(), Value::Float(score)),
        ]));
    }
    Ok(ProcedureResult { columns: vec!["node".into(), "score".into()], rows })
}

/// `CALL db.index.fulltext.query(label, property, query) YIELD node, score`
pub fn fulltext_query<B: StorageBackend>(backend: &B, tx: &B::Tx, args: Vec<Value>) -> Result<ProcedureResult> {
    let proc = "db.index.fulltext.query";
    let label = expect_string(&args, 0, proc)?;
    let property = expect_string(&args, 1, proc)?;
    let query = expect_string(&args, 2, proc)?;
    let hits = backend.fulltext_query(tx, &label, &property, &query)?;
    let rows = hits.into_iter()
        .map(|(node, score)| HashMap::from([
            ("node".to_string(), Value::Node(Box::new(node))),
            ("score".to_string(), Value::Float(score)),
        ]))
        .collect();
    Ok(ProcedureResult { columns: vec!["node".into(), "score".into()], rows })
}

//! Query execution engine.
//!
//! Executes logical plans against a `StorageBackend`. Entirely synchronous:
//! a single thread pulls rows recursively through the plan tree, the same
//! way the plan itself is shaped.

use std::collections::HashMap;

use crate::cypher::ast::{
    BinaryOp, Expr, Literal, NodePattern, Pattern, PatternElement, QuantifierKind, RelPattern,
    StringOp, UnaryOp,
};
use crate::model::*;
use crate::planner::{LogicalPlan, MergeCreateOp, PathElem, SetOp};
use crate::storage::StorageBackend;
use crate::{Error, Result};

/// Query execution result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub stats: ExecutionStats,
}

/// A single row in the result set. Preserves column order.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub values: Vec<(String, Value)>,
}

impl ResultRow {
    /// Get a typed value from the row by column name.
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        let val = self.values.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::NotFound(format!("Column '{key}'")))?;
        T::from_value(val)
    }

    /// Get a raw Value reference by column name.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Execution statistics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub execution_time_ms: u64,
}

/// Convert from Value to concrete types.
pub trait FromValue: Sized {
    fn from_value(val: &Value) -> Result<Self>;
}

impl FromValue for Node {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Node(n) => Ok(*n.clone()),
            _ => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for String {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for i64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: val.type_name().into() })
    }
}

impl FromValue for f64 {
    fn from_value(val: &Value) -> Result<Self> {
        val.as_float().ok_or_else(|| Error::TypeError { expected: "Float".into(), got: val.type_name().into() })
    }
}

impl FromValue for bool {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Bool(b) => Ok(*b),
            _ => Err(Error::TypeError { expected: "Bool".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Value {
    fn from_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromValue for Relationship {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Relationship(r) => Ok(*r.clone()),
            _ => Err(Error::TypeError { expected: "Relationship".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Path {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Path(p) => Ok(*p.clone()),
            _ => Err(Error::TypeError { expected: "Path".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::List(l) => Ok(l.clone()),
            _ => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
        }
    }
}

impl FromValue for HashMap<String, Value> {
    fn from_value(val: &Value) -> Result<Self> {
        match val {
            Value::Map(m) => Ok(m.clone()),
            _ => Err(Error::TypeError { expected: "Map".into(), got: val.type_name().into() }),
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

type Row = HashMap<String, Value>;

/// Execute a logical plan against a storage backend, with `params` available
/// to every expression via `$name`.
pub fn execute<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    plan: &LogicalPlan,
    params: PropertyMap,
) -> Result<QueryResult> {
    let mut stats = ExecutionStats::default();
    let mut columns = Vec::new();
    let seed = vec![Row::new()];
    let rows = {
        let ctx = EvalCtx { backend, params: &params };
        execute_plan(tx, plan, &seed, &ctx, &mut stats, &mut columns)?
    };

    let result_rows: Vec<ResultRow> = rows
        .into_iter()
        .map(|row| {
            let values: Vec<(String, Value)> =
                columns.iter().map(|col| (col.clone(), row.get(col).cloned().unwrap_or(Value::Null))).collect();
            ResultRow { values }
        })
        .collect();

    Ok(QueryResult { columns, rows: result_rows, stats })
}

/// Bundles everything expression evaluation and plan execution need that
/// doesn't change as we recurse: the backend, the query parameters, and (via
/// `tx`, passed alongside rather than inside, since it needs `&mut` for
/// writes) the active transaction.
struct EvalCtx<'a, B: StorageBackend> {
    backend: &'a B,
    params: &'a PropertyMap,
}

// ============================================================================
// Plan executor
// ============================================================================

/// Execute a plan node against `seed` rows. `seed` is what `LogicalPlan::Argument`
/// resolves to — one empty row at the top of a query, or the per-iteration
/// rows a `Foreach`/`Merge` body is seeded with.
fn execute_plan<B: StorageBackend>(
    tx: &mut B::Tx,
    plan: &LogicalPlan,
    seed: &[Row],
    ctx: &EvalCtx<B>,
    stats: &mut ExecutionStats,
    columns: &mut Vec<String>,
) -> Result<Vec<Row>> {
    match plan {
        LogicalPlan::Argument => Ok(seed.to_vec()),

        LogicalPlan::NodeScan { label, alias } => {
            let nodes = ctx.backend.nodes_by_label(tx, label)?;
            bind_column(columns, alias);
            Ok(nodes.into_iter().map(|n| single(alias, Value::Node(Box::new(n)))).collect())
        }

        LogicalPlan::AllNodesScan { alias } => {
            let nodes = ctx.backend.all_nodes(tx)?;
            bind_column(columns, alias);
            Ok(nodes.into_iter().map(|n| single(alias, Value::Node(Box::new(n)))).collect())
        }

        LogicalPlan::IndexLookup { label, property, value, alias } => {
            let empty = Row::new();
            let target = eval_expr(value, &empty, ctx)?;
            let nodes = ctx.backend.nodes_by_property(tx, label, property, &target)?;
            bind_column(columns, alias);
            Ok(nodes.into_iter().map(|n| single(alias, Value::Node(Box::new(n)))).collect())
        }

        LogicalPlan::Expand { input, from, dir, rel_types, to, rel_alias } => {
            let input_rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let type_refs: Vec<&str> = rel_types.iter().map(String::as_str).collect();
            let mut rows = Vec::new();
            for row in &input_rows {
                let Some(Value::Node(from_node)) = row.get(from) else { continue };
                let rels = ctx.backend.get_relationships(tx, from_node.id, *dir, None)?;
                for rel in rels {
                    if !type_refs.is_empty() && !type_refs.contains(&rel.rel_type.as_str()) {
                        continue;
                    }
                    let other_id = rel.other_node(from_node.id).unwrap_or(from_node.id);
                    if let Some(other) = ctx.backend.get_node(tx, other_id)? {
                        let mut out = row.clone();
                        out.insert(to.clone(), Value::Node(Box::new(other)));
                        if let Some(ra) = rel_alias {
                            out.insert(ra.clone(), Value::Relationship(Box::new(rel.clone())));
                        }
                        rows.push(out);
                    }
                }
            }
            bind_column(columns, to);
            if let Some(ra) = rel_alias {
                bind_column(columns, ra);
            }
            Ok(rows)
        }

        LogicalPlan::OptionalExpand { input, from, dir, rel_types, to, rel_alias } => {
            let input_rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let type_refs: Vec<&str> = rel_types.iter().map(String::as_str).collect();
            let mut rows = Vec::new();
            for row in &input_rows {
                let mut matched = false;
                if let Some(Value::Node(from_node)) = row.get(from) {
                    let rels = ctx.backend.get_relationships(tx, from_node.id, *dir, None)?;
                    for rel in rels {
                        if !type_refs.is_empty() && !type_refs.contains(&rel.rel_type.as_str()) {
                            continue;
                        }
                        let other_id = rel.other_node(from_node.id).unwrap_or(from_node.id);
                        if let Some(other) = ctx.backend.get_node(tx, other_id)? {
                            matched = true;
                            let mut out = row.clone();
                            out.insert(to.clone(), Value::Node(Box::new(other)));
                            if let Some(ra) = rel_alias {
                                out.insert(ra.clone(), Value::Relationship(Box::new(rel.clone())));
                            }
                            rows.push(out);
                        }
                    }
                }
                if !matched {
                    let mut out = row.clone();
                    out.insert(to.clone(), Value::Null);
                    if let Some(ra) = rel_alias {
                        out.insert(ra.clone(), Value::Null);
                    }
                    rows.push(out);
                }
            }
            bind_column(columns, to);
            if let Some(ra) = rel_alias {
                bind_column(columns, ra);
            }
            Ok(rows)
        }

        LogicalPlan::VarLengthExpand { input, from, dir, rel_types, to, rel_alias, min, max } => {
            let input_rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let type_refs: Vec<&str> = rel_types.iter().map(String::as_str).collect();
            let depth = crate::storage::ExpandDepth::Range { min: *min, max: *max };
            let mut rows = Vec::new();
            for row in &input_rows {
                let Some(Value::Node(from_node)) = row.get(from) else { continue };
                let paths = ctx.backend.expand(tx, from_node.id, *dir, &type_refs, depth)?;
                for path in paths {
                    let mut out = row.clone();
                    out.insert(to.clone(), Value::Node(Box::new(path.end().clone())));
                    if let Some(ra) = rel_alias {
                        let rels: Vec<Value> =
                            path.relationships.iter().map(|r| Value::Relationship(Box::new(r.clone()))).collect();
                        out.insert(ra.clone(), Value::List(rels));
                    }
                    rows.push(out);
                }
            }
            bind_column(columns, to);
            if let Some(ra) = rel_alias {
                bind_column(columns, ra);
            }
            Ok(rows)
        }

        LogicalPlan::Filter { input, predicate } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let mut filtered = Vec::with_capacity(rows.len());
            for row in rows {
                if eval_expr(predicate, &row, ctx)?.is_truthy() {
                    filtered.push(row);
                }
            }
            Ok(filtered)
        }

        LogicalPlan::Project { input, items } | LogicalPlan::With { input, items } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            columns.clear();
            columns.extend(items.iter().map(|(_, alias)| alias.clone()));
            let mut projected = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut out = Row::new();
                for (expr, alias) in items {
                    out.insert(alias.clone(), eval_expr(expr, row, ctx)?);
                }
                projected.push(out);
            }
            Ok(projected)
        }

        LogicalPlan::Unwind { input, expr, alias } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            bind_column(columns, alias);
            let mut result = Vec::new();
            for row in &rows {
                match eval_expr(expr, row, ctx)? {
                    Value::List(items) => {
                        for item in items {
                            let mut out = row.clone();
                            out.insert(alias.clone(), item);
                            result.push(out);
                        }
                    }
                    Value::Null => {}
                    other => {
                        let mut out = row.clone();
                        out.insert(alias.clone(), other);
                        result.push(out);
                    }
                }
            }
            Ok(result)
        }

        LogicalPlan::Distinct { input } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let mut seen: Vec<Vec<(String, Value)>> = Vec::new();
            let mut result = Vec::new();
            for row in rows {
                let mut key: Vec<(String, Value)> = row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                key.sort_by(|a, b| a.0.cmp(&b.0));
                if !seen.iter().any(|s| s == &key) {
                    seen.push(key);
                    result.push(row);
                }
            }
            Ok(result)
        }

        LogicalPlan::Sort { input, keys } => {
            let mut rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let mut eval_err = None;
            rows.sort_by(|a, b| {
                for (expr, ascending) in keys {
                    let va = eval_expr(expr, a, ctx).unwrap_or_else(|e| { eval_err.get_or_insert(e); Value::Null });
                    let vb = eval_expr(expr, b, ctx).unwrap_or_else(|e| { eval_err.get_or_insert(e); Value::Null });
                    let ord = va.cypher_total_cmp(&vb);
                    let ord = if *ascending { ord } else { ord.reverse() };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
            if let Some(e) = eval_err {
                return Err(e);
            }
            Ok(rows)
        }

        LogicalPlan::Skip { input, count } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            Ok(rows.into_iter().skip(*count).collect())
        }

        LogicalPlan::Limit { input, count } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            Ok(rows.into_iter().take(*count).collect())
        }

        LogicalPlan::Aggregate { input, group_by, aggregations } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            columns.clear();
            columns.extend(group_by.iter().map(|(_, a)| a.clone()));
            columns.extend(aggregations.iter().map(|(_, a)| a.clone()));
            aggregate_rows(&rows, group_by, aggregations, ctx)
        }

        LogicalPlan::CartesianProduct { left, right } => {
            let left_rows = execute_plan(tx, left, seed, ctx, stats, columns)?;
            let right_rows = execute_plan(tx, right, seed, ctx, stats, columns)?;
            let mut result = Vec::with_capacity(left_rows.len() * right_rows.len());
            for lr in &left_rows {
                for rr in &right_rows {
                    let mut row = lr.clone();
                    row.extend(rr.clone());
                    result.push(row);
                }
            }
            Ok(result)
        }

        LogicalPlan::CreateNode { input, labels, properties, alias } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            bind_column(columns, alias);
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let base_rows = if rows.is_empty() { vec![Row::new()] } else { rows };
            let mut out = Vec::with_capacity(base_rows.len());
            for row in base_rows {
                let mut props = PropertyMap::new();
                for (key, expr) in properties {
                    props.insert(key.clone(), eval_expr(expr, &row, ctx)?);
                }
                let node_id = ctx.backend.create_node(tx, &label_refs, props)?;
                stats.nodes_created += 1;
                let node = ctx
                    .backend
                    .get_node(tx, node_id)?
                    .ok_or_else(|| Error::ExecutionError("created node not found".into()))?;
                let mut new_row = row;
                new_row.insert(alias.clone(), Value::Node(Box::new(node)));
                out.push(new_row);
            }
            Ok(out)
        }

        LogicalPlan::CreateRel { input, src, dst, rel_type, properties, alias } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            if let Some(ra) = alias {
                bind_column(columns, ra);
            }
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let src_id = node_id_of(&row, src)?;
                let dst_id = node_id_of(&row, dst)?;
                let mut props = PropertyMap::new();
                for (key, expr) in properties {
                    props.insert(key.clone(), eval_expr(expr, &row, ctx)?);
                }
                let rel_id = ctx.backend.create_relationship(tx, src_id, dst_id, rel_type, props)?;
                stats.relationships_created += 1;
                let mut new_row = row;
                if let Some(ra) = alias {
                    let rel = ctx
                        .backend
                        .get_relationship(tx, rel_id)?
                        .ok_or_else(|| Error::ExecutionError("created relationship not found".into()))?;
                    new_row.insert(ra.clone(), Value::Relationship(Box::new(rel)));
                }
                out.push(new_row);
            }
            Ok(out)
        }

        LogicalPlan::Merge { input, match_plan, create_ops, on_create, on_match } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            let base_rows = if rows.is_empty() { vec![Row::new()] } else { rows };
            let mut out = Vec::with_capacity(base_rows.len());
            for row in base_rows {
                let row_seed = vec![row.clone()];
                let mut inner_cols = Vec::new();
                let matched = execute_plan(tx, match_plan, &row_seed, ctx, stats, &mut inner_cols)?;
                for col in &inner_cols {
                    bind_column(columns, col);
                }
                if !matched.is_empty() {
                    for mut m in matched {
                        apply_set_ops(tx, &mut m, on_match, ctx, stats)?;
                        out.push(m);
                    }
                } else {
                    let mut created = row.clone();
                    for op in create_ops {
                        apply_merge_create_op(tx, &mut created, op, ctx, stats, columns)?;
                    }
                    apply_set_ops(tx, &mut created, on_create, ctx, stats)?;
                    out.push(created);
                }
            }
            Ok(out)
        }

        LogicalPlan::SetProperty { input, variable, key, value } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                let val = eval_expr(value, row, ctx)?;
                set_one_property(tx, row, variable, key, val, ctx, stats)?;
            }
            Ok(rows)
        }

        LogicalPlan::SetAllProperties { input, variable, value } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                let map = match eval_expr(value, row, ctx)? {
                    Value::Map(m) => m,
                    other => return Err(Error::TypeError { expected: "Map".into(), got: other.type_name().into() }),
                };
                if let Some(Value::Node(n)) = row.get(variable) {
                    for key in node_property_keys(n) {
                        ctx.backend.remove_node_property(tx, n.id, &key)?;
                    }
                    for (key, val) in map {
                        ctx.backend.set_node_property(tx, n.id, &key, val)?;
                        stats.properties_set += 1;
                    }
                } else if let Some(Value::Relationship(r)) = row.get(variable) {
                    for key in r.properties.keys().cloned().collect::<Vec<_>>() {
                        ctx.backend.remove_relationship_property(tx, r.id, &key)?;
                    }
                    for (key, val) in map {
                        ctx.backend.set_relationship_property(tx, r.id, &key, val)?;
                        stats.properties_set += 1;
                    }
                }
            }
            Ok(rows)
        }

        LogicalPlan::SetMergeProperties { input, variable, value } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                let map = match eval_expr(value, row, ctx)? {
                    Value::Map(m) => m,
                    other => return Err(Error::TypeError { expected: "Map".into(), got: other.type_name().into() }),
                };
                if let Some(Value::Node(n)) = row.get(variable) {
                    for (key, val) in map {
                        ctx.backend.set_node_property(tx, n.id, &key, val)?;
                        stats.properties_set += 1;
                    }
                } else if let Some(Value::Relationship(r)) = row.get(variable) {
                    for (key, val) in map {
                        ctx.backend.set_relationship_property(tx, r.id, &key, val)?;
                        stats.properties_set += 1;
                    }
                }
            }
            Ok(rows)
        }

        LogicalPlan::SetLabel { input, variable, label } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                if let Some(Value::Node(n)) = row.get(variable) {
                    ctx.backend.add_label(tx, n.id, label)?;
                    stats.labels_added += 1;
                }
            }
            Ok(rows)
        }

        LogicalPlan::RemoveProperty { input, variable, key } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                if let Some(Value::Node(n)) = row.get(variable) {
                    ctx.backend.remove_node_property(tx, n.id, key)?;
                    stats.properties_set += 1;
                } else if let Some(Value::Relationship(r)) = row.get(variable) {
                    ctx.backend.remove_relationship_property(tx, r.id, key)?;
                    stats.properties_set += 1;
                }
            }
            Ok(rows)
        }

        LogicalPlan::RemoveLabel { input, variable, label } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                if let Some(Value::Node(n)) = row.get(variable) {
                    ctx.backend.remove_label(tx, n.id, label)?;
                    stats.labels_removed += 1;
                }
            }
            Ok(rows)
        }

        LogicalPlan::Delete { input, variables, detach } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                for variable in variables {
                    match row.get(variable) {
                        Some(Value::Node(n)) => {
                            if *detach {
                                ctx.backend.detach_delete_node(tx, n.id)?;
                            } else {
                                ctx.backend.delete_node(tx, n.id)?;
                            }
                            stats.nodes_deleted += 1;
                        }
                        Some(Value::Relationship(r)) => {
                            ctx.backend.delete_relationship(tx, r.id)?;
                            stats.relationships_deleted += 1;
                        }
                        _ => {}
                    }
                }
            }
            columns.clear();
            Ok(Vec::new())
        }

        LogicalPlan::Foreach { input, variable, list, body } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for row in &rows {
                let items = match eval_expr(list, row, ctx)? {
                    Value::List(items) => items,
                    Value::Null => Vec::new(),
                    other => return Err(Error::TypeError { expected: "List".into(), got: other.type_name().into() }),
                };
                let iter_seed: Vec<Row> = items
                    .into_iter()
                    .map(|item| {
                        let mut iter_row = row.clone();
                        iter_row.insert(variable.clone(), item);
                        iter_row
                    })
                    .collect();
                let mut body_columns = Vec::new();
                execute_plan(tx, body, &iter_seed, ctx, stats, &mut body_columns)?;
            }
            Ok(rows)
        }

        LogicalPlan::CallProcedure { input, name, args, yields } => {
            let input_rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            for (_, alias) in yields {
                bind_column(columns, alias);
            }
            let base_rows = if input_rows.is_empty() { vec![Row::new()] } else { input_rows };
            let mut out = Vec::new();
            for row in base_rows {
                let arg_vals: Vec<Value> = args.iter().map(|a| eval_expr(a, &row, ctx)).collect::<Result<_>>()?;
                let proc_result = ctx.backend.call_procedure(tx, name, arg_vals)?;
                for proc_row in proc_result.rows {
                    let mut merged = row.clone();
                    for (field, alias) in yields {
                        if let Some(val) = proc_row.get(field) {
                            merged.insert(alias.clone(), val.clone());
                        }
                    }
                    out.push(merged);
                }
            }
            Ok(out)
        }

        LogicalPlan::BindPath { input, alias, elements } => {
            let rows = execute_plan(tx, input, seed, ctx, stats, columns)?;
            bind_column(columns, alias);
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let path = build_path_value::<B>(tx, ctx, &row, elements)?;
                let mut row = row;
                row.insert(alias.clone(), Value::Path(Box::new(path)));
                out.push(row);
            }
            Ok(out)
        }
    }
}

/// Reconstructs a `model::Path` from the node/relationship aliases recorded
/// while planning a named path (`p = (a)-[:R*]->(b)`). Variable-length hops
/// bind a `Value::List` of relationships rather than a single one; the
/// nodes between those relationships were never individually bound, so
/// their endpoints are fetched from storage to keep the path unbroken.
fn build_path_value<B: StorageBackend>(
    tx: &mut B::Tx,
    ctx: &EvalCtx<B>,
    row: &Row,
    elements: &[PathElem],
) -> Result<Path> {
    let mut nodes: Vec<Node> = Vec::new();
    let mut rels: Vec<Relationship> = Vec::new();

    for elem in elements {
        match elem {
            PathElem::Node(alias) => {
                if let Some(Value::Node(n)) = row.get(alias) {
                    nodes.push((**n).clone());
                }
            }
            PathElem::Rel { alias, var_length } => {
                if *var_length {
                    if let Some(Value::List(items)) = row.get(alias) {
                        for item in items {
                            if let Value::Relationship(r) = item {
                                rels.push((**r).clone());
                            }
                        }
                    }
                } else if let Some(Value::Relationship(r)) = row.get(alias) {
                    rels.push((**r).clone());
                }
            }
        }
    }

    // Variable-length hops only bind their two endpoints as `PathElem::Node`;
    // fill in the intermediate nodes from the relationship chain itself so
    // `nodes.len() == rels.len() + 1` holds.
    if nodes.len() != rels.len() + 1 && !rels.is_empty() {
        let start = nodes.first().cloned().ok_or_else(|| Error::ExecutionError("cannot bind empty path".into()))?;
        let mut rebuilt = vec![start];
        for rel in &rels {
            let next_id = rel.other_node(rebuilt.last().expect("non-empty").id).unwrap_or(rel.dst);
            let node = ctx
                .backend
                .get_node(tx, next_id)?
                .ok_or_else(|| Error::ExecutionError(format!("path references missing node {next_id:?}")))?;
            rebuilt.push(node);
        }
        nodes = rebuilt;
    }

    Ok(Path { nodes, relationships: rels })
}

fn bind_column(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c == name) {
        columns.push(name.to_string());
    }
}

fn single(alias: &str, value: Value) -> Row {
    let mut row = Row::new();
    row.insert(alias.to_string(), value);
    row
}

fn node_id_of(row: &Row, variable: &str) -> Result<NodeId> {
    match row.get(variable) {
        Some(Value::Node(n)) => Ok(n.id),
        _ => Err(Error::ExecutionError(format!("'{variable}' is not a bound node"))),
    }
}

fn node_property_keys(n: &Node) -> Vec<String> {
    n.properties.keys().cloned().collect()
}

fn set_one_property<B: StorageBackend>(
    tx: &mut B::Tx,
    row: &Row,
    variable: &str,
    key: &str,
    val: Value,
    ctx: &EvalCtx<B>,
    stats: &mut ExecutionStats,
) -> Result<()> {
    match row.get(variable) {
        Some(Value::Node(n)) => {
            ctx.backend.set_node_property(tx, n.id, key, val)?;
            stats.properties_set += 1;
        }
        Some(Value::Relationship(r)) => {
            ctx.backend.set_relationship_property(tx, r.id, key, val)?;
            stats.properties_set += 1;
        }
        _ => {}
    }
    Ok(())
}

fn apply_set_ops<B: StorageBackend>(
    tx: &mut B::Tx,
    row: &mut Row,
    ops: &[SetOp],
    ctx: &EvalCtx<B>,
    stats: &mut ExecutionStats,
) -> Result<()> {
    for op in ops {
        match op {
            SetOp::Property { variable, key, value } => {
                let val = eval_expr(value, row, ctx)?;
                set_one_property(tx, row, variable, key, val, ctx, stats)?;
            }
            SetOp::AllProperties { variable, value } => {
                let map = match eval_expr(value, row, ctx)? {
                    Value::Map(m) => m,
                    other => return Err(Error::TypeError { expected: "Map".into(), got: other.type_name().into() }),
                };
                if let Some(Value::Node(n)) = row.get(variable) {
                    for key in node_property_keys(n) {
                        ctx.backend.remove_node_property(tx, n.id, &key)?;
                    }
                    for (key, val) in map {
                        ctx.backend.set_node_property(tx, n.id, &key, val)?;
                        stats.properties_set += 1;
                    }
                }
            }
            SetOp::MergeProperties { variable, value } => {
                let map = match eval_expr(value, row, ctx)? {
                    Value::Map(m) => m,
                    other => return Err(Error::TypeError { expected: "Map".into(), got: other.type_name().into() }),
                };
                if let Some(Value::Node(n)) = row.get(variable) {
                    for (key, val) in map {
                        ctx.backend.set_node_property(tx, n.id, &key, val)?;
                        stats.properties_set += 1;
                    }
                }
            }
            SetOp::Label { variable, label } => {
                if let Some(Value::Node(n)) = row.get(variable) {
                    ctx.backend.add_label(tx, n.id, label)?;
                    stats.labels_added += 1;
                }
            }
        }
        // Refresh the row's bound node/rel after a mutation so a later SET
        // item in the same ON CREATE/ON MATCH list sees up-to-date properties.
        refresh_bound_entities(tx, row, ctx)?;
    }
    Ok(())
}

fn refresh_bound_entities<B: StorageBackend>(tx: &mut B::Tx, row: &mut Row, ctx: &EvalCtx<B>) -> Result<()> {
    let refreshed: Vec<(String, Value)> = row
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Node(n) => ctx.backend.get_node(tx, n.id).ok().flatten().map(|n2| (k.clone(), Value::Node(Box::new(n2)))),
            _ => None,
        })
        .collect();
    for (k, v) in refreshed {
        row.insert(k, v);
    }
    Ok(())
}

fn apply_merge_create_op<B: StorageBackend>(
    tx: &mut B::Tx,
    row: &mut Row,
    op: &MergeCreateOp,
    ctx: &EvalCtx<B>,
    stats: &mut ExecutionStats,
    columns: &mut Vec<String>,
) -> Result<()> {
    match op {
        MergeCreateOp::Node { labels, properties, alias } => {
            if row.contains_key(alias) {
                return Ok(());
            }
            let mut props = PropertyMap::new();
            for (key, expr) in properties {
                props.insert(key.clone(), eval_expr(expr, row, ctx)?);
            }
            let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
            let node_id = ctx.backend.create_node(tx, &label_refs, props)?;
            stats.nodes_created += 1;
            let node =
                ctx.backend.get_node(tx, node_id)?.ok_or_else(|| Error::ExecutionError("created node not found".into()))?;
            row.insert(alias.clone(), Value::Node(Box::new(node)));
            bind_column(columns, alias);
        }
        MergeCreateOp::Rel { src, dst, rel_type, properties, alias } => {
            let src_id = node_id_of(row, src)?;
            let dst_id = node_id_of(row, dst)?;
            let mut props = PropertyMap::new();
            for (key, expr) in properties {
                props.insert(key.clone(), eval_expr(expr, row, ctx)?);
            }
            let rel_id = ctx.backend.create_relationship(tx, src_id, dst_id, rel_type, props)?;
            stats.relationships_created += 1;
            if let Some(ra) = alias {
                let rel = ctx
                    .backend
                    .get_relationship(tx, rel_id)?
                    .ok_or_else(|| Error::ExecutionError("created relationship not found".into()))?;
                row.insert(ra.clone(), Value::Relationship(Box::new(rel)));
                bind_column(columns, ra);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Expression evaluator
// ============================================================================

fn eval_expr<B: StorageBackend>(expr: &Expr, row: &Row, ctx: &EvalCtx<B>) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }),

        Expr::Variable(name) => {
            row.get(name).cloned().ok_or_else(|| Error::SemanticError(format!("Unbound variable: {name}")))
        }

        Expr::Parameter(name) => {
            ctx.params.get(name).cloned().ok_or_else(|| Error::SemanticError(format!("Missing parameter: ${name}")))
        }

        Expr::Property { expr: inner, key } => {
            let val = eval_expr(inner, row, ctx)?;
            match val {
                Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
                Value::Relationship(r) => Ok(r.properties.get(key).cloned().unwrap_or(Value::Null)),
                Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "Node, Relationship, or Map".into(), got: val.type_name().into() }),
            }
        }

        Expr::Index { expr: inner, index } => {
            let val = eval_expr(inner, row, ctx)?;
            let idx_val = eval_expr(index, row, ctx)?;
            match (&val, &idx_val) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::List(items), _) => {
                    let i = idx_val.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: idx_val.type_name().into() })?;
                    let i = if i < 0 { items.len() as i64 + i } else { i };
                    Ok(items.get(i as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Map(m), Value::String(k)) => Ok(m.get(k).cloned().unwrap_or(Value::Null)),
                _ => Err(Error::TypeError { expected: "List or Map".into(), got: val.type_name().into() }),
            }
        }

        Expr::Slice { expr: inner, from, to } => {
            let val = eval_expr(inner, row, ctx)?;
            let items = match val {
                Value::List(items) => items,
                Value::Null => return Ok(Value::Null),
                other => return Err(Error::TypeError { expected: "List".into(), got: other.type_name().into() }),
            };
            let len = items.len() as i64;
            let resolve = |e: &Option<Box<Expr>>, default: i64| -> Result<i64> {
                match e {
                    Some(expr) => {
                        let v = eval_expr(expr, row, ctx)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?;
                        Ok(if v < 0 { (len + v).max(0) } else { v.min(len) })
                    }
                    None => Ok(default),
                }
            };
            let start = resolve(from, 0)?;
            let end = resolve(to, len)?;
            if start >= end {
                Ok(Value::List(Vec::new()))
            } else {
                Ok(Value::List(items[start as usize..end as usize].to_vec()))
            }
        }

        Expr::FunctionCall { name, args, distinct: _ } => eval_function(name, args, row, ctx),

        Expr::BinaryOp { left, op, right } => {
            let lv = eval_expr(left, row, ctx)?;
            match op {
                BinaryOp::And => {
                    if !lv.is_truthy() && !lv.is_null() {
                        return Ok(Value::Bool(false));
                    }
                    let rv = eval_expr(right, row, ctx)?;
                    if lv.is_null() || rv.is_null() {
                        return Ok(if lv.is_truthy() == false && !lv.is_null() { Value::Bool(false) } else if !rv.is_truthy() && !rv.is_null() { Value::Bool(false) } else { Value::Null });
                    }
                    return Ok(Value::Bool(rv.is_truthy()));
                }
                BinaryOp::Or => {
                    if lv.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    let rv = eval_expr(right, row, ctx)?;
                    if lv.is_null() || rv.is_null() {
                        return Ok(if rv.is_truthy() { Value::Bool(true) } else { Value::Null });
                    }
                    return Ok(Value::Bool(rv.is_truthy()));
                }
                _ => {}
            }
            let rv = eval_expr(right, row, ctx)?;
            eval_binary_op(&lv, *op, &rv)
        }

        Expr::UnaryOp { op, expr: inner } => {
            let val = eval_expr(inner, row, ctx)?;
            match op {
                UnaryOp::Not => match val {
                    Value::Null => Ok(Value::Null),
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    _ => Ok(Value::Bool(!val.is_truthy())),
                },
                UnaryOp::Negate => match val {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    Value::Null => Ok(Value::Null),
                    _ => Err(Error::TypeError { expected: "Numeric".into(), got: val.type_name().into() }),
                },
            }
        }

        Expr::List(items) => {
            let vals: Vec<Value> = items.iter().map(|e| eval_expr(e, row, ctx)).collect::<Result<_>>()?;
            Ok(Value::List(vals))
        }

        Expr::MapLiteral(entries) => {
            let mut map = HashMap::new();
            for (k, v) in entries {
                map.insert(k.clone(), eval_expr(v, row, ctx)?);
            }
            Ok(Value::Map(map))
        }

        Expr::IsNull { expr: inner, negated } => {
            let val = eval_expr(inner, row, ctx)?;
            let is_null = val.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }

        Expr::In { expr: item, list } => {
            let item_val = eval_expr(item, row, ctx)?;
            let list_val = eval_expr(list, row, ctx)?;
            match list_val {
                Value::Null => Ok(Value::Null),
                Value::List(items) => {
                    if item_val.is_null() {
                        Ok(Value::Null)
                    } else {
                        Ok(Value::Bool(items.iter().any(|v| *v == item_val)))
                    }
                }
                _ => Err(Error::TypeError { expected: "List".into(), got: list_val.type_name().into() }),
            }
        }

        Expr::HasLabel { expr: inner, label } => {
            let val = eval_expr(inner, row, ctx)?;
            match val {
                Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
                Value::Null => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
            }
        }

        Expr::StringOp { left, op, right } => {
            let lv = eval_expr(left, row, ctx)?;
            let rv = eval_expr(right, row, ctx)?;
            match (&lv, &rv) {
                (Value::String(a), Value::String(b)) => {
                    let result = match op {
                        StringOp::StartsWith => a.starts_with(b.as_str()),
                        StringOp::EndsWith => a.ends_with(b.as_str()),
                        StringOp::Contains => a.contains(b.as_str()),
                    };
                    Ok(Value::Bool(result))
                }
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                _ => Err(Error::TypeError { expected: "String".into(), got: format!("{}, {}", lv.type_name(), rv.type_name()) }),
            }
        }

        Expr::Star => Ok(Value::Null),

        Expr::Case { operand, whens, else_expr } => {
            if let Some(op) = operand {
                let op_val = eval_expr(op, row, ctx)?;
                for (when_expr, then_expr) in whens {
                    let when_val = eval_expr(when_expr, row, ctx)?;
                    if op_val == when_val {
                        return eval_expr(then_expr, row, ctx);
                    }
                }
            } else {
                for (when_expr, then_expr) in whens {
                    let when_val = eval_expr(when_expr, row, ctx)?;
                    if when_val.is_truthy() {
                        return eval_expr(then_expr, row, ctx);
                    }
                }
            }
            match else_expr {
                Some(else_e) => eval_expr(else_e, row, ctx),
                None => Ok(Value::Null),
            }
        }

        Expr::Exists(match_clause) => {
            let Some(pattern) = match_clause.patterns.first() else {
                return Err(Error::ExecutionError("EXISTS requires a pattern".into()));
            };
            let matches = eval_pattern_matches(pattern, row, ctx)?;
            let matches = match &match_clause.where_clause {
                Some(w) => matches.into_iter().filter(|m| eval_expr(w, m, ctx).map(|v| v.is_truthy()).unwrap_or(false)).collect(),
                None => matches,
            };
            Ok(Value::Bool(!matches.is_empty()))
        }

        Expr::ListComprehension { variable, list, predicate, projection } => {
            let items = match eval_expr(list, row, ctx)? {
                Value::List(items) => items,
                Value::Null => return Ok(Value::Null),
                other => return Err(Error::TypeError { expected: "List".into(), got: other.type_name().into() }),
            };
            let mut out = Vec::new();
            for item in items {
                let mut sub = row.clone();
                sub.insert(variable.clone(), item.clone());
                if let Some(pred) = predicate {
                    if !eval_expr(pred, &sub, ctx)?.is_truthy() {
                        continue;
                    }
                }
                let val = match projection {
                    Some(p) => eval_expr(p, &sub, ctx)?,
                    None => item,
                };
                out.push(val);
            }
            Ok(Value::List(out))
        }

        Expr::PatternComprehension { pattern, where_clause, projection } => {
            let matches = eval_pattern_matches(pattern, row, ctx)?;
            let mut out = Vec::new();
            for m in matches {
                if let Some(w) = where_clause {
                    if !eval_expr(w, &m, ctx)?.is_truthy() {
                        continue;
                    }
                }
                out.push(eval_expr(projection, &m, ctx)?);
            }
            Ok(Value::List(out))
        }

        Expr::Quantifier { kind, variable, list, predicate } => {
            let items = match eval_expr(list, row, ctx)? {
                Value::List(items) => items,
                Value::Null => return Ok(Value::Null),
                other => return Err(Error::TypeError { expected: "List".into(), got: other.type_name().into() }),
            };
            let mut matched = 0usize;
            for item in &items {
                let mut sub = row.clone();
                sub.insert(variable.clone(), item.clone());
                if eval_expr(predicate, &sub, ctx)?.is_truthy() {
                    matched += 1;
                }
            }
            let result = match kind {
                QuantifierKind::All => matched == items.len(),
                QuantifierKind::Any => matched > 0,
                QuantifierKind::None => matched == 0,
                QuantifierKind::Single => matched == 1,
            };
            Ok(Value::Bool(result))
        }

        Expr::Reduce { accumulator, init, variable, list, expr: body } => {
            let mut acc = eval_expr(init, row, ctx)?;
            let items = match eval_expr(list, row, ctx)? {
                Value::List(items) => items,
                Value::Null => return Ok(Value::Null),
                other => return Err(Error::TypeError { expected: "List".into(), got: other.type_name().into() }),
            };
            for item in items {
                let mut sub = row.clone();
                sub.insert(accumulator.clone(), acc);
                sub.insert(variable.clone(), item);
                acc = eval_expr(body, &sub, ctx)?;
            }
            Ok(acc)
        }
    }
}

/// Walk a pattern from `row`'s already-bound variables (or, for a fresh
/// anchor, a label/all-nodes scan), returning one binding row per distinct
/// match. Shared by `EXISTS { ... }` and pattern comprehensions.
fn eval_pattern_matches<B: StorageBackend>(pattern: &Pattern, row: &Row, ctx: &EvalCtx<B>) -> Result<Vec<Row>> {
    let mut elements = pattern.elements.iter();
    let first = match elements.next() {
        Some(PatternElement::Node(n)) => n,
        _ => return Err(Error::ExecutionError("pattern must start with a node".into())),
    };

    let mut starts: Vec<Node> = Vec::new();
    if let Some(alias) = &first.alias {
        if let Some(Value::Node(n)) = row.get(alias) {
            starts.push((**n).clone());
        }
    }
    if starts.is_empty() {
        let candidates = match first.labels.first() {
            Some(l) => ctx.backend.nodes_by_label_for_exists(l)?,
            None => Vec::new(),
        };
        let candidates = if candidates.is_empty() && first.labels.is_empty() { ctx.backend.all_nodes_for_exists()? } else { candidates };
        for n in candidates {
            if node_matches_pattern(&n, first, row, ctx)? {
                starts.push(n);
            }
        }
    } else {
        let mut filtered = Vec::new();
        for n in starts {
            if node_matches_pattern(&n, first, row, ctx)? {
                filtered.push(n);
            }
        }
        starts = filtered;
    }

    let mut hops: Vec<(&RelPattern, &NodePattern)> = Vec::new();
    while let Some(PatternElement::Relationship(rp)) = elements.next() {
        let np = match elements.next() {
            Some(PatternElement::Node(n)) => n,
            _ => return Err(Error::ExecutionError("relationship must be followed by a node".into())),
        };
        hops.push((rp, np));
    }

    let mut results = Vec::new();
    for start in starts {
        let mut bindings = row.clone();
        if let Some(alias) = &first.alias {
            bindings.insert(alias.clone(), Value::Node(Box::new(start.clone())));
        }
        walk_pattern_hops(&start, &hops, bindings, &mut Vec::new(), ctx, &mut results)?;
    }
    Ok(results)
}

fn walk_pattern_hops<B: StorageBackend>(
    current: &Node,
    hops: &[(&RelPattern, &NodePattern)],
    bindings: Row,
    used_rels: &mut Vec<RelId>,
    ctx: &EvalCtx<B>,
    out: &mut Vec<Row>,
) -> Result<()> {
    let Some((rp, np)) = hops.first() else {
        out.push(bindings);
        return Ok(());
    };
    let dir = match rp.direction {
        crate::cypher::ast::PatternDirection::Right => Direction::Outgoing,
        crate::cypher::ast::PatternDirection::Left => Direction::Incoming,
        crate::cypher::ast::PatternDirection::Both => Direction::Both,
    };
    let rels = ctx.backend.get_relationships_for_exists(current.id, dir)?;
    for rel in rels {
        if !rp.rel_types.is_empty() && !rp.rel_types.iter().any(|t| *t == rel.rel_type) {
            continue;
        }
        if used_rels.contains(&rel.id) {
            continue;
        }
        let other_id = rel.other_node(current.id).unwrap_or(current.id);
        let Some(other) = ctx.backend.get_node_for_exists(other_id)? else { continue };
        if !node_matches_pattern(&other, np, &bindings, ctx)? {
            continue;
        }
        let mut next_bindings = bindings.clone();
        if let Some(alias) = &np.alias {
            next_bindings.insert(alias.clone(), Value::Node(Box::new(other.clone())));
        }
        if let Some(alias) = &rp.alias {
            next_bindings.insert(alias.clone(), Value::Relationship(Box::new(rel.clone())));
        }
        used_rels.push(rel.id);
        walk_pattern_hops(&other, &hops[1..], next_bindings, used_rels, ctx, out)?;
        used_rels.pop();
    }
    Ok(())
}

fn node_matches_pattern<B: StorageBackend>(n: &Node, np: &NodePattern, row: &Row, ctx: &EvalCtx<B>) -> Result<bool> {
    if !np.labels.iter().all(|l| n.has_label(l)) {
        return Ok(false);
    }
    for (key, expr) in &np.properties {
        let want = eval_expr(expr, row, ctx)?;
        let got = n.get(key).cloned().unwrap_or(Value::Null);
        if got != want {
            return Ok(false);
        }
    }
    Ok(true)
}

// ============================================================================
// Binary operator evaluation
// ============================================================================

fn eval_binary_op(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match op {
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Neq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => Ok(Value::Bool(left.neo4j_cmp(right) == Some(std::cmp::Ordering::Less))),
        BinaryOp::Lte => Ok(Value::Bool(matches!(left.neo4j_cmp(right), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)))),
        BinaryOp::Gt => Ok(Value::Bool(left.neo4j_cmp(right) == Some(std::cmp::Ordering::Greater))),
        BinaryOp::Gte => Ok(Value::Bool(matches!(left.neo4j_cmp(right), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)))),

        BinaryOp::Add => eval_add(left, right),
        BinaryOp::Sub => eval_arith(left, right, |a, b| a - b, |a, b| a - b),
        BinaryOp::Mul => eval_arith(left, right, |a, b| a * b, |a, b| a * b),
        BinaryOp::Div => match right {
            Value::Int(0) => Err(Error::ExecutionError("Division by zero".into())),
            Value::Float(f) if *f == 0.0 => Err(Error::ExecutionError("Division by zero".into())),
            _ => eval_arith(left, right, |a, b| a / b, |a, b| a / b),
        },
        BinaryOp::Mod => eval_arith(left, right, |a, b| a % b, |a, b| a % b),
        BinaryOp::Pow => {
            let l = left.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: left.type_name().into() })?;
            let r = right.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: right.type_name().into() })?;
            Ok(Value::Float(l.powf(r)))
        }

        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::Xor => Ok(Value::Bool(left.is_truthy() ^ right.is_truthy())),

        BinaryOp::RegexMatch => match (left, right) {
            (Value::String(s), Value::String(pattern)) => {
                let re = regex::Regex::new(pattern).map_err(|e| Error::ExecutionError(format!("invalid regex /{pattern}/: {e}")))?;
                Ok(Value::Bool(re.is_match(s)))
            }
            _ => Err(Error::TypeError { expected: "String".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
        },
    }
}

fn eval_add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut result = a.clone();
            result.extend(b.clone());
            Ok(Value::List(result))
        }
        (Value::List(a), b) => {
            let mut result = a.clone();
            result.push(b.clone());
            Ok(Value::List(result))
        }
        _ => Err(Error::TypeError { expected: "compatible types for +".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
    }
}

fn eval_arith(left: &Value, right: &Value, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Result<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        _ => Err(Error::TypeError { expected: "Numeric".into(), got: format!("{}, {}", left.type_name(), right.type_name()) }),
    }
}

// ============================================================================
// Built-in function evaluation
// ============================================================================

fn eval_function<B: StorageBackend>(name: &str, args: &[Expr], row: &Row, ctx: &EvalCtx<B>) -> Result<Value> {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "ID" => match eval_expr(args.first().ok_or_else(|| Error::ExecutionError("id() requires 1 argument".into()))?, row, ctx)? {
            Value::Node(n) => Ok(Value::Int(n.id.0 as i64)),
            Value::Relationship(r) => Ok(Value::Int(r.id.0 as i64)),
            val => Err(Error::TypeError { expected: "Node or Relationship".into(), got: val.type_name().into() }),
        },
        "LABELS" => match eval_expr(&args[0], row, ctx)? {
            Value::Node(n) => Ok(Value::List(n.labels.iter().map(|l| Value::String(l.clone())).collect())),
            val => Err(Error::TypeError { expected: "Node".into(), got: val.type_name().into() }),
        },
        "TYPE" => match eval_expr(&args[0], row, ctx)? {
            Value::Relationship(r) => Ok(Value::String(r.rel_type.clone())),
            val => Err(Error::TypeError { expected: "Relationship".into(), got: val.type_name().into() }),
        },
        "PROPERTIES" => match eval_expr(&args[0], row, ctx)? {
            Value::Node(n) => Ok(Value::Map(n.properties.clone())),
            Value::Relationship(r) => Ok(Value::Map(r.properties.clone())),
            val => Err(Error::TypeError { expected: "Node or Relationship".into(), got: val.type_name().into() }),
        },
        "KEYS" => match eval_expr(&args[0], row, ctx)? {
            Value::Node(n) => Ok(Value::List(n.properties.keys().map(|k| Value::String(k.clone())).collect())),
            Value::Relationship(r) => Ok(Value::List(r.properties.keys().map(|k| Value::String(k.clone())).collect())),
            Value::Map(m) => Ok(Value::List(m.keys().map(|k| Value::String(k.clone())).collect())),
            val => Err(Error::TypeError { expected: "Node, Relationship, or Map".into(), got: val.type_name().into() }),
        },
        "STARTNODE" => match eval_expr(&args[0], row, ctx)? {
            Value::Relationship(r) => ctx
                .backend
                .get_node_for_exists(r.src)?
                .map(|n| Value::Node(Box::new(n)))
                .ok_or_else(|| Error::NotFound(format!("node {}", r.src))),
            val => Err(Error::TypeError { expected: "Relationship".into(), got: val.type_name().into() }),
        },
        "ENDNODE" => match eval_expr(&args[0], row, ctx)? {
            Value::Relationship(r) => ctx
                .backend
                .get_node_for_exists(r.dst)?
                .map(|n| Value::Node(Box::new(n)))
                .ok_or_else(|| Error::NotFound(format!("node {}", r.dst))),
            val => Err(Error::TypeError { expected: "Relationship".into(), got: val.type_name().into() }),
        },
        "TOINTEGER" | "TOINT" => match eval_expr(&args[0], row, ctx)? {
            v @ Value::Int(_) => Ok(v),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| Error::TypeError { expected: "parseable integer".into(), got: s }),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "convertible to Integer".into(), got: val.type_name().into() }),
        },
        "TOFLOAT" => match eval_expr(&args[0], row, ctx)? {
            v @ Value::Float(_) => Ok(v),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| Error::TypeError { expected: "parseable float".into(), got: s }),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "convertible to Float".into(), got: val.type_name().into() }),
        },
        "TOSTRING" => {
            let val = eval_expr(&args[0], row, ctx)?;
            match val {
                Value::Null => Ok(Value::Null),
                Value::String(_) => Ok(val),
                other => Ok(Value::String(format!("{other}"))),
            }
        }
        "TOBOOLEAN" => match eval_expr(&args[0], row, ctx)? {
            v @ Value::Bool(_) => Ok(v),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Ok(Value::Null),
            },
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "convertible to Boolean".into(), got: val.type_name().into() }),
        },
        "SIZE" | "LENGTH" => match eval_expr(&args[0], row, ctx)? {
            Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(l) => Ok(Value::Int(l.len() as i64)),
            Value::Path(p) => Ok(Value::Int(p.len() as i64)),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "String, List, or Path".into(), got: val.type_name().into() }),
        },
        "HEAD" => match eval_expr(&args[0], row, ctx)? {
            Value::List(l) => Ok(l.into_iter().next().unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
        },
        "LAST" => match eval_expr(&args[0], row, ctx)? {
            Value::List(l) => Ok(l.into_iter().last().unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
        },
        "TAIL" => match eval_expr(&args[0], row, ctx)? {
            Value::List(mut l) => {
                if !l.is_empty() {
                    l.remove(0);
                }
                Ok(Value::List(l))
            }
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "List".into(), got: val.type_name().into() }),
        },
        "REVERSE" => match eval_expr(&args[0], row, ctx)? {
            Value::List(mut l) => {
                l.reverse();
                Ok(Value::List(l))
            }
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "List or String".into(), got: val.type_name().into() }),
        },
        "RANGE" => {
            let start = eval_expr(&args[0], row, ctx)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?;
            let end = eval_expr(&args[1], row, ctx)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?;
            let step = if args.len() > 2 {
                eval_expr(&args[2], row, ctx)?.as_int().ok_or_else(|| Error::TypeError { expected: "Integer".into(), got: "non-integer".into() })?
            } else {
                1
            };
            let mut list = Vec::new();
            let mut i = start;
            while (step > 0 && i <= end) || (step < 0 && i >= end) {
                list.push(Value::Int(i));
                i += step;
            }
            Ok(Value::List(list))
        }
        "COALESCE" => {
            for arg in args {
                let val = eval_expr(arg, row, ctx)?;
                if !val.is_null() {
                    return Ok(val);
                }
            }
            Ok(Value::Null)
        }
        "NODES" => match eval_expr(&args[0], row, ctx)? {
            Value::Path(p) => Ok(Value::List(p.nodes.into_iter().map(|n| Value::Node(Box::new(n))).collect())),
            val => Err(Error::TypeError { expected: "Path".into(), got: val.type_name().into() }),
        },
        "RELATIONSHIPS" | "RELS" => match eval_expr(&args[0], row, ctx)? {
            Value::Path(p) => Ok(Value::List(p.relationships.into_iter().map(|r| Value::Relationship(Box::new(r))).collect())),
            val => Err(Error::TypeError { expected: "Path".into(), got: val.type_name().into() }),
        },
        "ABS" => match eval_expr(&args[0], row, ctx)? {
            Value::Int(i) => Ok(Value::Int(i.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "Numeric".into(), got: val.type_name().into() }),
        },
        "CEIL" => Ok(Value::Float(eval_expr(&args[0], row, ctx)?.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: "non-numeric".into() })?.ceil())),
        "FLOOR" => Ok(Value::Float(eval_expr(&args[0], row, ctx)?.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: "non-numeric".into() })?.floor())),
        "ROUND" => Ok(Value::Float(eval_expr(&args[0], row, ctx)?.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: "non-numeric".into() })?.round())),
        "SQRT" => Ok(Value::Float(eval_expr(&args[0], row, ctx)?.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: "non-numeric".into() })?.sqrt())),
        "SIGN" => Ok(Value::Int(eval_expr(&args[0], row, ctx)?.as_float().ok_or_else(|| Error::TypeError { expected: "Numeric".into(), got: "non-numeric".into() })?.signum() as i64)),
        "TOUPPER" | "UPPER" => match eval_expr(&args[0], row, ctx)? {
            Value::String(s) => Ok(Value::String(s.to_uppercase())),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
        },
        "TOLOWER" | "LOWER" => match eval_expr(&args[0], row, ctx)? {
            Value::String(s) => Ok(Value::String(s.to_lowercase())),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
        },
        "TRIM" => match eval_expr(&args[0], row, ctx)? {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            Value::Null => Ok(Value::Null),
            val => Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
        },
        "SPLIT" => match (eval_expr(&args[0], row, ctx)?, eval_expr(&args[1], row, ctx)?) {
            (Value::String(s), Value::String(sep)) => {
                Ok(Value::List(s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()))
            }
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (a, b) => Err(Error::TypeError { expected: "String".into(), got: format!("{}, {}", a.type_name(), b.type_name()) }),
        },
        "SUBSTRING" => {
            let s = match eval_expr(&args[0], row, ctx)? {
                Value::String(s) => s,
                Value::Null => return Ok(Value::Null),
                val => return Err(Error::TypeError { expected: "String".into(), got: val.type_name().into() }),
            };
            let chars: Vec<char> = s.chars().collect();
            let start = eval_expr(&args[1], row, ctx)?.as_int().unwrap_or(0).max(0) as usize;
            let len = if args.len() > 2 { eval_expr(&args[2], row, ctx)?.as_int().unwrap_or(0).max(0) as usize } else { chars.len().saturating_sub(start) };
            let end = (start + len).min(chars.len());
            if start >= chars.len() {
                Ok(Value::String(String::new()))
            } else {
                Ok(Value::String(chars[start..end].iter().collect()))
            }
        }
        "REPLACE" => match (eval_expr(&args[0], row, ctx)?, eval_expr(&args[1], row, ctx)?, eval_expr(&args[2], row, ctx)?) {
            (Value::String(s), Value::String(from), Value::String(to)) => Ok(Value::String(s.replace(from.as_str(), &to))),
            _ => Ok(Value::Null),
        },
        // Aggregation functions are placeholders when evaluated per-row outside
        // an aggregation context; real aggregation goes through `aggregate_rows`.
        "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "COLLECT" | "STDEV" | "STDEVP" => {
            if args.is_empty() {
                Ok(Value::Int(1))
            } else {
                eval_expr(&args[0], row, ctx)
            }
        }
        _ => Err(Error::ExecutionError(format!("Unknown function: {name}"))),
    }
}

// ============================================================================
// Aggregation
// ============================================================================

fn aggregate_rows<B: StorageBackend>(
    rows: &[Row],
    group_by: &[(Expr, String)],
    aggregations: &[(Expr, String)],
    ctx: &EvalCtx<B>,
) -> Result<Vec<Row>> {
    let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();

    for row in rows {
        let key: Vec<Value> = group_by.iter().map(|(expr, _)| eval_expr(expr, row, ctx).unwrap_or(Value::Null)).collect();
        if let Some(group) = groups.iter_mut().find(|(k, _)| *k == key) {
            group.1.push(row);
        } else {
            groups.push((key, vec![row]));
        }
    }

    if groups.is_empty() && group_by.is_empty() {
        let mut result_row = Row::new();
        for (expr, alias) in aggregations {
            result_row.insert(alias.clone(), compute_aggregate(expr, &[], ctx)?);
        }
        return Ok(vec![result_row]);
    }

    let mut result = Vec::new();
    for (key_vals, group_rows) in &groups {
        let mut row = Row::new();
        for (i, (_, alias)) in group_by.iter().enumerate() {
            row.insert(alias.clone(), key_vals[i].clone());
        }
        for (expr, alias) in aggregations {
            row.insert(alias.clone(), compute_aggregate(expr, group_rows, ctx)?);
        }
        result.push(row);
    }
    Ok(result)
}

fn compute_aggregate<B: StorageBackend>(expr: &Expr, rows: &[&Row], ctx: &EvalCtx<B>) -> Result<Value> {
    match expr {
        Expr::FunctionCall { name, args, distinct } => {
            let upper = name.to_uppercase();
            let vals: Vec<Value> = if args.is_empty() {
                vec![]
            } else {
                let mut v = Vec::new();
                for row in rows {
                    let val = eval_expr(&args[0], row, ctx)?;
                    if !val.is_null() {
                        v.push(val);
                    }
                }
                if *distinct {
                    let mut deduped = Vec::new();
                    for val in v {
                        if !deduped.contains(&val) {
                            deduped.push(val);
                        }
                    }
                    deduped
                } else {
                    v
                }
            };

            match upper.as_str() {
                "COUNT" => {
                    if args.is_empty() {
                        Ok(Value::Int(rows.len() as i64))
                    } else {
                        Ok(Value::Int(vals.len() as i64))
                    }
                }
                "SUM" => {
                    let mut sum_i: i64 = 0;
                    let mut sum_f: f64 = 0.0;
                    let mut has_float = false;
                    for val in &vals {
                        match val {
                            Value::Int(i) => sum_i += i,
                            Value::Float(f) => { has_float = true; sum_f += f; }
                            _ => {}
                        }
                    }
                    if has_float {
                        Ok(Value::Float(sum_i as f64 + sum_f))
                    } else {
                        Ok(Value::Int(sum_i))
                    }
                }
                "AVG" => {
                    if vals.is_empty() { return Ok(Value::Null); }
                    let sum: f64 = vals.iter().map(|v| v.as_float().unwrap_or(0.0)).sum();
                    Ok(Value::Float(sum / vals.len() as f64))
                }
                "MIN" => Ok(vals.into_iter().reduce(|a, b| if a.neo4j_cmp(&b) == Some(std::cmp::Ordering::Less) { a } else { b }).unwrap_or(Value::Null)),
                "MAX" => Ok(vals.into_iter().reduce(|a, b| if a.neo4j_cmp(&b) == Some(std::cmp::Ordering::Greater) { a } else { b }).unwrap_or(Value::Null)),
                "COLLECT" => Ok(Value::List(vals)),
                "STDEV" => Ok(Value::Float(sample_stdev(&vals, 1))),
                "STDEVP" => Ok(Value::Float(sample_stdev(&vals, 0))),
                _ => Err(Error::ExecutionError(format!("Unknown aggregate: {name}"))),
            }
        }
        other => {
            if let Some(row) = rows.first() {
                eval_expr(other, row, ctx)
            } else {
                Ok(Value::Null)
            }
        }
    }
}

/// `ddof` is 1 for the sample standard deviation (Cypher's `stDev`) and 0
/// for the population standard deviation (`stDevP`).
fn sample_stdev(vals: &[Value], ddof: usize) -> f64 {
    let nums: Vec<f64> = vals.iter().filter_map(Value::as_float).collect();
    if nums.len() <= ddof {
        return 0.0;
    }
    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
    let variance = nums.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (nums.len() - ddof) as f64;
    variance.sqrt()
}

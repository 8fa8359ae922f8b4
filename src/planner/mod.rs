//! Query planner — transforms a Cypher AST into a logical plan tree.
//!
//! The planner is backend-agnostic: it never talks to a `StorageBackend`.
//! It folds `Query::clauses` left to right, threading an ordered list of
//! bound variable names through the fold so that later clauses know which
//! aliases already exist in the row versus which still need a scan.

use crate::cypher::ast::{
    BinaryOp, Clause, CreateClause, Expr, ForeachClause, MatchClause, MergeClause, NodePattern,
    Pattern, PatternDirection, PatternElement, ProjectionClause, RelPattern, RemoveClause,
    RemoveItem, SetClause, SetItem, Statement,
};
use crate::model::{Direction, PropertyMap};
use crate::{Error, Result};

/// Hard ceiling applied to an unbounded variable-length relationship
/// (`-[*]-`) when neither the pattern nor the caller names a maximum.
/// Mirrors `storage::BackendConfig::variable_length_max_hops`'s default.
pub const DEFAULT_VAR_LENGTH_MAX: usize = 15;

// ============================================================================
// Logical plan
// ============================================================================

/// Logical plan node. Every variant that reads rows carries its own `input`
/// so the tree can be walked and executed as a single recursive pull.
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// Leaf producing the rows the executor seeds it with (one empty row at
    /// the top of a query, or one row per FOREACH iteration).
    Argument,
    /// Scan all nodes with a given label.
    NodeScan { label: String, alias: String },
    /// Scan every node in the graph (no label given in the pattern).
    AllNodesScan { alias: String },
    /// Equality lookup on a single label+property — falls back to a label
    /// scan at execution time if the backend has no real index.
    IndexLookup { label: String, property: String, value: Expr, alias: String },
    /// Expand relationships from a bound node. Drops the row if there is
    /// no match (inner join semantics).
    Expand {
        input: Box<LogicalPlan>,
        from: String,
        dir: Direction,
        rel_types: Vec<String>,
        to: String,
        rel_alias: Option<String>,
    },
    /// Like `Expand`, but null-fills `to`/`rel_alias` instead of dropping
    /// the row when there is no match (`OPTIONAL MATCH`).
    OptionalExpand {
        input: Box<LogicalPlan>,
        from: String,
        dir: Direction,
        rel_types: Vec<String>,
        to: String,
        rel_alias: Option<String>,
    },
    /// Variable-length expansion (`-[*min..max]-`), binding `to` to the
    /// final node and `rel_alias` (if present) to the list of traversed
    /// relationships.
    VarLengthExpand {
        input: Box<LogicalPlan>,
        from: String,
        dir: Direction,
        rel_types: Vec<String>,
        to: String,
        rel_alias: Option<String>,
        min: usize,
        max: usize,
    },
    /// Filter rows by predicate.
    Filter { input: Box<LogicalPlan>, predicate: Expr },
    /// Final projection (RETURN).
    Project { input: Box<LogicalPlan>, items: Vec<(Expr, String)> },
    /// Pipeline-boundary projection (WITH). Identical execution to
    /// `Project`; kept distinct so the planner can reason about variable
    /// scoping across the boundary.
    With { input: Box<LogicalPlan>, items: Vec<(Expr, String)> },
    /// UNWIND expr AS alias.
    Unwind { input: Box<LogicalPlan>, expr: Expr, alias: String },
    /// DISTINCT over the current row set.
    Distinct { input: Box<LogicalPlan> },
    /// ORDER BY.
    Sort { input: Box<LogicalPlan>, keys: Vec<(Expr, bool)> },
    /// SKIP n.
    Skip { input: Box<LogicalPlan>, count: usize },
    /// LIMIT n.
    Limit { input: Box<LogicalPlan>, count: usize },
    /// Grouped aggregation. `group_by` is every non-aggregate projection
    /// item; `aggregations` the aggregate function calls.
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<(Expr, String)>,
        aggregations: Vec<(Expr, String)>,
    },
    /// Cartesian product of two independent pattern branches.
    CartesianProduct { left: Box<LogicalPlan>, right: Box<LogicalPlan> },
    /// Create a node per input row.
    CreateNode {
        input: Box<LogicalPlan>,
        labels: Vec<String>,
        properties: Vec<(String, Expr)>,
        alias: String,
    },
    /// Create a relationship between two already-bound node aliases.
    CreateRel {
        input: Box<LogicalPlan>,
        src: String,
        dst: String,
        rel_type: String,
        properties: Vec<(String, Expr)>,
        alias: Option<String>,
    },
    /// Whole-pattern-atomic MERGE: run `match_plan` seeded from each input
    /// row; if it yields rows, apply `on_match`; otherwise run
    /// `create_ops` in order and apply `on_create`.
    Merge {
        input: Box<LogicalPlan>,
        match_plan: Box<LogicalPlan>,
        create_ops: Vec<MergeCreateOp>,
        on_create: Vec<SetOp>,
        on_match: Vec<SetOp>,
    },
    SetProperty { input: Box<LogicalPlan>, variable: String, key: String, value: Expr },
    SetAllProperties { input: Box<LogicalPlan>, variable: String, value: Expr },
    SetMergeProperties { input: Box<LogicalPlan>, variable: String, value: Expr },
    SetLabel { input: Box<LogicalPlan>, variable: String, label: String },
    RemoveProperty { input: Box<LogicalPlan>, variable: String, key: String },
    RemoveLabel { input: Box<LogicalPlan>, variable: String, label: String },
    /// DELETE / DETACH DELETE. Each variable is type-checked at execution
    /// time (it may be a node or a relationship).
    Delete { input: Box<LogicalPlan>, variables: Vec<String>, detach: bool },
    /// FOREACH (var IN list | updates...). `body` is planned against a
    /// fresh `Argument` seeded per iteration with `var` bound.
    Foreach { input: Box<LogicalPlan>, variable: String, list: Expr, body: Box<LogicalPlan> },
    /// CALL a procedure, optionally piping rows through it.
    CallProcedure {
        input: Box<LogicalPlan>,
        name: String,
        args: Vec<Expr>,
        yields: Vec<(String, String)>,
    },
    /// Materializes a named path (`p = (a)-[:R*]->(b)`) from the node and
    /// relationship aliases bound while walking the pattern chain, and
    /// binds it as a `Value::Path` under `alias`.
    BindPath { input: Box<LogicalPlan>, alias: String, elements: Vec<PathElem> },
}

/// One element of a pattern chain being tracked for a named path binding.
/// `Rel::var_length` distinguishes a single bound relationship from a
/// variable-length hop, whose alias holds a `Value::List` of relationships.
#[derive(Debug, Clone)]
pub enum PathElem {
    Node(String),
    Rel { alias: String, var_length: bool },
}

/// One CREATE operation inside a MERGE's create branch.
#[derive(Debug, Clone)]
pub enum MergeCreateOp {
    Node { labels: Vec<String>, properties: Vec<(String, Expr)>, alias: String },
    Rel { src: String, dst: String, rel_type: String, properties: Vec<(String, Expr)>, alias: Option<String> },
}

/// A SET mutation applied by MERGE's `ON CREATE`/`ON MATCH` branches.
#[derive(Debug, Clone)]
pub enum SetOp {
    Property { variable: String, key: String, value: Expr },
    AllProperties { variable: String, value: Expr },
    MergeProperties { variable: String, value: Expr },
    Label { variable: String, label: String },
}

// ============================================================================
// Entry point
// ============================================================================

/// Plan a parsed statement. Schema commands (`CREATE INDEX`, ...) are not
/// representable as a `LogicalPlan` — callers dispatch those directly
/// against the backend instead of going through this function.
pub fn plan(ast: &Statement, params: &PropertyMap) -> Result<LogicalPlan> {
    match ast {
        Statement::Query(query) => {
            let mut builder = PlanBuilder::new(params);
            let mut node = LogicalPlan::Argument;
            for clause in &query.clauses {
                node = builder.apply_clause(node, clause)?;
            }
            Ok(node)
        }
        Statement::Schema(_) => Err(Error::PlanError(
            "schema commands are executed directly, not planned".into(),
        )),
    }
}

/// Optimize a logical plan. Currently a no-op pass-through; the shape the
/// planner already produces (label/index scans as leaves, filters placed
/// immediately after the scan they narrow) covers the common cases without
/// a separate rewrite pass.
pub fn optimize(plan: LogicalPlan) -> Result<LogicalPlan> {
    Ok(plan)
}

// ============================================================================
// Plan builder
// ============================================================================

struct PlanBuilder<'p> {
    params: &'p PropertyMap,
    bound: Vec<String>,
    anon_counter: usize,
}

impl<'p> PlanBuilder<'p> {
    fn new(params: &'p PropertyMap) -> Self {
        Self { params, bound: Vec::new(), anon_counter: 0 }
    }

    fn fresh_alias(&mut self) -> String {
        self.anon_counter += 1;
        format!("__anon{}", self.anon_counter)
    }

    fn bind(&mut self, alias: &str) {
        if !self.bound.contains(&alias.to_string()) {
            self.bound.push(alias.to_string());
        }
    }

    fn apply_clause(&mut self, input: LogicalPlan, clause: &Clause) -> Result<LogicalPlan> {
        match clause {
            Clause::Match(m) => self.apply_match(input, m),
            Clause::Unwind(u) => {
                let alias = u.variable.clone();
                self.bind(&alias);
                Ok(LogicalPlan::Unwind { input: Box::new(input), expr: u.expr.clone(), alias })
            }
            Clause::With(w) => self.apply_projection_clause(input, &w.projection, w.where_clause.as_ref(), true),
            Clause::Create(c) => self.apply_create(input, c),
            Clause::Merge(m) => self.apply_merge(input, m),
            Clause::Set(s) => self.apply_set(input, s),
            Clause::Remove(r) => self.apply_remove(input, r),
            Clause::Delete(d) => {
                let variables = d.variables.iter().map(expr_as_variable).collect::<Result<Vec<_>>>()?;
                Ok(LogicalPlan::Delete { input: Box::new(input), variables, detach: d.detach })
            }
            Clause::Foreach(f) => self.apply_foreach(input, f),
            Clause::Call(c) => {
                let yields: Vec<(String, String)> = c
                    .yields
                    .iter()
                    .map(|(field, alias)| {
                        let bound_name = alias.clone().unwrap_or_else(|| field.clone());
                        self.bind(&bound_name);
                        (field.clone(), bound_name)
                    })
                    .collect();
                Ok(LogicalPlan::CallProcedure {
                    input: Box::new(input),
                    name: c.name.clone(),
                    args: c.args.clone(),
                    yields,
                })
            }
            Clause::Return(r) => self.apply_projection_clause(input, &r.projection, None, false),
        }
    }

    // ------------------------------------------------------------------
    // MATCH
    // ------------------------------------------------------------------

    fn apply_match(&mut self, mut input: LogicalPlan, m: &MatchClause) -> Result<LogicalPlan> {
        for pattern in &m.patterns {
            let mut path_elems = pattern.path_variable.is_some().then(Vec::new);
            input = self.build_pattern_plan_inner(pattern, input, m.optional, path_elems.as_mut())?;
            if let (Some(path_var), Some(elements)) = (&pattern.path_variable, path_elems) {
                self.bind(path_var);
                input = LogicalPlan::BindPath { input: Box::new(input), alias: path_var.clone(), elements };
            }
        }
        if let Some(where_expr) = &m.where_clause {
            input = LogicalPlan::Filter { input: Box::new(input), predicate: where_expr.clone() };
        }
        Ok(input)
    }

    /// Fold one `(a)-[r]->(b)-...` pattern into the plan, reusing already
    /// bound aliases as join anchors instead of re-scanning them. Shared by
    /// MATCH, MERGE's match branch, and CREATE's attach-to-existing case.
    fn build_pattern_plan(&mut self, pattern: &Pattern, current: LogicalPlan, optional: bool) -> Result<LogicalPlan> {
        self.build_pattern_plan_inner(pattern, current, optional, None)
    }

    /// As `build_pattern_plan`, but when `path_elems` is `Some` also records
    /// the ordered node/relationship aliases so the caller can bind a named
    /// path (`p = (a)-[:R]->(b)`) once the chain is built. When tracking a
    /// path, every relationship segment is given a real alias (synthesizing
    /// one if the pattern didn't name it) so the executor has something to
    /// read the relationship(s) back from.
    fn build_pattern_plan_inner(
        &mut self,
        pattern: &Pattern,
        mut current: LogicalPlan,
        optional: bool,
        mut path_elems: Option<&mut Vec<PathElem>>,
    ) -> Result<LogicalPlan> {
        let mut elements = pattern.elements.iter();
        let mut prev_alias: Option<String> = None;

        while let Some(element) = elements.next() {
            match element {
                PatternElement::Node(np) => {
                    let alias = np.alias.clone().unwrap_or_else(|| self.fresh_alias());
                    if !self.bound.contains(&alias) {
                        self.bind(&alias);
                        let used_index = is_index_candidate(np);
                        let scan = scan_for_node(np, &alias, used_index);
                        current = if matches!(current, LogicalPlan::Argument) {
                            scan
                        } else {
                            LogicalPlan::CartesianProduct { left: Box::new(current), right: Box::new(scan) }
                        };
                        if let Some(predicate) = residual_node_filter(np, &alias, used_index) {
                            current = LogicalPlan::Filter { input: Box::new(current), predicate };
                        }
                    }
                    if let Some(elems) = path_elems.as_deref_mut() {
                        elems.push(PathElem::Node(alias.clone()));
                    }
                    prev_alias = Some(alias);
                }
                PatternElement::Relationship(rp) => {
                    let next = elements
                        .next()
                        .ok_or_else(|| Error::PlanError("relationship pattern must be followed by a node".into()))?;
                    let np = match next {
                        PatternElement::Node(n) => n,
                        PatternElement::Relationship(_) => {
                            return Err(Error::PlanError("two relationship patterns cannot be adjacent".into()));
                        }
                    };
                    let from_alias = prev_alias
                        .take()
                        .ok_or_else(|| Error::PlanError("relationship pattern must follow a node".into()))?;
                    let to_alias = np.alias.clone().unwrap_or_else(|| self.fresh_alias());
                    let to_is_new = !self.bound.contains(&to_alias);
                    self.bind(&to_alias);
                    if let Some(ra) = &rp.alias {
                        self.bind(ra);
                    }

                    let dir = pattern_direction(rp.direction);
                    let rel_types = rp.rel_types.clone();
                    let is_var_length = rp.var_length.is_some();
                    let rel_alias = if path_elems.is_some() {
                        let ra = rp.alias.clone().unwrap_or_else(|| self.fresh_alias());
                        self.bind(&ra);
                        Some(ra)
                    } else {
                        rp.alias.clone()
                    };
                    if let (Some(elems), Some(ra)) = (path_elems.as_deref_mut(), &rel_alias) {
                        elems.push(PathElem::Rel { alias: ra.clone(), var_length: is_var_length });
                    }

                    current = if let Some(vl) = &rp.var_length {
                        LogicalPlan::VarLengthExpand {
                            input: Box::new(current),
                            from: from_alias,
                            dir,
                            rel_types,
                            to: to_alias.clone(),
                            rel_alias,
                            min: vl.min.unwrap_or(1),
                            max: vl.max.unwrap_or(DEFAULT_VAR_LENGTH_MAX),
                        }
                    } else if optional {
                        LogicalPlan::OptionalExpand {
                            input: Box::new(current),
                            from: from_alias,
                            dir,
                            rel_types,
                            to: to_alias.clone(),
                            rel_alias,
                        }
                    } else {
                        LogicalPlan::Expand {
                            input: Box::new(current),
                            from: from_alias,
                            dir,
                            rel_types,
                            to: to_alias.clone(),
                            rel_alias,
                        }
                    };

                    if to_is_new {
                        if let Some(predicate) = residual_node_filter(np, &to_alias, false) {
                            current = LogicalPlan::Filter { input: Box::new(current), predicate };
                        }
                    }
                    if let Some(elems) = path_elems.as_deref_mut() {
                        elems.push(PathElem::Node(to_alias.clone()));
                    }
                    prev_alias = Some(to_alias);
                }
            }
        }
        Ok(current)
    }

    // ------------------------------------------------------------------
    // CREATE
    // ------------------------------------------------------------------

    fn apply_create(&mut self, mut input: LogicalPlan, c: &CreateClause) -> Result<LogicalPlan> {
        for pattern in &c.patterns {
            input = self.build_create_pattern(pattern, input)?;
        }
        Ok(input)
    }

    fn build_create_pattern(&mut self, pattern: &Pattern, mut current: LogicalPlan) -> Result<LogicalPlan> {
        let mut elements = pattern.elements.iter();
        let mut prev_alias: Option<String> = None;

        while let Some(element) = elements.next() {
            match element {
                PatternElement::Node(np) => {
                    let alias = np.alias.clone().unwrap_or_else(|| self.fresh_alias());
                    if !self.bound.contains(&alias) {
                        self.bind(&alias);
                        current = LogicalPlan::CreateNode {
                            input: Box::new(current),
                            labels: np.labels.clone(),
                            properties: np.properties.clone().into_iter().collect(),
                            alias: alias.clone(),
                        };
                    }
                    prev_alias = Some(alias);
                }
                PatternElement::Relationship(rp) => {
                    let next = elements
                        .next()
                        .ok_or_else(|| Error::PlanError("relationship pattern must be followed by a node".into()))?;
                    let np = match next {
                        PatternElement::Node(n) => n,
                        PatternElement::Relationship(_) => {
                            return Err(Error::PlanError("two relationship patterns cannot be adjacent".into()));
                        }
                    };
                    let from_alias = prev_alias
                        .take()
                        .ok_or_else(|| Error::PlanError("relationship pattern must follow a node".into()))?;
                    let to_alias = np.alias.clone().unwrap_or_else(|| self.fresh_alias());
                    if !self.bound.contains(&to_alias) {
                        self.bind(&to_alias);
                        current = LogicalPlan::CreateNode {
                            input: Box::new(current),
                            labels: np.labels.clone(),
                            properties: np.properties.clone().into_iter().collect(),
                            alias: to_alias.clone(),
                        };
                    }
                    let rel_type = rp
                        .rel_types
                        .first()
                        .cloned()
                        .ok_or_else(|| Error::PlanError("CREATE requires a relationship type".into()))?;
                    current = LogicalPlan::CreateRel {
                        input: Box::new(current),
                        src: from_alias,
                        dst: to_alias.clone(),
                        rel_type,
                        properties: rp.properties.clone().into_iter().collect(),
                        alias: rp.alias.clone(),
                    };
                    if let Some(ra) = &rp.alias {
                        self.bind(ra);
                    }
                    prev_alias = Some(to_alias);
                }
            }
        }
        Ok(current)
    }

    // ------------------------------------------------------------------
    // MERGE
    // ------------------------------------------------------------------

    fn apply_merge(&mut self, input: LogicalPlan, m: &MergeClause) -> Result<LogicalPlan> {
        // The match branch is planned from its own clean `Argument`, seeded
        // per outer row at execution time, so it can be tried in isolation
        // before any create op runs.
        let saved_bound = self.bound.clone();
        let match_plan = self.build_pattern_plan(&m.pattern, LogicalPlan::Argument, false)?;
        let pattern_bound: Vec<String> = self.bound.iter().filter(|a| !saved_bound.contains(a)).cloned().collect();
        self.bound = saved_bound;
        for alias in &pattern_bound {
            self.bind(alias);
        }

        let create_ops = self.build_merge_create_ops(&m.pattern)?;
        let on_create = m.on_create.iter().map(set_item_to_op).collect();
        let on_match = m.on_match.iter().map(set_item_to_op).collect();

        Ok(LogicalPlan::Merge {
            input: Box::new(input),
            match_plan: Box::new(match_plan),
            create_ops,
            on_create,
            on_match,
        })
    }

    fn build_merge_create_ops(&self, pattern: &Pattern) -> Result<Vec<MergeCreateOp>> {
        let mut ops = Vec::new();
        let mut elements = pattern.elements.iter();
        let mut prev_alias: Option<String> = None;
        let mut anon = self.anon_counter;
        let mut next_anon = || {
            anon += 1;
            format!("__anon{anon}")
        };

        while let Some(element) = elements.next() {
            match element {
                PatternElement::Node(np) => {
                    let alias = np.alias.clone().unwrap_or_else(&mut next_anon);
                    ops.push(MergeCreateOp::Node {
                        labels: np.labels.clone(),
                        properties: np.properties.clone().into_iter().collect(),
                        alias: alias.clone(),
                    });
                    prev_alias = Some(alias);
                }
                PatternElement::Relationship(rp) => {
                    let next = elements
                        .next()
                        .ok_or_else(|| Error::PlanError("relationship pattern must be followed by a node".into()))?;
                    let np = match next {
                        PatternElement::Node(n) => n,
                        PatternElement::Relationship(_) => {
                            return Err(Error::PlanError("two relationship patterns cannot be adjacent".into()));
                        }
                    };
                    let from_alias = prev_alias
                        .take()
                        .ok_or_else(|| Error::PlanError("relationship pattern must follow a node".into()))?;
                    let to_alias = np.alias.clone().unwrap_or_else(&mut next_anon);
                    // The node may already have an op from being visited above;
                    // only push a new one if this is its first appearance.
                    if !ops.iter().any(|op| matches!(op, MergeCreateOp::Node { alias, .. } if *alias == to_alias)) {
                        ops.push(MergeCreateOp::Node {
                            labels: np.labels.clone(),
                            properties: np.properties.clone().into_iter().collect(),
                            alias: to_alias.clone(),
                        });
                    }
                    let rel_type = rp
                        .rel_types
                        .first()
                        .cloned()
                        .ok_or_else(|| Error::PlanError("MERGE requires a relationship type".into()))?;
                    ops.push(MergeCreateOp::Rel {
                        src: from_alias,
                        dst: to_alias.clone(),
                        rel_type,
                        properties: rp.properties.clone().into_iter().collect(),
                        alias: rp.alias.clone(),
                    });
                    prev_alias = Some(to_alias);
                }
            }
        }
        Ok(ops)
    }

    // ------------------------------------------------------------------
    // SET / REMOVE
    // ------------------------------------------------------------------

    fn apply_set(&mut self, mut input: LogicalPlan, s: &SetClause) -> Result<LogicalPlan> {
        for item in &s.items {
            input = match item {
                SetItem::Property { variable, key, value } => LogicalPlan::SetProperty {
                    input: Box::new(input),
                    variable: variable.clone(),
                    key: key.clone(),
                    value: value.clone(),
                },
                SetItem::AllProperties { variable, value } => LogicalPlan::SetAllProperties {
                    input: Box::new(input),
                    variable: variable.clone(),
                    value: value.clone(),
                },
                SetItem::MergeProperties { variable, value } => LogicalPlan::SetMergeProperties {
                    input: Box::new(input),
                    variable: variable.clone(),
                    value: value.clone(),
                },
                SetItem::Label { variable, label } => LogicalPlan::SetLabel {
                    input: Box::new(input),
                    variable: variable.clone(),
                    label: label.clone(),
                },
            };
        }
        Ok(input)
    }

    fn apply_remove(&mut self, mut input: LogicalPlan, r: &RemoveClause) -> Result<LogicalPlan> {
        for item in &r.items {
            input = match item {
                RemoveItem::Property { variable, key } => LogicalPlan::RemoveProperty {
                    input: Box::new(input),
                    variable: variable.clone(),
                    key: key.clone(),
                },
                RemoveItem::Label { variable, label } => LogicalPlan::RemoveLabel {
                    input: Box::new(input),
                    variable: variable.clone(),
                    label: label.clone(),
                },
            };
        }
        Ok(input)
    }

    // ------------------------------------------------------------------
    // FOREACH
    // ------------------------------------------------------------------

    fn apply_foreach(&mut self, input: LogicalPlan, f: &ForeachClause) -> Result<LogicalPlan> {
        let saved_bound = self.bound.clone();
        self.bind(&f.variable);
        let mut body = LogicalPlan::Argument;
        for clause in &f.updates {
            body = self.apply_clause(body, clause)?;
        }
        self.bound = saved_bound;
        Ok(LogicalPlan::Foreach {
            input: Box::new(input),
            variable: f.variable.clone(),
            list: f.list.clone(),
            body: Box::new(body),
        })
    }

    // ------------------------------------------------------------------
    // WITH / RETURN
    // ------------------------------------------------------------------

    fn apply_projection_clause(
        &mut self,
        input: LogicalPlan,
        proj: &ProjectionClause,
        where_clause: Option<&Expr>,
        is_with: bool,
    ) -> Result<LogicalPlan> {
        let mut node = input;

        let items: Vec<(Expr, String)> = if proj.items.len() == 1 && matches!(proj.items[0].expr, Expr::Star) {
            // RETURN * / WITH * — project every currently bound variable.
            self.bound.iter().map(|v| (Expr::Variable(v.clone()), v.clone())).collect()
        } else {
            proj.items
                .iter()
                .map(|item| {
                    let alias = item.alias.clone().unwrap_or_else(|| expr_display_name(&item.expr));
                    (item.expr.clone(), alias)
                })
                .collect()
        };

        let has_aggregate = items.iter().any(|(expr, _)| expr_contains_aggregate(expr));
        node = if has_aggregate {
            let mut group_by = Vec::new();
            let mut aggregations = Vec::new();
            for (expr, alias) in &items {
                if expr_contains_aggregate(expr) {
                    aggregations.push((expr.clone(), alias.clone()));
                } else {
                    group_by.push((expr.clone(), alias.clone()));
                }
            }
            LogicalPlan::Aggregate { input: Box::new(node), group_by, aggregations }
        } else if is_with {
            LogicalPlan::With { input: Box::new(node), items: items.clone() }
        } else {
            LogicalPlan::Project { input: Box::new(node), items: items.clone() }
        };

        // After the projection, only its output aliases remain in scope.
        self.bound = items.iter().map(|(_, alias)| alias.clone()).collect();

        if let Some(where_expr) = where_clause {
            node = LogicalPlan::Filter { input: Box::new(node), predicate: where_expr.clone() };
        }

        if proj.distinct {
            node = LogicalPlan::Distinct { input: Box::new(node) };
        }

        if let Some(order_by) = &proj.order_by {
            let keys = order_by.iter().map(|o| (o.expr.clone(), o.ascending)).collect();
            node = LogicalPlan::Sort { input: Box::new(node), keys };
        }

        if let Some(skip_expr) = &proj.skip {
            let n = self.eval_const_usize(skip_expr)?;
            node = LogicalPlan::Skip { input: Box::new(node), count: n };
        }

        if let Some(limit_expr) = &proj.limit {
            let n = self.eval_const_usize(limit_expr)?;
            node = LogicalPlan::Limit { input: Box::new(node), count: n };
        }

        Ok(node)
    }

    /// SKIP/LIMIT must be a literal or parameter in Cypher — never a
    /// row-dependent expression — so the planner can resolve them now.
    fn eval_const_usize(&self, expr: &Expr) -> Result<usize> {
        use crate::cypher::ast::Literal;
        match expr {
            Expr::Literal(Literal::Int(n)) if *n >= 0 => Ok(*n as usize),
            Expr::Parameter(name) => match self.params.get(name) {
                Some(crate::model::Value::Int(n)) if *n >= 0 => Ok(*n as usize),
                _ => Err(Error::PlanError(format!("parameter ${name} must be a non-negative integer"))),
            },
            _ => Err(Error::PlanError("SKIP/LIMIT must be a literal or parameter".into())),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn expr_as_variable(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Variable(name) => Ok(name.clone()),
        other => Err(Error::PlanError(format!("expected a variable in DELETE, got {other:?}"))),
    }
}

fn set_item_to_op(item: &SetItem) -> SetOp {
    match item {
        SetItem::Property { variable, key, value } => {
            SetOp::Property { variable: variable.clone(), key: key.clone(), value: value.clone() }
        }
        SetItem::AllProperties { variable, value } => {
            SetOp::AllProperties { variable: variable.clone(), value: value.clone() }
        }
        SetItem::MergeProperties { variable, value } => {
            SetOp::MergeProperties { variable: variable.clone(), value: value.clone() }
        }
        SetItem::Label { variable, label } => SetOp::Label { variable: variable.clone(), label: label.clone() },
    }
}

fn pattern_direction(dir: PatternDirection) -> Direction {
    match dir {
        PatternDirection::Right => Direction::Outgoing,
        PatternDirection::Left => Direction::Incoming,
        PatternDirection::Both => Direction::Both,
    }
}

/// A node pattern is an index candidate when it has exactly one label and
/// exactly one property — the common `(n:Label {key: value})` anchor shape.
fn is_index_candidate(np: &NodePattern) -> bool {
    np.labels.len() == 1 && np.properties.len() == 1
}

fn scan_for_node(np: &NodePattern, alias: &str, used_index: bool) -> LogicalPlan {
    if used_index {
        let label = np.labels[0].clone();
        let (property, value) = np.properties.iter().next().expect("index candidate has one property");
        LogicalPlan::IndexLookup { label, property: property.clone(), value: value.clone(), alias: alias.to_string() }
    } else if let Some(label) = np.labels.first() {
        LogicalPlan::NodeScan { label: label.clone(), alias: alias.to_string() }
    } else {
        LogicalPlan::AllNodesScan { alias: alias.to_string() }
    }
}

/// Predicate covering whatever the scan chosen by `scan_for_node` didn't
/// already narrow: labels beyond the first, and properties beyond the one
/// consumed by an index lookup.
fn residual_node_filter(np: &NodePattern, alias: &str, used_index: bool) -> Option<Expr> {
    let mut preds = Vec::new();
    for label in np.labels.iter().skip(1) {
        preds.push(Expr::HasLabel { expr: Box::new(Expr::Variable(alias.to_string())), label: label.clone() });
    }
    let skip_properties = used_index;
    if !skip_properties {
        for (key, value_expr) in &np.properties {
            preds.push(Expr::BinaryOp {
                left: Box::new(Expr::Property { expr: Box::new(Expr::Variable(alias.to_string())), key: key.clone() }),
                op: BinaryOp::Eq,
                right: Box::new(value_expr.clone()),
            });
        }
    }
    preds.into_iter().reduce(|a, b| Expr::BinaryOp { left: Box::new(a), op: BinaryOp::And, right: Box::new(b) })
}

fn expr_display_name(expr: &Expr) -> String {
    match expr {
        Expr::Variable(name) => name.clone(),
        Expr::Property { expr, key } => format!("{}.{key}", expr_display_name(expr)),
        Expr::FunctionCall { name, .. } => name.clone(),
        _ => "expr".to_string(),
    }
}

const AGGREGATE_FUNCTIONS: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "COLLECT", "STDEV", "STDEVP"];

fn expr_contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::FunctionCall { name, args, .. } => {
            AGGREGATE_FUNCTIONS.contains(&name.to_uppercase().as_str()) || args.iter().any(expr_contains_aggregate)
        }
        Expr::BinaryOp { left, right, .. } => expr_contains_aggregate(left) || expr_contains_aggregate(right),
        Expr::UnaryOp { expr, .. } => expr_contains_aggregate(expr),
        Expr::Property { expr, .. } => expr_contains_aggregate(expr),
        Expr::Case { operand, whens, else_expr } => {
            operand.as_deref().is_some_and(expr_contains_aggregate)
                || whens.iter().any(|(w, t)| expr_contains_aggregate(w) || expr_contains_aggregate(t))
                || else_expr.as_deref().is_some_and(expr_contains_aggregate)
        }
        _ => false,
    }
}

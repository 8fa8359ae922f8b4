//! Cypher recursive descent parser.
//!
//! Parses token streams into AST nodes. A query is a flat sequence of
//! clauses (see `ast::Clause`); this parser walks the token stream once,
//! dispatching on the keyword that starts each clause, the same way the
//! lexer dispatches on the first character of each token.

use crate::{Error, Result};
use super::ast::*;
use super::lexer::{Token, TokenKind};
use std::collections::HashMap;

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Look `n` tokens ahead without consuming.
    fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        let tok = self.peek();
        if tok.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("Expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text)))
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: String) -> Error {
        Error::SyntaxError {
            position: self.peek().span.start,
            message: msg,
        }
    }
}

/// Parse a complete Cypher statement from tokens.
pub fn parse_statement(tokens: &[Token]) -> Result<Statement> {
    let mut p = Parser::new(tokens);

    let stmt = if p.at(TokenKind::Create) {
        let saved = p.pos;
        p.advance();
        if p.at(TokenKind::Index) || p.at(TokenKind::Constraint) {
            p.pos = saved;
            parse_schema_stmt(&mut p)?
        } else {
            p.pos = saved;
            Statement::Query(parse_query(&mut p)?)
        }
    } else if p.at(TokenKind::Drop) {
        parse_schema_stmt(&mut p)?
    } else {
        Statement::Query(parse_query(&mut p)?)
    };

    p.eat(TokenKind::Semicolon);
    if !p.at(TokenKind::Eof) {
        return Err(p.error(format!("Unexpected token after statement: {:?}", p.peek_kind())));
    }

    Ok(stmt)
}

// ============================================================================
// Clause sequence
// ============================================================================

fn parse_query(p: &mut Parser) -> Result<Query> {
    let mut clauses = Vec::new();
    loop {
        match p.peek_kind() {
            TokenKind::Match | TokenKind::OptionalMatch => {
                clauses.push(Clause::Match(parse_match_clause(p)?));
            }
            TokenKind::Unwind => {
                clauses.push(Clause::Unwind(parse_unwind_clause(p)?));
            }
            TokenKind::With => {
                p.advance();
                clauses.push(Clause::With(parse_with_clause(p)?));
            }
            TokenKind::Create => {
                p.advance();
                clauses.push(Clause::Create(CreateClause { patterns: parse_pattern_list(p)? }));
            }
            TokenKind::Merge => {
                clauses.push(Clause::Merge(parse_merge_clause(p)?));
            }
            TokenKind::Set => {
                p.advance();
                clauses.push(Clause::Set(SetClause { items: parse_set_items(p)? }));
            }
            TokenKind::Remove => {
                p.advance();
                clauses.push(Clause::Remove(RemoveClause { items: parse_remove_items(p)? }));
            }
            TokenKind::Delete | TokenKind::DetachDelete => {
                clauses.push(Clause::Delete(parse_delete_clause(p)?));
            }
            TokenKind::Foreach => {
                clauses.push(Clause::Foreach(parse_foreach_clause(p)?));
            }
            TokenKind::Call => {
                clauses.push(Clause::Call(parse_call_clause(p)?));
            }
            TokenKind::Return => {
                p.advance();
                clauses.push(Clause::Return(ReturnClause { projection: parse_projection_clause(p)? }));
                break;
            }
            TokenKind::Eof | TokenKind::Semicolon => break,
            other => return Err(p.error(format!("Unexpected token at start of clause: {other:?}"))),
        }
    }
    if clauses.is_empty() {
        return Err(p.error("Empty query".into()));
    }
    Ok(Query { clauses })
}

fn parse_match_clause(p: &mut Parser) -> Result<MatchClause> {
    let optional = if p.at(TokenKind::OptionalMatch) {
        p.advance();
        if p.at(TokenKind::Match) {
            p.advance();
        }
        true
    } else {
        p.expect(TokenKind::Match)?;
        false
    };
    let patterns = parse_pattern_list(p)?;
    let where_clause = if p.eat(TokenKind::Where) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    Ok(MatchClause { optional, patterns, where_clause })
}

fn parse_unwind_clause(p: &mut Parser) -> Result<UnwindClause> {
    p.expect(TokenKind::Unwind)?;
    let expr = parse_expr(p)?;
    p.expect(TokenKind::As)?;
    let variable = p.expect(TokenKind::Identifier)?.text.clone();
    Ok(UnwindClause { expr, variable })
}

fn parse_merge_clause(p: &mut Parser) -> Result<MergeClause> {
    p.expect(TokenKind::Merge)?;
    let pattern = parse_pattern(p)?;

    let mut on_create = Vec::new();
    let mut on_match = Vec::new();
    while p.at(TokenKind::On) {
        p.advance();
        if p.at(TokenKind::Create) {
            p.advance();
            p.expect(TokenKind::Set)?;
            on_create.extend(parse_set_items(p)?);
        } else if p.at(TokenKind::Match) {
            p.advance();
            p.expect(TokenKind::Set)?;
            on_match.extend(parse_set_items(p)?);
        } else {
            return Err(p.error(format!("Expected CREATE or MATCH after ON, got '{}'", p.peek().text)));
        }
    }

    Ok(MergeClause { pattern, on_create, on_match })
}

fn parse_delete_clause(p: &mut Parser) -> Result<DeleteClause> {
    let detach = p.at(TokenKind::DetachDelete);
    p.advance();
    if detach && p.at(TokenKind::Delete) {
        p.advance();
    }
    let mut variables = vec![parse_expr(p)?];
    while p.eat(TokenKind::Comma) {
        variables.push(parse_expr(p)?);
    }
    Ok(DeleteClause { variables, detach })
}

fn parse_foreach_clause(p: &mut Parser) -> Result<ForeachClause> {
    p.expect(TokenKind::Foreach)?;
    p.expect(TokenKind::LParen)?;
    let variable = p.expect(TokenKind::Identifier)?.text.clone();
    p.expect(TokenKind::In)?;
    let list = parse_expr(p)?;
    p.expect(TokenKind::Pipe)?;

    let mut updates = Vec::new();
    loop {
        match p.peek_kind() {
            TokenKind::Create => {
                p.advance();
                updates.push(Clause::Create(CreateClause { patterns: parse_pattern_list(p)? }));
            }
            TokenKind::Merge => updates.push(Clause::Merge(parse_merge_clause(p)?)),
            TokenKind::Set => {
                p.advance();
                updates.push(Clause::Set(SetClause { items: parse_set_items(p)? }));
            }
            TokenKind::Remove => {
                p.advance();
                updates.push(Clause::Remove(RemoveClause { items: parse_remove_items(p)? }));
            }
            TokenKind::Delete | TokenKind::DetachDelete => {
                updates.push(Clause::Delete(parse_delete_clause(p)?));
            }
            TokenKind::Foreach => updates.push(Clause::Foreach(parse_foreach_clause(p)?)),
            _ => break,
        }
        if !p.eat(TokenKind::Semicolon) {
            break;
        }
    }
    p.expect(TokenKind::RParen)?;
    Ok(ForeachClause { variable, list, updates })
}

fn parse_call_clause(p: &mut Parser) -> Result<CallClause> {
    p.expect(TokenKind::Call)?;
    let mut name = p.expect(TokenKind::Identifier)?.text.clone();
    while p.eat(TokenKind::Dot) {
        let part = p.expect(TokenKind::Identifier)?.text.clone();
        name = format!("{name}.{part}");
    }

    p.expect(TokenKind::LParen)?;
    let mut args = Vec::new();
    if !p.at(TokenKind::RParen) {
        args.push(parse_expr(p)?);
        while p.eat(TokenKind::Comma) {
            args.push(parse_expr(p)?);
        }
    }
    p.expect(TokenKind::RParen)?;

    let mut yields = Vec::new();
    if p.eat(TokenKind::Yield) {
        loop {
            let field = p.expect(TokenKind::Identifier)?.text.clone();
            let alias = if p.eat(TokenKind::As) {
                Some(p.expect(TokenKind::Identifier)?.text.clone())
            } else {
                None
            };
            yields.push((field, alias));
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }

    Ok(CallClause { name, args, yields })
}

// ============================================================================
// Schema commands
// ============================================================================

fn parse_schema_stmt(p: &mut Parser) -> Result<Statement> {
    if p.at(TokenKind::Create) {
        p.advance();
        if p.at(TokenKind::Index) {
            p.advance();
            parse_create_index(p)
        } else if p.at(TokenKind::Constraint) {
            p.advance();
            parse_create_constraint(p)
        } else {
            Err(p.error("Expected INDEX or CONSTRAINT after CREATE".into()))
        }
    } else if p.at(TokenKind::Drop) {
        p.advance();
        if p.at(TokenKind::Index) {
            p.advance();
            parse_drop_index(p)
        } else if p.at(TokenKind::Constraint) {
            p.advance();
            parse_drop_constraint(p)
        } else {
            Err(p.error("Expected INDEX or CONSTRAINT after DROP".into()))
        }
    } else {
        Err(p.error("Expected CREATE or DROP for schema command".into()))
    }
}

fn parse_create_index(p: &mut Parser) -> Result<Statement> {
    let _name = if p.at(TokenKind::Identifier) && !p.at(TokenKind::On) && !p.at(TokenKind::For) {
        Some(p.advance().text.clone())
    } else {
        None
    };
    let index_type = None;

    if p.at(TokenKind::On) {
        p.advance();
        p.expect(TokenKind::Colon)?;
        let label = p.advance().text.clone();
        p.expect(TokenKind::LParen)?;
        let property = p.advance().text.clone();
        p.expect(TokenKind::RParen)?;
        return Ok(Statement::Schema(SchemaCommand::CreateIndex { label, property, index_type }));
    }

    if p.at(TokenKind::For) {
        p.advance();
        p.expect(TokenKind::LParen)?;
        let _alias = p.advance();
        p.expect(TokenKind::Colon)?;
        let label = p.advance().text.clone();
        p.expect(TokenKind::RParen)?;

        p.expect(TokenKind::On)?;
        p.expect(TokenKind::LParen)?;
        let _alias2 = p.advance();
        p.expect(TokenKind::Dot)?;
        let property = p.advance().text.clone();
        p.expect(TokenKind::RParen)?;

        if p.at(TokenKind::Identifier) && p.peek().text.eq_ignore_ascii_case("OPTIONS") {
            p.advance();
            if p.at(TokenKind::LBrace) {
                skip_braced(p)?;
            }
        }

        return Ok(Statement::Schema(SchemaCommand::CreateIndex { label, property, index_type }));
    }

    Err(p.error("Expected ON or FOR after CREATE INDEX".into()))
}

fn parse_create_constraint(p: &mut Parser) -> Result<Statement> {
    let _name = if p.at(TokenKind::Identifier) && !p.at(TokenKind::On) && !p.at(TokenKind::For) {
        Some(p.advance().text.clone())
    } else {
        None
    };

    if p.at(TokenKind::For) || p.at(TokenKind::On) {
        p.advance();
    } else {
        return Err(p.error("Expected FOR or ON after CONSTRAINT [name]".into()));
    }

    p.expect(TokenKind::LParen)?;
    let _alias = p.advance();
    p.expect(TokenKind::Colon)?;
    let label = p.advance().text.clone();
    p.expect(TokenKind::RParen)?;

    let _req_tok = p.advance();
    let _alias2 = p.advance();
    p.expect(TokenKind::Dot)?;
    let property = p.advance().text.clone();

    let constraint_type = if p.at(TokenKind::Is) {
        p.advance();
        p.eat(TokenKind::Not);
        let type_tok = p.advance();
        type_tok.text.to_uppercase()
    } else {
        "UNIQUE".to_string()
    };

    Ok(Statement::Schema(SchemaCommand::CreateConstraint { label, property, constraint_type }))
}

fn parse_drop_index(p: &mut Parser) -> Result<Statement> {
    if p.at(TokenKind::On) {
        p.advance();
        p.expect(TokenKind::Colon)?;
        let label = p.advance().text.clone();
        p.expect(TokenKind::LParen)?;
        let property = p.advance().text.clone();
        p.expect(TokenKind::RParen)?;
        Ok(Statement::Schema(SchemaCommand::DropIndex { label, property }))
    } else {
        let name = p.advance().text.clone();
        Ok(Statement::Schema(SchemaCommand::DropIndex { label: name, property: String::new() }))
    }
}

fn parse_drop_constraint(p: &mut Parser) -> Result<Statement> {
    if p.at(TokenKind::On) {
        p.advance();
        p.expect(TokenKind::LParen)?;
        let _alias = p.advance();
        p.expect(TokenKind::Colon)?;
        let label = p.advance().text.clone();
        p.expect(TokenKind::RParen)?;
        while !p.at(TokenKind::Eof) && !p.at(TokenKind::Semicolon) {
            p.advance();
        }
        Ok(Statement::Schema(SchemaCommand::DropConstraint { label, property: String::new() }))
    } else {
        let name = p.advance().text.clone();
        Ok(Statement::Schema(SchemaCommand::DropConstraint { label: name, property: String::new() }))
    }
}

fn skip_braced(p: &mut Parser) -> Result<()> {
    p.expect(TokenKind::LBrace)?;
    let mut depth = 1u32;
    while depth > 0 && !p.at(TokenKind::Eof) {
        if p.at(TokenKind::LBrace) { depth += 1; }
        if p.at(TokenKind::RBrace) { depth -= 1; }
        if depth > 0 { p.advance(); }
    }
    p.expect(TokenKind::RBrace)?;
    Ok(())
}

// ============================================================================
// Pattern parsing
// ============================================================================

fn parse_pattern_list(p: &mut Parser) -> Result<Vec<Pattern>> {
    let mut patterns = vec![parse_pattern(p)?];
    while p.eat(TokenKind::Comma) {
        patterns.push(parse_pattern(p)?);
    }
    Ok(patterns)
}

fn parse_pattern(p: &mut Parser) -> Result<Pattern> {
    let path_variable = if p.at(TokenKind::Identifier) && p.peek_at(1).kind == TokenKind::Eq {
        let name = p.advance().text.clone();
        p.advance(); // =
        Some(name)
    } else {
        None
    };

    let mut elements = vec![PatternElement::Node(parse_node_pattern(p)?)];
    while p.at(TokenKind::Dash) || p.at(TokenKind::LeftArrow) {
        let rel = parse_rel_pattern(p)?;
        elements.push(PatternElement::Relationship(rel));
        elements.push(PatternElement::Node(parse_node_pattern(p)?));
    }

    Ok(Pattern { path_variable, elements })
}

fn parse_node_pattern(p: &mut Parser) -> Result<NodePattern> {
    p.expect(TokenKind::LParen)?;

    let mut alias = None;
    let mut labels = Vec::new();
    let mut properties = HashMap::new();

    if p.at(TokenKind::Identifier) {
        alias = Some(p.advance().text.clone());
    }

    while p.at(TokenKind::Colon) {
        p.advance();
        labels.push(p.expect(TokenKind::Identifier)?.text.clone());
    }

    if p.at(TokenKind::LBrace) {
        properties = parse_map_literal_inner(p)?;
    }

    p.expect(TokenKind::RParen)?;

    Ok(NodePattern { alias, labels, properties })
}

fn parse_rel_pattern(p: &mut Parser) -> Result<RelPattern> {
    let left_arrow = p.eat(TokenKind::LeftArrow);
    if !left_arrow {
        p.expect(TokenKind::Dash)?;
    }

    let mut alias = None;
    let mut rel_types = Vec::new();
    let mut properties = HashMap::new();
    let mut var_length = None;

    if p.at(TokenKind::LBracket) {
        p.advance();

        if p.at(TokenKind::Identifier) {
            alias = Some(p.advance().text.clone());
        }

        if p.at(TokenKind::Colon) {
            p.advance();
            rel_types.push(p.expect(TokenKind::Identifier)?.text.clone());
            while p.eat(TokenKind::Pipe) {
                p.eat(TokenKind::Colon);
                rel_types.push(p.expect(TokenKind::Identifier)?.text.clone());
            }
        }

        if p.eat(TokenKind::Star) {
            let min = if p.at(TokenKind::Integer) {
                Some(p.advance().text.parse::<usize>().unwrap_or(1))
            } else {
                None
            };
            if p.eat(TokenKind::DotDot) {
                let max = if p.at(TokenKind::Integer) {
                    Some(p.advance().text.parse::<usize>().unwrap_or(usize::MAX))
                } else {
                    None
                };
                var_length = Some(VarLength { min, max });
            } else if let Some(n) = min {
                var_length = Some(VarLength { min: Some(n), max: Some(n) });
            } else {
                var_length = Some(VarLength { min: None, max: None });
            }
        }

        if p.at(TokenKind::LBrace) {
            properties = parse_map_literal_inner(p)?;
        }

        p.expect(TokenKind::RBracket)?;
    }

    let direction = if left_arrow {
        p.eat(TokenKind::Dash);
        PatternDirection::Left
    } else if p.eat(TokenKind::Arrow) {
        PatternDirection::Right
    } else if p.eat(TokenKind::Dash) {
        PatternDirection::Both
    } else {
        PatternDirection::Right
    };

    Ok(RelPattern { alias, rel_types, direction, properties, var_length })
}

// ============================================================================
// RETURN / WITH / SET / REMOVE helpers
// ============================================================================

fn parse_projection_clause(p: &mut Parser) -> Result<ProjectionClause> {
    let distinct = p.eat(TokenKind::Distinct);
    let mut items = Vec::new();

    if p.at(TokenKind::Star) {
        p.advance();
        items.push(ReturnItem { expr: Expr::Star, alias: None });
    } else {
        items.push(parse_return_item(p)?);
        while p.eat(TokenKind::Comma) {
            items.push(parse_return_item(p)?);
        }
    }

    let order_by = if p.at(TokenKind::Order) {
        p.advance();
        p.expect(TokenKind::By)?;
        Some(parse_order_by(p)?)
    } else {
        None
    };

    let skip = if p.eat(TokenKind::Skip) { Some(parse_expr(p)?) } else { None };
    let limit = if p.eat(TokenKind::Limit) { Some(parse_expr(p)?) } else { None };

    Ok(ProjectionClause { distinct, items, order_by, skip, limit })
}

fn parse_with_clause(p: &mut Parser) -> Result<WithClause> {
    let projection = parse_projection_clause(p)?;
    let where_clause = if p.eat(TokenKind::Where) { Some(parse_expr(p)?) } else { None };
    Ok(WithClause { projection, where_clause })
}

fn parse_return_item(p: &mut Parser) -> Result<ReturnItem> {
    let expr = parse_expr(p)?;
    let alias = if p.eat(TokenKind::As) {
        Some(p.expect(TokenKind::Identifier)?.text.clone())
    } else {
        None
    };
    Ok(ReturnItem { expr, alias })
}

fn parse_order_by(p: &mut Parser) -> Result<Vec<OrderExpr>> {
    let mut exprs = vec![parse_order_expr(p)?];
    while p.eat(TokenKind::Comma) {
        exprs.push(parse_order_expr(p)?);
    }
    Ok(exprs)
}

fn parse_order_expr(p: &mut Parser) -> Result<OrderExpr> {
    let expr = parse_expr(p)?;
    let ascending = if p.eat(TokenKind::Desc) {
        false
    } else {
        p.eat(TokenKind::Asc);
        true
    };
    Ok(OrderExpr { expr, ascending })
}

fn parse_set_items(p: &mut Parser) -> Result<Vec<SetItem>> {
    let mut items = vec![parse_set_item(p)?];
    while p.eat(TokenKind::Comma) {
        items.push(parse_set_item(p)?);
    }
    Ok(items)
}

fn parse_set_item(p: &mut Parser) -> Result<SetItem> {
    let name = p.expect(TokenKind::Identifier)?.text.clone();

    if p.eat(TokenKind::Dot) {
        let key = p.expect(TokenKind::Identifier)?.text.clone();
        p.expect(TokenKind::Eq)?;
        let value = parse_expr(p)?;
        Ok(SetItem::Property { variable: name, key, value })
    } else if p.eat(TokenKind::PlusEq) {
        let value = parse_expr(p)?;
        Ok(SetItem::MergeProperties { variable: name, value })
    } else if p.eat(TokenKind::Eq) {
        let value = parse_expr(p)?;
        Ok(SetItem::AllProperties { variable: name, value })
    } else if p.at(TokenKind::Colon) {
        p.advance();
        let label = p.expect(TokenKind::Identifier)?.text.clone();
        Ok(SetItem::Label { variable: name, label })
    } else {
        Err(p.error("Expected '.', '=', '+=', or ':' after SET variable".into()))
    }
}

fn parse_remove_items(p: &mut Parser) -> Result<Vec<RemoveItem>> {
    let mut items = vec![parse_remove_item(p)?];
    while p.eat(TokenKind::Comma) {
        items.push(parse_remove_item(p)?);
    }
    Ok(items)
}

fn parse_remove_item(p: &mut Parser) -> Result<RemoveItem> {
    let name = p.expect(TokenKind::Identifier)?.text.clone();
    if p.eat(TokenKind::Dot) {
        let key = p.expect(TokenKind::Identifier)?.text.clone();
        Ok(RemoveItem::Property { variable: name, key })
    } else if p.at(TokenKind::Colon) {
        p.advance();
        let label = p.expect(TokenKind::Identifier)?.text.clone();
        Ok(RemoveItem::Label { variable: name, label })
    } else {
        Err(p.error("Expected '.' or ':' after REMOVE variable".into()))
    }
}

// ============================================================================
// Expression parsing (precedence climbing)
// ============================================================================

fn parse_expr(p: &mut Parser) -> Result<Expr> {
    parse_or_expr(p)
}

fn parse_or_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_xor_expr(p)?;
    while p.eat(TokenKind::Or) {
        let right = parse_xor_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_xor_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and_expr(p)?;
    while p.eat(TokenKind::Xor) {
        let right = parse_and_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Xor, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_and_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not_expr(p)?;
    while p.eat(TokenKind::And) {
        let right = parse_not_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_not_expr(p: &mut Parser) -> Result<Expr> {
    if p.eat(TokenKind::Not) {
        let expr = parse_not_expr(p)?;
        Ok(Expr::UnaryOp { op: UnaryOp::Not, expr: Box::new(expr) })
    } else {
        parse_comparison(p)
    }
}

/// `a <= b <= c` desugars to `a <= b AND b <= c`.
fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_string_op(p)?;

    if p.at(TokenKind::Is) {
        p.advance();
        let negated = p.eat(TokenKind::Not);
        p.expect(TokenKind::Null)?;
        return Ok(Expr::IsNull { expr: Box::new(left), negated });
    }

    if p.at(TokenKind::In) {
        p.advance();
        let list = parse_addition(p)?;
        return Ok(Expr::In { expr: Box::new(left), list: Box::new(list) });
    }

    let mut chain: Option<Expr> = None;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::Neq => Some(BinaryOp::Neq),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Lte => Some(BinaryOp::Lte),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Gte => Some(BinaryOp::Gte),
            TokenKind::RegexMatch => Some(BinaryOp::RegexMatch),
            _ => None,
        };
        let Some(op) = op else { break };
        p.advance();
        let right = parse_string_op(p)?;
        let step = Expr::BinaryOp { left: Box::new(left.clone()), op, right: Box::new(right.clone()) };
        chain = Some(match chain {
            None => step,
            Some(prev) => Expr::BinaryOp { left: Box::new(prev), op: BinaryOp::And, right: Box::new(step) },
        });
        left = right;
    }

    Ok(chain.unwrap_or(left))
}

fn parse_string_op(p: &mut Parser) -> Result<Expr> {
    let left = parse_addition(p)?;

    if p.eat(TokenKind::StartsWith) {
        p.expect(TokenKind::With)?;
        let right = parse_addition(p)?;
        return Ok(Expr::StringOp { left: Box::new(left), op: StringOp::StartsWith, right: Box::new(right) });
    }
    if p.eat(TokenKind::EndsWith) {
        p.expect(TokenKind::With)?;
        let right = parse_addition(p)?;
        return Ok(Expr::StringOp { left: Box::new(left), op: StringOp::EndsWith, right: Box::new(right) });
    }
    if p.eat(TokenKind::Contains) {
        let right = parse_addition(p)?;
        return Ok(Expr::StringOp { left: Box::new(left), op: StringOp::Contains, right: Box::new(right) });
    }

    Ok(left)
}

fn parse_addition(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplication(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => break,
        };
        p.advance();
        let right = parse_multiplication(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_multiplication(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_power(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => break,
        };
        p.advance();
        let right = parse_power(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_power(p: &mut Parser) -> Result<Expr> {
    let left = parse_unary(p)?;
    if p.eat(TokenKind::Caret) {
        let right = parse_power(p)?;
        Ok(Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Pow, right: Box::new(right) })
    } else {
        Ok(left)
    }
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.eat(TokenKind::Minus) {
        let expr = parse_postfix(p)?;
        Ok(Expr::UnaryOp { op: UnaryOp::Negate, expr: Box::new(expr) })
    } else {
        parse_postfix(p)
    }
}

/// Property access, dynamic index/slice, and label-check postfixes, left to right.
fn parse_postfix(p: &mut Parser) -> Result<Expr> {
    let mut expr = parse_primary(p)?;

    loop {
        if p.eat(TokenKind::Dot) {
            let key = p.expect(TokenKind::Identifier)?.text.clone();
            expr = Expr::Property { expr: Box::new(expr), key };
        } else if p.at(TokenKind::LBracket) {
            p.advance();
            if p.eat(TokenKind::DotDot) {
                let to = if p.at(TokenKind::RBracket) { None } else { Some(Box::new(parse_expr(p)?)) };
                p.expect(TokenKind::RBracket)?;
                expr = Expr::Slice { expr: Box::new(expr), from: None, to };
            } else {
                let first = parse_expr(p)?;
                if p.eat(TokenKind::DotDot) {
                    let to = if p.at(TokenKind::RBracket) { None } else { Some(Box::new(parse_expr(p)?)) };
                    p.expect(TokenKind::RBracket)?;
                    expr = Expr::Slice { expr: Box::new(expr), from: Some(Box::new(first)), to };
                } else {
                    p.expect(TokenKind::RBracket)?;
                    expr = Expr::Index { expr: Box::new(expr), index: Box::new(first) };
                }
            }
        } else if p.at(TokenKind::Colon) && matches!(expr, Expr::Variable(_)) {
            p.advance();
            let label = p.expect(TokenKind::Identifier)?.text.clone();
            expr = Expr::HasLabel { expr: Box::new(expr), label };
        } else {
            break;
        }
    }

    Ok(expr)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    match p.peek_kind() {
        TokenKind::Integer => {
            let tok = p.advance();
            let val = tok.text.parse::<i64>().map_err(|_| {
                Error::SyntaxError { position: tok.span.start, message: "Invalid integer".into() }
            })?;
            Ok(Expr::Literal(Literal::Int(val)))
        }
        TokenKind::Float => {
            let tok = p.advance();
            let val = tok.text.parse::<f64>().map_err(|_| {
                Error::SyntaxError { position: tok.span.start, message: "Invalid float".into() }
            })?;
            Ok(Expr::Literal(Literal::Float(val)))
        }
        TokenKind::StringLiteral => Ok(Expr::Literal(Literal::String(p.advance().text.clone()))),
        TokenKind::True => { p.advance(); Ok(Expr::Literal(Literal::Bool(true))) }
        TokenKind::False => { p.advance(); Ok(Expr::Literal(Literal::Bool(false))) }
        TokenKind::Null => { p.advance(); Ok(Expr::Literal(Literal::Null)) }
        TokenKind::Parameter => Ok(Expr::Parameter(p.advance().text.clone())),
        TokenKind::Star => { p.advance(); Ok(Expr::Star) }

        TokenKind::LParen => {
            p.advance();
            let expr = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }

        TokenKind::LBracket => parse_bracket_expr(p),

        TokenKind::LBrace => Ok(Expr::MapLiteral(parse_map_literal_inner(p)?)),

        TokenKind::Case => {
            p.advance();
            let operand = if !p.at(TokenKind::When) { Some(Box::new(parse_expr(p)?)) } else { None };
            let mut whens = Vec::new();
            while p.eat(TokenKind::When) {
                let when_expr = parse_expr(p)?;
                p.expect(TokenKind::Then)?;
                let then_expr = parse_expr(p)?;
                whens.push((when_expr, then_expr));
            }
            let else_expr = if p.eat(TokenKind::Else) { Some(Box::new(parse_expr(p)?)) } else { None };
            p.expect(TokenKind::End)?;
            Ok(Expr::Case { operand, whens, else_expr })
        }

        TokenKind::Exists => {
            p.advance();
            if p.eat(TokenKind::LBrace) {
                let patterns = parse_pattern_list(p)?;
                let where_clause = if p.eat(TokenKind::Where) { Some(parse_expr(p)?) } else { None };
                p.expect(TokenKind::RBrace)?;
                return Ok(Expr::Exists(Box::new(MatchClause { optional: false, patterns, where_clause })));
            }
            p.expect(TokenKind::LParen)?;
            let patterns = parse_pattern_list(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(Expr::Exists(Box::new(MatchClause { optional: false, patterns, where_clause: None })))
        }

        TokenKind::All | TokenKind::Any | TokenKind::None | TokenKind::Single => {
            let kind = match p.advance().kind {
                TokenKind::All => QuantifierKind::All,
                TokenKind::Any => QuantifierKind::Any,
                TokenKind::None => QuantifierKind::None,
                _ => QuantifierKind::Single,
            };
            p.expect(TokenKind::LParen)?;
            let variable = p.expect(TokenKind::Identifier)?.text.clone();
            p.expect(TokenKind::In)?;
            let list = parse_expr(p)?;
            p.expect(TokenKind::Where)?;
            let predicate = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(Expr::Quantifier { kind, variable, list: Box::new(list), predicate: Box::new(predicate) })
        }

        TokenKind::Reduce => {
            p.advance();
            p.expect(TokenKind::LParen)?;
            let accumulator = p.expect(TokenKind::Identifier)?.text.clone();
            p.expect(TokenKind::Eq)?;
            let init = parse_expr(p)?;
            p.expect(TokenKind::Comma)?;
            let variable = p.expect(TokenKind::Identifier)?.text.clone();
            p.expect(TokenKind::In)?;
            let list = parse_expr(p)?;
            p.expect(TokenKind::Pipe)?;
            let expr = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(Expr::Reduce { accumulator, init: Box::new(init), variable, list: Box::new(list), expr: Box::new(expr) })
        }

        TokenKind::Identifier => {
            let tok = p.advance().clone();
            if p.at(TokenKind::LParen) {
                p.advance();
                let mut args = Vec::new();
                let distinct = p.eat(TokenKind::Distinct);

                if p.at(TokenKind::Star) {
                    p.advance();
                } else if !p.at(TokenKind::RParen) {
                    args.push(parse_expr(p)?);
                    while p.eat(TokenKind::Comma) {
                        args.push(parse_expr(p)?);
                    }
                }
                p.expect(TokenKind::RParen)?;
                Ok(Expr::FunctionCall { name: tok.text, args, distinct })
            } else {
                Ok(Expr::Variable(tok.text))
            }
        }

        _ => Err(p.error(format!("Unexpected token in expression: {:?} '{}'", p.peek_kind(), p.peek().text))),
    }
}

/// `[`-prefixed expressions: plain list, list comprehension, or pattern
/// comprehension. Disambiguated by lookahead since all three share a prefix.
fn parse_bracket_expr(p: &mut Parser) -> Result<Expr> {
    p.expect(TokenKind::LBracket)?;

    if p.at(TokenKind::RBracket) {
        p.advance();
        return Ok(Expr::List(Vec::new()));
    }

    // `[x IN list ...]` — list comprehension.
    if p.at(TokenKind::Identifier) && p.peek_at(1).kind == TokenKind::In {
        let variable = p.advance().text.clone();
        p.advance(); // IN
        let list = parse_expr(p)?;
        let predicate = if p.eat(TokenKind::Where) { Some(Box::new(parse_expr(p)?)) } else { None };
        let projection = if p.eat(TokenKind::Pipe) { Some(Box::new(parse_expr(p)?)) } else { None };
        p.expect(TokenKind::RBracket)?;
        return Ok(Expr::ListComprehension { variable, list: Box::new(list), predicate, projection });
    }

    // `[(a)-[:T]->(b) ...]` — pattern comprehension. Try it; fall back to a
    // plain list whose first element happens to be parenthesized otherwise.
    if p.at(TokenKind::LParen) {
        let saved = p.pos;
        if let Ok(pattern) = parse_pattern(p) {
            if p.at(TokenKind::Where) || p.at(TokenKind::Pipe) {
                let where_clause = if p.eat(TokenKind::Where) { Some(Box::new(parse_expr(p)?)) } else { None };
                p.expect(TokenKind::Pipe)?;
                let projection = parse_expr(p)?;
                p.expect(TokenKind::RBracket)?;
                return Ok(Expr::PatternComprehension {
                    pattern: Box::new(pattern),
                    where_clause,
                    projection: Box::new(projection),
                });
            }
        }
        p.pos = saved;
    }

    let mut items = vec![parse_expr(p)?];
    while p.eat(TokenKind::Comma) {
        items.push(parse_expr(p)?);
    }
    p.expect(TokenKind::RBracket)?;
    Ok(Expr::List(items))
}

fn parse_map_literal_inner(p: &mut Parser) -> Result<HashMap<String, Expr>> {
    p.expect(TokenKind::LBrace)?;
    let mut map = HashMap::new();
    if !p.at(TokenKind::RBrace) {
        let key = p.expect(TokenKind::Identifier)?.text.clone();
        p.expect(TokenKind::Colon)?;
        map.insert(key, parse_expr(p)?);
        while p.eat(TokenKind::Comma) {
            let key = p.expect(TokenKind::Identifier)?.text.clone();
            p.expect(TokenKind::Colon)?;
            map.insert(key, parse_expr(p)?);
        }
    }
    p.expect(TokenKind::RBrace)?;
    Ok(map)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::lexer::tokenize;

    fn parse(query: &str) -> Result<Statement> {
        let tokens = tokenize(query)?;
        parse_statement(&tokens)
    }

    fn only_query(stmt: Statement) -> Query {
        match stmt {
            Statement::Query(q) => q,
            _ => panic!("expected Query"),
        }
    }

    fn match_clause(q: &Query, i: usize) -> &MatchClause {
        match &q.clauses[i] {
            Clause::Match(m) => m,
            other => panic!("expected Match at {i}, got {other:?}"),
        }
    }

    fn return_clause(q: &Query) -> &ReturnClause {
        match q.clauses.last().unwrap() {
            Clause::Return(r) => r,
            other => panic!("expected trailing Return, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_match_return() {
        let q = only_query(parse("MATCH (n:Person) RETURN n").unwrap());
        assert_eq!(q.clauses.len(), 2);
        assert_eq!(match_clause(&q, 0).patterns.len(), 1);
        assert_eq!(return_clause(&q).projection.items.len(), 1);
    }

    #[test]
    fn test_match_with_where() {
        let q = only_query(parse("MATCH (n:Person) WHERE n.age > 30 RETURN n.name").unwrap());
        assert!(match_clause(&q, 0).where_clause.is_some());
    }

    #[test]
    fn test_create_node() {
        let stmt = parse("CREATE (n:Person {name: 'Ada', age: 3})").unwrap();
        let q = only_query(stmt);
        match &q.clauses[0] {
            Clause::Create(c) => {
                if let PatternElement::Node(np) = &c.patterns[0].elements[0] {
                    assert_eq!(np.labels, vec!["Person"]);
                    assert_eq!(np.properties.len(), 2);
                } else {
                    panic!("expected node element");
                }
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn test_create_return() {
        let q = only_query(parse("CREATE (n:Person {name: 'Ada'}) RETURN n").unwrap());
        assert_eq!(q.clauses.len(), 2);
        assert!(matches!(q.clauses[1], Clause::Return(_)));
    }

    #[test]
    fn test_relationship_pattern() {
        let q = only_query(parse("MATCH (a:Person)-[:KNOWS]->(b:Person) RETURN a, b").unwrap());
        assert_eq!(match_clause(&q, 0).patterns[0].elements.len(), 3);
        assert_eq!(return_clause(&q).projection.items.len(), 2);
    }

    #[test]
    fn test_match_set() {
        let q = only_query(parse("MATCH (n:Person) WHERE n.name = 'Ada' SET n.age = 4").unwrap());
        assert!(match_clause(&q, 0).where_clause.is_some());
        match &q.clauses[1] {
            Clause::Set(s) => assert_eq!(s.items.len(), 1),
            other => panic!("expected Set, got {other:?}"),
        }
    }

    #[test]
    fn test_match_delete() {
        let q = only_query(parse("MATCH (n:Person) WHERE n.name = 'Ada' DETACH DELETE n").unwrap());
        match &q.clauses[1] {
            Clause::Delete(d) => assert!(d.detach),
            other => panic!("expected Delete, got {other:?}"),
        }
    }

    #[test]
    fn test_return_with_limit() {
        let q = only_query(parse("MATCH (n:Person) RETURN n LIMIT 10").unwrap());
        assert!(return_clause(&q).projection.limit.is_some());
    }

    #[test]
    fn test_count_aggregate() {
        let q = only_query(parse("MATCH (n:Person) RETURN count(n)").unwrap());
        if let Expr::FunctionCall { name, .. } = &return_clause(&q).projection.items[0].expr {
            assert_eq!(name, "count");
        } else {
            panic!("expected function call");
        }
    }

    #[test]
    fn test_parameter() {
        let q = only_query(parse("MATCH (n:Person) WHERE n.name = $name RETURN n").unwrap());
        if let Some(Expr::BinaryOp { right, .. }) = &match_clause(&q, 0).where_clause {
            assert!(matches!(right.as_ref(), Expr::Parameter(_)));
        } else {
            panic!("expected where clause");
        }
    }

    #[test]
    fn test_multiple_labels() {
        let q = only_query(parse("MATCH (n:Person:Employee) RETURN n").unwrap());
        if let PatternElement::Node(np) = &match_clause(&q, 0).patterns[0].elements[0] {
            assert_eq!(np.labels, vec!["Person", "Employee"]);
        }
    }

    #[test]
    fn test_order_by() {
        let q = only_query(parse("MATCH (n:Person) RETURN n.name ORDER BY n.name DESC").unwrap());
        let order = return_clause(&q).projection.order_by.as_ref().unwrap();
        assert!(!order[0].ascending);
    }

    #[test]
    fn test_return_alias() {
        let q = only_query(parse("MATCH (n:Person) RETURN n.name AS name").unwrap());
        assert_eq!(return_clause(&q).projection.items[0].alias.as_deref(), Some("name"));
    }

    #[test]
    fn test_boolean_expression() {
        let q = only_query(parse("MATCH (n) WHERE n.active = true AND n.age > 18 RETURN n").unwrap());
        assert!(matches!(match_clause(&q, 0).where_clause, Some(Expr::BinaryOp { op: BinaryOp::And, .. })));
    }

    #[test]
    fn test_list_literal() {
        let q = only_query(parse("MATCH (n) WHERE n.id IN [1, 2, 3] RETURN n").unwrap());
        assert!(matches!(match_clause(&q, 0).where_clause, Some(Expr::In { .. })));
    }

    #[test]
    fn test_is_null() {
        let q = only_query(parse("MATCH (n) WHERE n.email IS NOT NULL RETURN n").unwrap());
        if let Some(Expr::IsNull { negated, .. }) = &match_clause(&q, 0).where_clause {
            assert!(*negated);
        } else {
            panic!("expected IsNull expression");
        }
    }

    #[test]
    fn test_return_star() {
        let q = only_query(parse("MATCH (n:Person) RETURN *").unwrap());
        assert!(matches!(&return_clause(&q).projection.items[0].expr, Expr::Star));
    }

    #[test]
    fn test_with_clause() {
        let q = only_query(parse("MATCH (n:Person) WITH n.name AS name RETURN name").unwrap());
        assert_eq!(q.clauses.len(), 3);
        match &q.clauses[1] {
            Clause::With(w) => assert_eq!(w.projection.items[0].alias.as_deref(), Some("name")),
            other => panic!("expected With, got {other:?}"),
        }
    }

    #[test]
    fn test_with_clause_where() {
        let q = only_query(parse("MATCH (n:Person) WITH n.name AS name WHERE name = 'Alice' RETURN name").unwrap());
        match &q.clauses[1] {
            Clause::With(w) => assert!(w.where_clause.is_some()),
            other => panic!("expected With, got {other:?}"),
        }
    }

    #[test]
    fn test_with_clause_multiple() {
        let q = only_query(parse("MATCH (n:Person) WITH n.name AS name WITH name RETURN name").unwrap());
        let withs = q.clauses.iter().filter(|c| matches!(c, Clause::With(_))).count();
        assert_eq!(withs, 2);
    }

    #[test]
    fn test_remove_property() {
        let q = only_query(parse("MATCH (n:Person) WHERE n.name = 'Alice' REMOVE n.age").unwrap());
        match &q.clauses[1] {
            Clause::Remove(r) => {
                assert_eq!(r.items.len(), 1);
                match &r.items[0] {
                    RemoveItem::Property { variable, key } => {
                        assert_eq!(variable, "n");
                        assert_eq!(key, "age");
                    }
                    _ => panic!("expected RemoveItem::Property"),
                }
            }
            other => panic!("expected Remove, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_label() {
        let q = only_query(parse("MATCH (n:Person) REMOVE n:Employee").unwrap());
        match &q.clauses[1] {
            Clause::Remove(r) => match &r.items[0] {
                RemoveItem::Label { variable, label } => {
                    assert_eq!(variable, "n");
                    assert_eq!(label, "Employee");
                }
                _ => panic!("expected RemoveItem::Label"),
            },
            other => panic!("expected Remove, got {other:?}"),
        }
    }

    #[test]
    fn test_remove_multiple_items() {
        let q = only_query(parse("MATCH (n:Person) REMOVE n.age, n:Employee").unwrap());
        match &q.clauses[1] {
            Clause::Remove(r) => {
                assert_eq!(r.items.len(), 2);
                assert!(matches!(&r.items[0], RemoveItem::Property { .. }));
                assert!(matches!(&r.items[1], RemoveItem::Label { .. }));
            }
            other => panic!("expected Remove, got {other:?}"),
        }
    }

    #[test]
    fn test_unwind() {
        let q = only_query(parse("UNWIND [1, 2, 3] AS x RETURN x").unwrap());
        match &q.clauses[0] {
            Clause::Unwind(u) => assert_eq!(u.variable, "x"),
            other => panic!("expected Unwind, got {other:?}"),
        }
    }

    #[test]
    fn test_variable_length_path() {
        let q = only_query(parse("MATCH (a)-[:R*2..3]->(b) RETURN b").unwrap());
        if let PatternElement::Relationship(rel) = &match_clause(&q, 0).patterns[0].elements[1] {
            let vl = rel.var_length.as_ref().unwrap();
            assert_eq!(vl.min, Some(2));
            assert_eq!(vl.max, Some(3));
        } else {
            panic!("expected relationship element");
        }
    }

    #[test]
    fn test_named_path() {
        let q = only_query(parse("MATCH p = (a)-[:R]->(b) RETURN p").unwrap());
        assert_eq!(match_clause(&q, 0).patterns[0].path_variable.as_deref(), Some("p"));
    }

    #[test]
    fn test_starts_with() {
        let q = only_query(parse("MATCH (n) WHERE n.name STARTS WITH 'A' RETURN n").unwrap());
        assert!(matches!(match_clause(&q, 0).where_clause, Some(Expr::StringOp { op: StringOp::StartsWith, .. })));
    }

    #[test]
    fn test_list_comprehension() {
        let q = only_query(parse("MATCH (n) RETURN [x IN n.tags WHERE x <> 'a' | x]").unwrap());
        assert!(matches!(&return_clause(&q).projection.items[0].expr, Expr::ListComprehension { .. }));
    }

    #[test]
    fn test_quantifier_all() {
        let q = only_query(parse("MATCH (n) WHERE ALL(x IN n.tags WHERE x <> 'a') RETURN n").unwrap());
        assert!(matches!(match_clause(&q, 0).where_clause, Some(Expr::Quantifier { kind: QuantifierKind::All, .. })));
    }

    #[test]
    fn test_dynamic_index_and_slice() {
        let q = only_query(parse("MATCH (n) RETURN n.tags[0], n.tags[1..3]").unwrap());
        assert!(matches!(&return_clause(&q).projection.items[0].expr, Expr::Index { .. }));
        assert!(matches!(&return_clause(&q).projection.items[1].expr, Expr::Slice { .. }));
    }

    #[test]
    fn test_foreach() {
        let q = only_query(parse("MATCH (n) FOREACH (x IN n.tags | SET n.seen = true)").unwrap());
        match &q.clauses[1] {
            Clause::Foreach(f) => assert_eq!(f.variable, "x"),
            other => panic!("expected Foreach, got {other:?}"),
        }
    }

    #[test]
    fn test_call_yield() {
        let q = only_query(parse("CALL db.labels() YIELD label RETURN label").unwrap());
        match &q.clauses[0] {
            Clause::Call(c) => {
                assert_eq!(c.name, "db.labels");
                assert_eq!(c.yields[0].0, "label");
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn test_chained_comparison_desugars_to_and() {
        let q = only_query(parse("MATCH (n) WHERE 1 <= n.age <= 10 RETURN n").unwrap());
        assert!(matches!(match_clause(&q, 0).where_clause, Some(Expr::BinaryOp { op: BinaryOp::And, .. })));
    }
}

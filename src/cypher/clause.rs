//! Cypher clause tree and statement rendering.
//!
//! A statement is an ordered `Vec<Clause>`; rendering walks the tree with an
//! indent level so `CALL { … }` bodies nest readably. All naming decisions
//! were already made when the tree was built, so rendering is a pure
//! serialization step.

use super::env::Variable;
use super::escape::escape_identifier;
use super::expr::{Expr, Pattern};

/// Sort direction for `ORDER BY` items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortDir {
    fn token(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// One `SET owner.prop = value` assignment.
#[derive(Clone, Debug)]
pub struct SetItem {
    /// Variable owning the property.
    pub owner: Variable,
    /// Database property name.
    pub prop: String,
    /// Assigned expression.
    pub value: Expr,
}

/// `WITH` clause with optional ordering, pagination, and filtering tail.
#[derive(Clone, Debug, Default)]
pub struct WithClause {
    /// Carry every existing binding forward (`WITH *`).
    pub star: bool,
    /// Additional projected items, each optionally aliased.
    pub items: Vec<(Expr, Option<String>)>,
    /// `DISTINCT` modifier.
    pub distinct: bool,
    /// `ORDER BY` items, applied after filtering for this scope.
    pub order_by: Vec<(Expr, SortDir)>,
    /// `SKIP` expression.
    pub skip: Option<Expr>,
    /// `LIMIT` expression.
    pub limit: Option<Expr>,
    /// Trailing `WHERE` predicate.
    pub filter: Option<Expr>,
}

impl WithClause {
    /// `WITH *` carrying everything forward unchanged.
    pub fn star() -> Self {
        WithClause {
            star: true,
            ..Default::default()
        }
    }

    /// `WITH expr AS alias`.
    pub fn item(expr: Expr, alias: Option<String>) -> Self {
        WithClause {
            items: vec![(expr, alias)],
            ..Default::default()
        }
    }
}

/// Terminal `RETURN` clause.
#[derive(Clone, Debug, Default)]
pub struct ReturnClause {
    /// Returned items, each optionally aliased.
    pub items: Vec<(Expr, Option<String>)>,
    /// `DISTINCT` modifier.
    pub distinct: bool,
    /// `ORDER BY` items.
    pub order_by: Vec<(Expr, SortDir)>,
    /// `SKIP` expression.
    pub skip: Option<Expr>,
    /// `LIMIT` expression.
    pub limit: Option<Expr>,
}

impl ReturnClause {
    /// `RETURN expr AS alias`.
    pub fn item(expr: Expr, alias: impl Into<String>) -> Self {
        ReturnClause {
            items: vec![(expr, Some(alias.into()))],
            ..Default::default()
        }
    }
}

/// Cypher clause.
#[derive(Clone, Debug)]
pub enum Clause {
    /// `MATCH` / `OPTIONAL MATCH`.
    Match {
        /// Pattern to match.
        pattern: Pattern,
        /// Render as `OPTIONAL MATCH`.
        optional: bool,
    },
    /// Standalone `WHERE` directly after a MATCH.
    Where(Expr),
    /// `WITH` projection boundary.
    With(WithClause),
    /// Terminal `RETURN`.
    Return(ReturnClause),
    /// `CALL { … }` subquery.
    Call {
        /// Clauses of the subquery body.
        body: Vec<Clause>,
    },
    /// `CALL name(args) YIELD a AS x, b AS y`.
    CallProcedure {
        /// Procedure name (dotted namespace allowed).
        name: &'static str,
        /// Argument expressions.
        args: Vec<Expr>,
        /// Yielded columns with their aliases.
        yields: Vec<(&'static str, Variable)>,
    },
    /// `UNION` of complete sub-statements (used inside `Call` bodies).
    Union {
        /// Each branch is a complete clause list.
        branches: Vec<Vec<Clause>>,
    },
    /// `CREATE pattern`.
    Create {
        /// Pattern to create.
        pattern: Pattern,
    },
    /// `MERGE pattern` with optional `ON CREATE SET` assignments.
    Merge {
        /// Pattern to merge.
        pattern: Pattern,
        /// Assignments applied only when the merge creates.
        on_create: Vec<SetItem>,
    },
    /// `SET` assignments.
    Set(Vec<SetItem>),
    /// `DELETE` / `DETACH DELETE`.
    Delete {
        /// Variables to delete.
        vars: Vec<Variable>,
        /// Render as `DETACH DELETE`.
        detach: bool,
    },
    /// `UNWIND expr AS alias`.
    Unwind {
        /// List expression to unwind.
        expr: Expr,
        /// Introduced row variable.
        alias: Variable,
    },
    /// Developer-authored raw fragment (`@cypher` directive bodies).
    ///
    /// This is the one deliberate hole in the no-raw-text rule: the fragment
    /// comes from the schema author, not from request input.
    Raw(String),
}

/// Renders a clause list into the final statement text.
pub fn render_statement(clauses: &[Clause]) -> String {
    let mut out = String::new();
    render_clauses(clauses, 0, &mut out);
    out
}

fn indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn render_clauses(clauses: &[Clause], level: usize, out: &mut String) {
    for (idx, clause) in clauses.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        render_clause(clause, level, out);
    }
}

fn render_items(items: &[(Expr, Option<String>)], out: &mut String) {
    for (idx, (expr, alias)) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        expr.render(out);
        if let Some(alias) = alias {
            out.push_str(" AS ");
            out.push_str(&escape_identifier(alias));
        }
    }
}

fn render_tail(
    order_by: &[(Expr, SortDir)],
    skip: &Option<Expr>,
    limit: &Option<Expr>,
    level: usize,
    out: &mut String,
) {
    if !order_by.is_empty() {
        out.push('\n');
        indent(level, out);
        out.push_str("ORDER BY ");
        for (idx, (expr, dir)) in order_by.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            expr.render(out);
            out.push(' ');
            out.push_str(dir.token());
        }
    }
    if let Some(skip) = skip {
        out.push('\n');
        indent(level, out);
        out.push_str("SKIP ");
        skip.render(out);
    }
    if let Some(limit) = limit {
        out.push('\n');
        indent(level, out);
        out.push_str("LIMIT ");
        limit.render(out);
    }
}

fn render_set_items(items: &[SetItem], out: &mut String) {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        out.push_str(item.owner.name());
        out.push('.');
        out.push_str(&escape_identifier(&item.prop));
        out.push_str(" = ");
        item.value.render(out);
    }
}

fn render_clause(clause: &Clause, level: usize, out: &mut String) {
    // Union branches indent their own clauses; everything else gets the
    // leading indent here.
    if let Clause::Union { branches } = clause {
        for (idx, branch) in branches.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
                indent(level, out);
                out.push_str("UNION\n");
            }
            render_clauses(branch, level, out);
        }
        return;
    }
    indent(level, out);
    match clause {
        Clause::Match { pattern, optional } => {
            if *optional {
                out.push_str("OPTIONAL MATCH ");
            } else {
                out.push_str("MATCH ");
            }
            pattern.render(out);
        }
        Clause::Where(expr) => {
            out.push_str("WHERE ");
            expr.render(out);
        }
        Clause::With(with) => {
            out.push_str("WITH ");
            if with.distinct {
                out.push_str("DISTINCT ");
            }
            if with.star {
                out.push('*');
                if !with.items.is_empty() {
                    out.push_str(", ");
                }
            }
            render_items(&with.items, out);
            render_tail(&with.order_by, &with.skip, &with.limit, level, out);
            if let Some(filter) = &with.filter {
                out.push('\n');
                indent(level, out);
                out.push_str("WHERE ");
                filter.render(out);
            }
        }
        Clause::Return(ret) => {
            out.push_str("RETURN ");
            if ret.distinct {
                out.push_str("DISTINCT ");
            }
            render_items(&ret.items, out);
            render_tail(&ret.order_by, &ret.skip, &ret.limit, level, out);
        }
        Clause::Call { body } => {
            out.push_str("CALL {\n");
            render_clauses(body, level + 1, out);
            out.push('\n');
            indent(level, out);
            out.push('}');
        }
        Clause::CallProcedure { name, args, yields } => {
            out.push_str("CALL ");
            out.push_str(name);
            out.push('(');
            for (idx, arg) in args.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                arg.render(out);
            }
            out.push(')');
            if !yields.is_empty() {
                out.push_str(" YIELD ");
                for (idx, (column, alias)) in yields.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(column);
                    out.push_str(" AS ");
                    out.push_str(alias.name());
                }
            }
        }
        Clause::Union { .. } => unreachable!("handled before the indent"),
        Clause::Create { pattern } => {
            out.push_str("CREATE ");
            pattern.render(out);
        }
        Clause::Merge { pattern, on_create } => {
            out.push_str("MERGE ");
            pattern.render(out);
            if !on_create.is_empty() {
                out.push('\n');
                indent(level, out);
                out.push_str("ON CREATE SET ");
                render_set_items(on_create, out);
            }
        }
        Clause::Set(items) => {
            out.push_str("SET ");
            render_set_items(items, out);
        }
        Clause::Delete { vars, detach } => {
            if *detach {
                out.push_str("DETACH DELETE ");
            } else {
                out.push_str("DELETE ");
            }
            for (idx, var) in vars.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                out.push_str(var.name());
            }
        }
        Clause::Unwind { expr, alias } => {
            out.push_str("UNWIND ");
            expr.render(out);
            out.push_str(" AS ");
            out.push_str(alias.name());
        }
        Clause::Raw(text) => {
            out.push_str(text);
        }
    }
}

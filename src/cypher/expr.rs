//! Cypher expression tree.
//!
//! A closed sum type rendered by exhaustive match. User-supplied values never
//! appear here directly: they enter as [`Param`] handles registered with the
//! [`Environment`](super::env::Environment), and the trusted literal variants
//! (`String`, `Int`, `Bool`) are reserved for schema-derived constants such
//! as `__resolveType` discriminators.

use std::fmt::Write as _;

use super::env::{Param, Variable};
use super::escape::escape_identifier;

/// Direction of a relationship pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// `(a)-[r]->(b)`
    Out,
    /// `(a)<-[r]-(b)`
    In,
    /// `(a)-[r]-(b)`
    Undirected,
}

/// Node pattern: variable, labels, and inline property constraints.
#[derive(Clone, Debug)]
pub struct NodePattern {
    /// Bound variable, if the pattern introduces one.
    pub var: Option<Variable>,
    /// Labels, already resolved (templates expanded) but not yet escaped.
    pub labels: Vec<String>,
    /// Inline `{ prop: expr }` constraints (used by MERGE).
    pub props: Vec<(String, Expr)>,
}

impl NodePattern {
    /// Pattern with a variable and labels, no inline properties.
    pub fn new(var: Variable, labels: Vec<String>) -> Self {
        NodePattern {
            var: Some(var),
            labels,
            props: Vec::new(),
        }
    }

    /// Anonymous pattern with labels only.
    pub fn anonymous(labels: Vec<String>) -> Self {
        NodePattern {
            var: None,
            labels,
            props: Vec::new(),
        }
    }

    fn render(&self, out: &mut String) {
        out.push('(');
        if let Some(var) = &self.var {
            out.push_str(var.name());
        }
        for label in &self.labels {
            out.push(':');
            out.push_str(&escape_identifier(label));
        }
        if !self.props.is_empty() {
            out.push_str(" { ");
            for (idx, (prop, value)) in self.props.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                out.push_str(&escape_identifier(prop));
                out.push_str(": ");
                value.render(out);
            }
            out.push_str(" }");
        }
        out.push(')');
    }
}

/// Relationship pattern between two node patterns.
#[derive(Clone, Debug)]
pub struct RelPattern {
    /// Bound variable, if the pattern introduces one.
    pub var: Option<Variable>,
    /// Relationship type label, not yet escaped.
    pub rel_type: String,
    /// Traversal direction.
    pub direction: Direction,
}

/// `(left)-[rel]->(right)` and its directional variants.
#[derive(Clone, Debug)]
pub struct PathPattern {
    /// Left node pattern.
    pub left: NodePattern,
    /// Relationship between the two nodes.
    pub rel: RelPattern,
    /// Right node pattern.
    pub right: NodePattern,
}

impl PathPattern {
    pub(crate) fn render(&self, out: &mut String) {
        self.left.render(out);
        match self.rel.direction {
            Direction::In => out.push_str("<-["),
            Direction::Out | Direction::Undirected => out.push_str("-["),
        }
        if let Some(var) = &self.rel.var {
            out.push_str(var.name());
        }
        out.push(':');
        out.push_str(&escape_identifier(&self.rel.rel_type));
        match self.rel.direction {
            Direction::Out => out.push_str("]->"),
            Direction::In | Direction::Undirected => out.push_str("]-"),
        }
        self.right.render(out);
    }
}

/// Node or path pattern, as accepted by MATCH/CREATE/MERGE.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// A single node.
    Node(NodePattern),
    /// A node-relationship-node path.
    Path(PathPattern),
}

impl Pattern {
    pub(crate) fn render(&self, out: &mut String) {
        match self {
            Pattern::Node(node) => node.render(out),
            Pattern::Path(path) => path.render(out),
        }
    }
}

/// Binary comparison and arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `IN`
    In,
    /// `CONTAINS`
    Contains,
    /// `STARTS WITH`
    StartsWith,
    /// `ENDS WITH`
    EndsWith,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOp {
    fn token(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::In => "IN",
            BinaryOp::Contains => "CONTAINS",
            BinaryOp::StartsWith => "STARTS WITH",
            BinaryOp::EndsWith => "ENDS WITH",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Entry in a map projection.
#[derive(Clone, Debug)]
pub enum ProjectionItem {
    /// `.prop` shorthand.
    Spread(String),
    /// `alias: expr`.
    Aliased {
        /// Key in the projected map.
        alias: String,
        /// Projected expression.
        value: Expr,
    },
}

/// Cypher expression.
#[derive(Clone, Debug)]
pub enum Expr {
    /// A bound variable.
    Variable(Variable),
    /// A parameter slot (`$paramN`).
    Param(Param),
    /// `owner.prop` property access.
    Property {
        /// Variable owning the property.
        owner: Variable,
        /// Database property name, escaped at render time.
        prop: String,
    },
    /// Trusted schema-derived string literal.
    String(String),
    /// Trusted integer literal.
    Int(i64),
    /// Trusted boolean literal.
    Bool(bool),
    /// `null`.
    Null,
    /// List expression.
    List(Vec<Expr>),
    /// Map literal with escaped keys.
    Map(Vec<(String, Expr)>),
    /// `owner { .a, b: expr }` map projection.
    MapProjection {
        /// Variable being projected.
        owner: Variable,
        /// Ordered projection entries.
        items: Vec<ProjectionItem>,
    },
    /// Function invocation.
    Func {
        /// Function name (builtin or procedure namespace).
        name: &'static str,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// `NOT (expr)`.
    Not(Box<Expr>),
    /// Unary minus.
    Neg(Box<Expr>),
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`.
    IsNotNull(Box<Expr>),
    /// Conjunction; single-element lists render without parentheses.
    And(Vec<Expr>),
    /// Disjunction; single-element lists render without parentheses.
    Or(Vec<Expr>),
    /// Binary operator application.
    Binary {
        /// Left operand.
        lhs: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `owner:Label` label predicate.
    HasLabel {
        /// Variable under test.
        owner: Variable,
        /// Labels that must all be present.
        labels: Vec<String>,
    },
    /// `EXISTS { MATCH pattern WHERE filter }` subquery predicate.
    Exists {
        /// Pattern to probe.
        pattern: PathPattern,
        /// Optional inner filter.
        filter: Option<Box<Expr>>,
    },
    /// `COUNT { MATCH pattern WHERE filter }` subquery expression.
    CountSub {
        /// Pattern to count.
        pattern: PathPattern,
        /// Optional inner filter.
        filter: Option<Box<Expr>>,
    },
    /// Searched `CASE WHEN … THEN … ELSE … END`.
    Case {
        /// `(condition, result)` branches in order.
        branches: Vec<(Expr, Expr)>,
        /// Optional `ELSE` result.
        default: Option<Box<Expr>>,
    },
    /// `target[from..to]` list slice.
    Slice {
        /// Sliced list expression.
        target: Box<Expr>,
        /// Inclusive start index.
        from: Box<Expr>,
        /// Exclusive end index.
        to: Box<Expr>,
    },
    /// `target[index]` list element access.
    Index {
        /// Indexed list expression.
        target: Box<Expr>,
        /// Zero-based index expression.
        index: Box<Expr>,
    },
    /// `[var IN list | map]` list comprehension.
    ListComp {
        /// Element binding.
        var: Variable,
        /// Source list expression.
        list: Box<Expr>,
        /// Per-element result expression.
        map: Box<Expr>,
    },
}

impl Expr {
    /// Shorthand for a property access expression.
    pub fn prop(owner: &Variable, prop: impl Into<String>) -> Expr {
        Expr::Property {
            owner: owner.clone(),
            prop: prop.into(),
        }
    }

    /// Shorthand for a variable reference.
    pub fn var(variable: &Variable) -> Expr {
        Expr::Variable(variable.clone())
    }

    /// Shorthand for a binary operator application.
    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// Conjunction of the given predicates, flattening trivial cases.
    pub fn and(mut exprs: Vec<Expr>) -> Expr {
        if exprs.len() == 1 {
            exprs.pop().expect("length checked")
        } else {
            Expr::And(exprs)
        }
    }

    /// Disjunction of the given predicates, flattening trivial cases.
    pub fn or(mut exprs: Vec<Expr>) -> Expr {
        if exprs.len() == 1 {
            exprs.pop().expect("length checked")
        } else {
            Expr::Or(exprs)
        }
    }

    /// Renders the expression into `out`.
    pub fn render(&self, out: &mut String) {
        match self {
            Expr::Variable(var) => out.push_str(var.name()),
            Expr::Param(param) => {
                out.push('$');
                out.push_str(param.name());
            }
            Expr::Property { owner, prop } => {
                out.push_str(owner.name());
                out.push('.');
                out.push_str(&escape_identifier(prop));
            }
            Expr::String(text) => {
                out.push('"');
                for c in text.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            Expr::Int(value) => {
                let _ = write!(out, "{value}");
            }
            Expr::Bool(value) => {
                out.push_str(if *value { "true" } else { "false" });
            }
            Expr::Null => out.push_str("null"),
            Expr::List(items) => {
                out.push('[');
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    item.render(out);
                }
                out.push(']');
            }
            Expr::Map(entries) => {
                out.push_str("{ ");
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&escape_identifier(key));
                    out.push_str(": ");
                    value.render(out);
                }
                out.push_str(" }");
            }
            Expr::MapProjection { owner, items } => {
                out.push_str(owner.name());
                out.push_str(" { ");
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    match item {
                        ProjectionItem::Spread(prop) => {
                            out.push('.');
                            out.push_str(&escape_identifier(prop));
                        }
                        ProjectionItem::Aliased { alias, value } => {
                            out.push_str(&escape_identifier(alias));
                            out.push_str(": ");
                            value.render(out);
                        }
                    }
                }
                out.push_str(" }");
            }
            Expr::Func { name, args } => {
                out.push_str(name);
                out.push('(');
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    arg.render(out);
                }
                out.push(')');
            }
            Expr::Not(inner) => {
                out.push_str("NOT (");
                inner.render(out);
                out.push(')');
            }
            Expr::Neg(inner) => {
                out.push('-');
                inner.render(out);
            }
            Expr::IsNull(inner) => {
                inner.render(out);
                out.push_str(" IS NULL");
            }
            Expr::IsNotNull(inner) => {
                inner.render(out);
                out.push_str(" IS NOT NULL");
            }
            Expr::And(items) => render_connective(items, "AND", out),
            Expr::Or(items) => render_connective(items, "OR", out),
            Expr::Binary { lhs, op, rhs } => {
                lhs.render(out);
                out.push(' ');
                out.push_str(op.token());
                out.push(' ');
                rhs.render(out);
            }
            Expr::HasLabel { owner, labels } => {
                out.push_str(owner.name());
                for label in labels {
                    out.push(':');
                    out.push_str(&escape_identifier(label));
                }
            }
            Expr::Exists { pattern, filter } => {
                out.push_str("EXISTS { MATCH ");
                pattern.render(out);
                if let Some(filter) = filter {
                    out.push_str(" WHERE ");
                    filter.render(out);
                }
                out.push_str(" }");
            }
            Expr::CountSub { pattern, filter } => {
                out.push_str("COUNT { MATCH ");
                pattern.render(out);
                if let Some(filter) = filter {
                    out.push_str(" WHERE ");
                    filter.render(out);
                }
                out.push_str(" }");
            }
            Expr::Case { branches, default } => {
                out.push_str("CASE");
                for (condition, result) in branches {
                    out.push_str(" WHEN ");
                    condition.render(out);
                    out.push_str(" THEN ");
                    result.render(out);
                }
                if let Some(default) = default {
                    out.push_str(" ELSE ");
                    default.render(out);
                }
                out.push_str(" END");
            }
            Expr::Slice { target, from, to } => {
                target.render(out);
                out.push('[');
                from.render(out);
                out.push_str("..");
                to.render(out);
                out.push(']');
            }
            Expr::Index { target, index } => {
                target.render(out);
                out.push('[');
                index.render(out);
                out.push(']');
            }
            Expr::ListComp { var, list, map } => {
                out.push('[');
                out.push_str(var.name());
                out.push_str(" IN ");
                list.render(out);
                out.push_str(" | ");
                map.render(out);
                out.push(']');
            }
        }
    }
}

fn render_connective(items: &[Expr], token: &str, out: &mut String) {
    match items {
        [] => out.push_str("true"),
        [single] => single.render(out),
        _ => {
            out.push('(');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                    out.push_str(token);
                    out.push(' ');
                }
                item.render(out);
            }
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::env::Environment;

    fn render(expr: &Expr) -> String {
        let mut out = String::new();
        expr.render(&mut out);
        out
    }

    #[test]
    fn renders_comparison_with_param() {
        let mut env = Environment::new();
        let this = Variable::this();
        let param = env.param(crate::value::CypherValue::String("x".into()));
        let expr = Expr::binary(Expr::prop(&this, "title"), BinaryOp::Eq, Expr::Param(param));
        assert_eq!(render(&expr), "this.title = $param0");
    }

    #[test]
    fn renders_nested_connectives_with_parentheses() {
        let this = Variable::this();
        let expr = Expr::And(vec![
            Expr::IsNull(Box::new(Expr::prop(&this, "a"))),
            Expr::Or(vec![
                Expr::IsNotNull(Box::new(Expr::prop(&this, "b"))),
                Expr::Bool(true),
            ]),
        ]);
        assert_eq!(render(&expr), "(this.a IS NULL AND (this.b IS NOT NULL OR true))");
    }

    #[test]
    fn single_element_connective_drops_parentheses() {
        let this = Variable::this();
        let expr = Expr::and(vec![Expr::IsNull(Box::new(Expr::prop(&this, "a")))]);
        assert_eq!(render(&expr), "this.a IS NULL");
    }

    #[test]
    fn map_projection_escapes_odd_keys() {
        let this = Variable::this();
        let expr = Expr::MapProjection {
            owner: this.clone(),
            items: vec![
                ProjectionItem::Spread("title".into()),
                ProjectionItem::Aliased {
                    alias: "release year".into(),
                    value: Expr::prop(&this, "year"),
                },
            ],
        };
        assert_eq!(render(&expr), "this { .title, `release year`: this.year }");
    }

    #[test]
    fn exists_subquery_renders_pattern_and_filter() {
        let mut env = Environment::new();
        let this = Variable::this();
        let rel_var = env.variable();
        let target = env.variable();
        let expr = Expr::Exists {
            pattern: PathPattern {
                left: NodePattern::new(this, vec![]),
                rel: RelPattern {
                    var: Some(rel_var),
                    rel_type: "ACTED_IN".into(),
                    direction: Direction::In,
                },
                right: NodePattern::new(target.clone(), vec!["Person".into()]),
            },
            filter: Some(Box::new(Expr::IsNotNull(Box::new(Expr::prop(
                &target, "name",
            ))))),
        };
        assert_eq!(
            render(&expr),
            "EXISTS { MATCH (this)<-[this0:ACTED_IN]-(this1:Person) WHERE this1.name IS NOT NULL }"
        );
    }
}

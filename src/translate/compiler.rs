//! Query-AST to Cypher compilation.
//!
//! One `Compiler` per statement: it owns the naming environment, walks the
//! operation tree exactly once, and emits an ordered clause list. Relationship
//! projections and aggregate filters compile into `CALL { }` subqueries so
//! their row sets never multiply the parent scope.

use crate::ast::filter::{
    AggFunc, AggregateCondition, AggregateTarget, Filter, FilterOp, FilterValue, Quantifier,
};
use crate::ast::mutation::{CreateInput, CreateItem, RelationshipInput, UpdateInput, UpdateItem, UpdateOperator};
use crate::ast::node::{
    AggregateOperation, AggregateSelection, ConnectionOperation, CreateOperation, DeleteOperation,
    Operation, ReadOperation, UpdateOperation, VectorReadOperation,
};
use crate::ast::projection::{
    CompositeBranch, CompositeSelection, Projection, ProjectionField, RelationshipSelection,
};
use crate::ast::sort::SortItem;
use crate::context::RequestContext;
use crate::cypher::{
    BinaryOp, Clause, Direction, Environment, Expr, NodePattern, PathPattern, Pattern,
    ProjectionItem, RelPattern, ReturnClause, SetItem, Variable, WithClause,
};
use crate::error::{Error, TranslateError};
use crate::schema::directive::{DefaultValue, RelDirection, TimestampOp};
use crate::schema::{AuthOperation, CompositeKind, Entity, Relationship, SchemaModel};

use super::auth;

/// Lowers a parsed comparison operator onto concrete expressions.
pub(crate) fn comparison(lhs: Expr, op: FilterOp, rhs: Expr) -> Expr {
    match op {
        FilterOp::Eq => Expr::binary(lhs, BinaryOp::Eq, rhs),
        FilterOp::Neq => Expr::binary(lhs, BinaryOp::Neq, rhs),
        FilterOp::Gt => Expr::binary(lhs, BinaryOp::Gt, rhs),
        FilterOp::Gte => Expr::binary(lhs, BinaryOp::Gte, rhs),
        FilterOp::Lt => Expr::binary(lhs, BinaryOp::Lt, rhs),
        FilterOp::Lte => Expr::binary(lhs, BinaryOp::Lte, rhs),
        FilterOp::In => Expr::binary(lhs, BinaryOp::In, rhs),
        FilterOp::Contains => Expr::binary(lhs, BinaryOp::Contains, rhs),
        FilterOp::StartsWith => Expr::binary(lhs, BinaryOp::StartsWith, rhs),
        FilterOp::EndsWith => Expr::binary(lhs, BinaryOp::EndsWith, rhs),
        // `list_INCLUDES: value` flips the operands of IN.
        FilterOp::Includes => Expr::binary(rhs, BinaryOp::In, lhs),
    }
}

fn direction(direction: RelDirection) -> Direction {
    match direction {
        RelDirection::Out => Direction::Out,
        RelDirection::In => Direction::In,
        RelDirection::Undirected => Direction::Undirected,
    }
}

/// Compiles one operation tree into a clause list, threading the naming
/// environment.
pub(crate) struct Compiler<'a> {
    schema: &'a SchemaModel,
    ctx: &'a RequestContext,
    pub(crate) env: Environment,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(schema: &'a SchemaModel, ctx: &'a RequestContext) -> Self {
        Compiler {
            schema,
            ctx,
            env: Environment::new(),
        }
    }

    pub(crate) fn compile(&mut self, operation: &Operation) -> Result<Vec<Clause>, Error> {
        match operation {
            Operation::Read(op) => self.compile_read(op),
            Operation::Connection(op) => self.compile_connection(op),
            Operation::Aggregate(op) => self.compile_aggregate(op),
            Operation::VectorRead(op) => self.compile_vector_read(op),
            Operation::Create(op) => self.compile_create(op),
            Operation::Update(op) => self.compile_update(op),
            Operation::Delete(op) => self.compile_delete(op),
        }
    }

    fn entity(&self, name: &str) -> Result<&'a Entity, Error> {
        self.schema
            .entity(name)
            .ok_or_else(|| TranslateError::UnknownOperation {
                field: name.to_owned(),
            })
            .map_err(Error::from)
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    fn compile_read(&mut self, op: &ReadOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let this = Variable::this();
        let labels = entity.resolve_labels(self.ctx)?;

        let mut clauses = Vec::new();
        let mut conjuncts = Vec::new();

        if let Some(fulltext) = &op.fulltext {
            let phrase = self.env.param(fulltext.phrase.to_cypher_value());
            clauses.push(Clause::CallProcedure {
                name: "db.index.fulltext.queryNodes",
                args: vec![Expr::String(fulltext.index.clone()), Expr::Param(phrase)],
                yields: vec![("node", this.clone())],
            });
            // The index may span several labels; re-check ours.
            conjuncts.push(Expr::HasLabel {
                owner: this.clone(),
                labels: labels.clone(),
            });
        } else {
            clauses.push(Clause::Match {
                pattern: Pattern::Node(NodePattern::new(this.clone(), labels)),
                optional: false,
            });
        }

        let mut pre = Vec::new();
        if let Some(filter) = &op.filter {
            let (predicate, filter_pre) = self.compile_filter(entity, &this, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(entity, AuthOperation::Read, &this, &mut conjuncts)?;
        attach_filter(&mut clauses, pre, conjuncts);

        if !op.sort.is_empty() || !op.pagination.is_empty() {
            let mut with = WithClause::star();
            with.order_by = self.order_items(entity, &this, &op.sort);
            with.skip = op.pagination.offset.map(Expr::Int);
            with.limit = op.pagination.limit.map(Expr::Int);
            clauses.push(Clause::With(with));
        }

        let (map, calls) = self.compile_projection(entity, &this, &op.projection)?;
        clauses.extend(calls);
        clauses.push(Clause::Return(ReturnClause::item(map, "this")));
        Ok(clauses)
    }

    fn compile_vector_read(&mut self, op: &VectorReadOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let this = Variable::this();
        let labels = entity.resolve_labels(self.ctx)?;
        let score = self.env.intermediate();

        // The index procedure needs a neighbour count up front; fetch enough
        // rows to honor the offset as well. Both bounds are request input, so
        // the sum saturates rather than wraps.
        let neighbours = op
            .pagination
            .offset
            .unwrap_or(0)
            .saturating_add(op.pagination.limit.unwrap_or(10));
        let vector = self.env.param(op.vector.to_cypher_value());

        let mut clauses = vec![Clause::CallProcedure {
            name: "db.index.vector.queryNodes",
            args: vec![
                Expr::String(op.index.clone()),
                Expr::Int(neighbours),
                Expr::Param(vector),
            ],
            yields: vec![("node", this.clone()), ("score", score.clone())],
        }];

        let mut conjuncts = vec![Expr::HasLabel {
            owner: this.clone(),
            labels,
        }];
        let mut pre = Vec::new();
        if let Some(filter) = &op.filter {
            let (predicate, filter_pre) = self.compile_filter(entity, &this, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(entity, AuthOperation::Read, &this, &mut conjuncts)?;
        attach_filter(&mut clauses, pre, conjuncts);

        if op.pagination.offset.is_some() {
            let mut with = WithClause::star();
            with.skip = op.pagination.offset.map(Expr::Int);
            with.limit = op.pagination.limit.map(Expr::Int);
            clauses.push(Clause::With(with));
        }

        let (map, calls) = self.compile_projection(entity, &this, &op.projection)?;
        let map = match (&op.score, map) {
            (Some(alias), Expr::MapProjection { owner, mut items }) => {
                items.push(ProjectionItem::Aliased {
                    alias: alias.clone(),
                    value: Expr::var(&score),
                });
                Expr::MapProjection { owner, items }
            }
            (_, map) => map,
        };
        clauses.extend(calls);
        clauses.push(Clause::Return(ReturnClause::item(map, "this")));
        Ok(clauses)
    }

    fn compile_connection(&mut self, op: &ConnectionOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let this = Variable::this();
        let labels = entity.resolve_labels(self.ctx)?;

        let mut clauses = vec![Clause::Match {
            pattern: Pattern::Node(NodePattern::new(this.clone(), labels)),
            optional: false,
        }];
        let mut conjuncts = Vec::new();
        let mut pre = Vec::new();
        if let Some(filter) = &op.filter {
            let (predicate, filter_pre) = self.compile_filter(entity, &this, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(entity, AuthOperation::Read, &this, &mut conjuncts)?;
        attach_filter(&mut clauses, pre, conjuncts);

        if !op.sort.is_empty() {
            let mut with = WithClause::star();
            with.order_by = self.order_items(entity, &this, &op.sort);
            clauses.push(Clause::With(with));
        }

        // Collect every (ordered) node first; paging happens on the list so
        // totalCount stays exact.
        let node_map = match &op.selection.edges {
            Some(edges) => match &edges.node {
                Some((_, projection)) => {
                    let (map, calls) = self.compile_projection(entity, &this, projection)?;
                    clauses.extend(calls);
                    map
                }
                None => Expr::var(&this),
            },
            None => Expr::var(&this),
        };
        let all = self.env.intermediate();
        clauses.push(Clause::With(WithClause::item(
            Expr::Func {
                name: "collect",
                args: vec![node_map],
            },
            Some(all.name().to_owned()),
        )));

        let total = self.env.intermediate();
        let page = self.env.intermediate();
        let size_all = Expr::Func {
            name: "size",
            args: vec![Expr::var(&all)],
        };
        let from = Expr::Int(op.offset);
        // Both bounds are request input; a saturated end index still selects
        // every remaining element.
        let to = match op.first {
            Some(first) => Expr::Int(op.offset.saturating_add(first)),
            None => size_all.clone(),
        };
        let mut with = WithClause::item(size_all, Some(total.name().to_owned()));
        with.items.push((
            Expr::Slice {
                target: Box::new(Expr::var(&all)),
                from: Box::new(from),
                to: Box::new(to),
            },
            Some(page.name().to_owned()),
        ));
        clauses.push(Clause::With(with));

        let size_page = Expr::Func {
            name: "size",
            args: vec![Expr::var(&page)],
        };
        let mut payload = Vec::new();
        if let Some(edges) = &op.selection.edges {
            let element = self.env.intermediate();
            let mut edge_entries = Vec::new();
            if let Some(cursor_alias) = &edges.cursor {
                // Cursors are zero-based offsets; callers base64-encode them.
                edge_entries.push((
                    cursor_alias.clone(),
                    Expr::binary(Expr::var(&element), BinaryOp::Add, Expr::Int(op.offset)),
                ));
            }
            if let Some((node_alias, _)) = &edges.node {
                edge_entries.push((
                    node_alias.clone(),
                    Expr::Index {
                        target: Box::new(Expr::var(&page)),
                        index: Box::new(Expr::var(&element)),
                    },
                ));
            }
            let edge_map = if edge_entries.is_empty() {
                Expr::Index {
                    target: Box::new(Expr::var(&page)),
                    index: Box::new(Expr::var(&element)),
                }
            } else {
                Expr::Map(edge_entries)
            };
            payload.push((
                edges.alias.clone(),
                Expr::ListComp {
                    var: element,
                    list: Box::new(Expr::Func {
                        name: "range",
                        args: vec![
                            Expr::Int(0),
                            Expr::binary(size_page.clone(), BinaryOp::Sub, Expr::Int(1)),
                        ],
                    }),
                    map: Box::new(edge_map),
                },
            ));
        }
        if let Some(alias) = &op.selection.total_count {
            payload.push((alias.clone(), Expr::var(&total)));
        }
        if let Some(info) = &op.selection.page_info {
            let mut entries = Vec::new();
            if let Some(alias) = &info.has_next_page {
                entries.push((
                    alias.clone(),
                    Expr::binary(
                        Expr::binary(Expr::Int(op.offset), BinaryOp::Add, size_page.clone()),
                        BinaryOp::Lt,
                        Expr::var(&total),
                    ),
                ));
            }
            if let Some(alias) = &info.has_previous_page {
                entries.push((alias.clone(), Expr::Bool(op.offset > 0)));
            }
            if let Some(alias) = &info.end_cursor {
                entries.push((
                    alias.clone(),
                    Expr::binary(
                        Expr::binary(Expr::Int(op.offset), BinaryOp::Add, size_page.clone()),
                        BinaryOp::Sub,
                        Expr::Int(1),
                    ),
                ));
            }
            payload.push((info.alias.clone(), Expr::Map(entries)));
        }
        clauses.push(Clause::Return(ReturnClause::item(Expr::Map(payload), "this")));
        Ok(clauses)
    }

    fn compile_aggregate(&mut self, op: &AggregateOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let mut clauses = Vec::new();
        let mut payload = Vec::new();

        // Each selected aggregation runs in its own uncorrelated subquery so
        // differing orderings never interfere.
        for selection in &op.selections {
            match selection {
                AggregateSelection::Count { alias } => {
                    let (body, result) = self.aggregate_block(entity, op.filter.as_ref(), |_, node| {
                        Ok((
                            Vec::new(),
                            Expr::Func {
                                name: "count",
                                args: vec![Expr::var(node)],
                            },
                        ))
                    })?;
                    clauses.push(Clause::Call { body });
                    payload.push((alias.clone(), Expr::var(&result)));
                }
                AggregateSelection::Field { alias, field, funcs } => {
                    let attribute =
                        entity
                            .attribute(field)
                            .ok_or_else(|| TranslateError::UnknownField {
                                type_name: entity.name.clone(),
                                field: field.clone(),
                            })?;
                    let prop = attribute.property.clone();
                    let funcs = funcs.clone();
                    let (body, result) =
                        self.aggregate_block(entity, op.filter.as_ref(), |env, node| {
                            let value = Expr::prop(node, prop.clone());
                            let ordered = funcs
                                .iter()
                                .any(|(_, func)| matches!(func, AggFunc::Shortest | AggFunc::Longest));
                            let mut extra = Vec::new();
                            let collected = if ordered {
                                // Length-ordered collect; head is shortest,
                                // last is longest.
                                let mut with = WithClause::item(Expr::var(node), None);
                                with.order_by = vec![(
                                    Expr::Func {
                                        name: "size",
                                        args: vec![value.clone()],
                                    },
                                    crate::cypher::SortDir::Asc,
                                )];
                                extra.push(Clause::With(with));
                                let list = env.intermediate();
                                extra.push(Clause::With(WithClause::item(
                                    Expr::Func {
                                        name: "collect",
                                        args: vec![value.clone()],
                                    },
                                    Some(list.name().to_owned()),
                                )));
                                Some(list)
                            } else {
                                None
                            };
                            let mut entries = Vec::new();
                            for (key, func) in &funcs {
                                let expr = match func {
                                    AggFunc::Min => Expr::Func {
                                        name: "min",
                                        args: vec![value.clone()],
                                    },
                                    AggFunc::Max => Expr::Func {
                                        name: "max",
                                        args: vec![value.clone()],
                                    },
                                    AggFunc::Sum => Expr::Func {
                                        name: "sum",
                                        args: vec![value.clone()],
                                    },
                                    AggFunc::Avg => Expr::Func {
                                        name: "avg",
                                        args: vec![value.clone()],
                                    },
                                    AggFunc::Shortest => Expr::Func {
                                        name: "head",
                                        args: vec![Expr::var(
                                            collected.as_ref().expect("ordered collect exists"),
                                        )],
                                    },
                                    AggFunc::Longest => Expr::Func {
                                        name: "last",
                                        args: vec![Expr::var(
                                            collected.as_ref().expect("ordered collect exists"),
                                        )],
                                    },
                                };
                                entries.push((key.clone(), expr));
                            }
                            Ok((extra, Expr::Map(entries)))
                        })?;
                    clauses.push(Clause::Call { body });
                    payload.push((alias.clone(), Expr::var(&result)));
                }
            }
        }
        clauses.push(Clause::Return(ReturnClause::item(Expr::Map(payload), "this")));
        Ok(clauses)
    }

    /// One uncorrelated `CALL { MATCH … WHERE … <extra> RETURN expr AS varN }`
    /// block; `build` produces the extra clauses and the returned expression.
    fn aggregate_block(
        &mut self,
        entity: &Entity,
        filter: Option<&Filter>,
        build: impl FnOnce(&mut Environment, &Variable) -> Result<(Vec<Clause>, Expr), Error>,
    ) -> Result<(Vec<Clause>, Variable), Error> {
        let node = self.env.variable();
        let labels = entity.resolve_labels(self.ctx)?;
        let mut body = vec![Clause::Match {
            pattern: Pattern::Node(NodePattern::new(node.clone(), labels)),
            optional: false,
        }];
        let mut conjuncts = Vec::new();
        let mut pre = Vec::new();
        if let Some(filter) = filter {
            let (predicate, filter_pre) = self.compile_filter(entity, &node, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(entity, AuthOperation::Read, &node, &mut conjuncts)?;
        attach_filter(&mut body, pre, conjuncts);

        let (extra, expr) = build(&mut self.env, &node)?;
        body.extend(extra);
        let result = self.env.intermediate();
        body.push(Clause::Return(ReturnClause::item(expr, result.name().to_owned())));
        Ok((body, result))
    }

    // -----------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------

    /// Compiles a filter tree into a predicate plus any preceding `CALL`
    /// blocks (relationship aggregate conditions).
    fn compile_filter(
        &mut self,
        entity: &Entity,
        node: &Variable,
        filter: &Filter,
    ) -> Result<(Expr, Vec<Clause>), Error> {
        let mut pre = Vec::new();
        let predicate = self.filter_expr(entity, node, filter, &mut pre)?;
        Ok((predicate, pre))
    }

    fn filter_expr(
        &mut self,
        entity: &Entity,
        node: &Variable,
        filter: &Filter,
        pre: &mut Vec<Clause>,
    ) -> Result<Expr, Error> {
        match filter {
            Filter::And(children) => {
                let mut exprs = Vec::with_capacity(children.len());
                for child in children {
                    exprs.push(self.filter_expr(entity, node, child, pre)?);
                }
                Ok(Expr::and(exprs))
            }
            Filter::Or(children) => {
                let mut exprs = Vec::with_capacity(children.len());
                for child in children {
                    exprs.push(self.filter_expr(entity, node, child, pre)?);
                }
                Ok(Expr::or(exprs))
            }
            Filter::Not(inner) => Ok(Expr::Not(Box::new(
                self.filter_expr(entity, node, inner, pre)?,
            ))),
            Filter::Property { field, op, value } => {
                let attribute =
                    entity
                        .attribute(field)
                        .ok_or_else(|| TranslateError::UnknownField {
                            type_name: entity.name.clone(),
                            field: field.clone(),
                        })?;
                let lhs = Expr::prop(node, attribute.property.clone());
                match value {
                    FilterValue::Null => Ok(match op {
                        FilterOp::Neq => Expr::IsNotNull(Box::new(lhs)),
                        _ => Expr::IsNull(Box::new(lhs)),
                    }),
                    FilterValue::Value(value) => {
                        let param = self.env.param(value.clone());
                        Ok(comparison(lhs, *op, Expr::Param(param)))
                    }
                }
            }
            Filter::Relationship {
                field,
                quantifier,
                filter,
            } => self.quantified(entity, node, field, *quantifier, filter.as_deref()),
            Filter::Aggregate { field, conditions } => {
                let call = self.aggregate_filter_block(entity, node, field, conditions)?;
                let (body, result) = call;
                pre.push(Clause::Call { body });
                Ok(Expr::var(&result))
            }
        }
    }

    fn rel_path(
        &mut self,
        source: &Variable,
        relationship: &Relationship,
        rel_var: Option<Variable>,
        target: &Variable,
        target_labels: Vec<String>,
    ) -> PathPattern {
        PathPattern {
            left: NodePattern::new(source.clone(), Vec::new()),
            rel: RelPattern {
                var: rel_var,
                rel_type: relationship.rel_type.clone(),
                direction: direction(relationship.direction),
            },
            right: NodePattern::new(target.clone(), target_labels),
        }
    }

    fn quantified(
        &mut self,
        entity: &Entity,
        node: &Variable,
        field: &str,
        quantifier: Quantifier,
        filter: Option<&Filter>,
    ) -> Result<Expr, Error> {
        let relationship =
            entity
                .relationship(field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: field.to_owned(),
                })?;
        let target_entity = self.entity(&relationship.target)?;
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;
        let pattern = self.rel_path(node, relationship, None, &target, labels);

        let inner = match filter {
            Some(filter) => {
                // Aggregate conditions cannot nest inside EXISTS subqueries.
                let mut nested_pre = Vec::new();
                let expr = self.filter_expr(target_entity, &target, filter, &mut nested_pre)?;
                if !nested_pre.is_empty() {
                    return Err(TranslateError::InvalidFilterValue {
                        field: field.to_owned(),
                        reason: "aggregate conditions cannot appear inside quantified filters",
                    }
                    .into());
                }
                Some(expr)
            }
            None => None,
        };

        Ok(match quantifier {
            Quantifier::Some => Expr::Exists {
                pattern,
                filter: inner.map(Box::new),
            },
            Quantifier::None => Expr::Not(Box::new(Expr::Exists {
                pattern,
                filter: inner.map(Box::new),
            })),
            Quantifier::Single => Expr::binary(
                Expr::CountSub {
                    pattern,
                    filter: inner.map(Box::new),
                },
                BinaryOp::Eq,
                Expr::Int(1),
            ),
            Quantifier::All => {
                // Matched nodes all satisfy the filter, and at least one
                // exists: some match, none fail.
                let negated = inner.clone().map(|expr| Expr::Not(Box::new(expr)));
                Expr::and(vec![
                    Expr::Exists {
                        pattern: pattern.clone(),
                        filter: inner.map(Box::new),
                    },
                    Expr::Not(Box::new(Expr::Exists {
                        pattern,
                        filter: negated.map(Box::new),
                    })),
                ])
            }
        })
    }

    fn aggregate_filter_block(
        &mut self,
        entity: &Entity,
        node: &Variable,
        field: &str,
        conditions: &[AggregateCondition],
    ) -> Result<(Vec<Clause>, Variable), Error> {
        let relationship =
            entity
                .relationship(field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: field.to_owned(),
                })?;
        let target_entity = self.entity(&relationship.target)?;
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;
        let pattern = self.rel_path(node, relationship, None, &target, labels);

        let mut conjuncts = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let lhs = match &condition.target {
                AggregateTarget::Count => Expr::Func {
                    name: "count",
                    args: vec![Expr::var(&target)],
                },
                AggregateTarget::Node { field, func } => {
                    let attribute = target_entity.attribute(field).ok_or_else(|| {
                        TranslateError::UnknownField {
                            type_name: target_entity.name.clone(),
                            field: field.clone(),
                        }
                    })?;
                    let value = Expr::prop(&target, attribute.property.clone());
                    match func {
                        AggFunc::Min => Expr::Func {
                            name: "min",
                            args: vec![value],
                        },
                        AggFunc::Max => Expr::Func {
                            name: "max",
                            args: vec![value],
                        },
                        AggFunc::Sum => Expr::Func {
                            name: "sum",
                            args: vec![value],
                        },
                        AggFunc::Avg => Expr::Func {
                            name: "avg",
                            args: vec![value],
                        },
                        // String aggregates compare by codepoint length.
                        AggFunc::Shortest => Expr::Func {
                            name: "min",
                            args: vec![Expr::Func {
                                name: "size",
                                args: vec![value],
                            }],
                        },
                        AggFunc::Longest => Expr::Func {
                            name: "max",
                            args: vec![Expr::Func {
                                name: "size",
                                args: vec![value],
                            }],
                        },
                    }
                }
            };
            let param = self.env.param(condition.value.clone());
            conjuncts.push(comparison(lhs, condition.op, Expr::Param(param)));
        }

        let result = self.env.intermediate();
        let body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Match {
                pattern: Pattern::Path(pattern),
                optional: true,
            },
            Clause::Return(ReturnClause::item(
                Expr::and(conjuncts),
                result.name().to_owned(),
            )),
        ];
        Ok((body, result))
    }

    // -----------------------------------------------------------------
    // Projections
    // -----------------------------------------------------------------

    /// Compiles a projection into a map-projection expression plus the
    /// `CALL` subqueries that feed its relationship fields.
    fn compile_projection(
        &mut self,
        entity: &Entity,
        node: &Variable,
        projection: &Projection,
    ) -> Result<(Expr, Vec<Clause>), Error> {
        let mut items = Vec::new();
        let mut calls = Vec::new();
        for field in &projection.fields {
            match field {
                ProjectionField::Property { alias, field } => {
                    let attribute =
                        entity
                            .attribute(field)
                            .ok_or_else(|| TranslateError::UnknownField {
                                type_name: entity.name.clone(),
                                field: field.clone(),
                            })?;
                    if alias == &attribute.property {
                        items.push(ProjectionItem::Spread(attribute.property.clone()));
                    } else {
                        items.push(ProjectionItem::Aliased {
                            alias: alias.clone(),
                            value: Expr::prop(node, attribute.property.clone()),
                        });
                    }
                }
                ProjectionField::Cypher { alias, field } => {
                    let attribute =
                        entity
                            .attribute(field)
                            .ok_or_else(|| TranslateError::UnknownField {
                                type_name: entity.name.clone(),
                                field: field.clone(),
                            })?;
                    let annotation = attribute
                        .cypher
                        .as_ref()
                        .expect("projection field classified as cypher");
                    let result = self.env.intermediate();
                    calls.push(Clause::Call {
                        body: vec![
                            Clause::With(WithClause::item(
                                Expr::var(node),
                                Some("this".to_owned()),
                            )),
                            Clause::Raw(annotation.statement.clone()),
                        ],
                    });
                    // Re-alias the fragment's column so sibling fragments
                    // cannot collide.
                    let mut rename = WithClause::star();
                    rename.items.push((
                        Expr::Variable(Variable::named(annotation.column_name.clone())),
                        Some(result.name().to_owned()),
                    ));
                    calls.push(Clause::With(rename));
                    items.push(ProjectionItem::Aliased {
                        alias: alias.clone(),
                        value: Expr::var(&result),
                    });
                }
                ProjectionField::Relationship { alias, selection } => {
                    let (call, result) = self.relationship_call(entity, node, selection)?;
                    calls.push(call);
                    items.push(ProjectionItem::Aliased {
                        alias: alias.clone(),
                        value: Expr::var(&result),
                    });
                }
                ProjectionField::Composite { alias, selection } => {
                    let (call, result) = self.composite_call(entity, node, selection)?;
                    calls.push(call);
                    items.push(ProjectionItem::Aliased {
                        alias: alias.clone(),
                        value: Expr::var(&result),
                    });
                }
                ProjectionField::Typename { alias, type_name } => {
                    items.push(ProjectionItem::Aliased {
                        alias: alias.clone(),
                        value: Expr::String(type_name.clone()),
                    });
                }
            }
        }
        Ok((
            Expr::MapProjection {
                owner: node.clone(),
                items,
            },
            calls,
        ))
    }

    fn relationship_call(
        &mut self,
        entity: &Entity,
        node: &Variable,
        selection: &RelationshipSelection,
    ) -> Result<(Clause, Variable), Error> {
        let relationship =
            entity
                .relationship(&selection.field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: selection.field.clone(),
                })?;
        let target_entity = self.entity(&relationship.target)?;
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;
        let pattern = self.rel_path(node, relationship, None, &target, labels);

        let mut body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Match {
                pattern: Pattern::Path(pattern),
                optional: false,
            },
        ];
        let mut conjuncts = Vec::new();
        let mut pre = Vec::new();
        if let Some(filter) = &selection.filter {
            let (predicate, filter_pre) = self.compile_filter(target_entity, &target, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(target_entity, AuthOperation::Read, &target, &mut conjuncts)?;
        attach_filter(&mut body, pre, conjuncts);

        let (map, nested) = self.compile_projection(target_entity, &target, &selection.projection)?;
        body.extend(nested);

        if !selection.sort.is_empty() || !selection.pagination.is_empty() {
            let mut with = WithClause::star();
            with.order_by = self.order_items(target_entity, &target, &selection.sort);
            with.skip = selection.pagination.offset.map(Expr::Int);
            with.limit = selection.pagination.limit.map(Expr::Int);
            body.push(Clause::With(with));
        }

        let collected = Expr::Func {
            name: "collect",
            args: vec![map],
        };
        let value = if relationship.list {
            collected
        } else {
            Expr::Func {
                name: "head",
                args: vec![collected],
            }
        };
        let result = self.env.intermediate();
        body.push(Clause::Return(ReturnClause::item(value, result.name().to_owned())));
        Ok((Clause::Call { body }, result))
    }

    fn composite_call(
        &mut self,
        entity: &Entity,
        node: &Variable,
        selection: &CompositeSelection,
    ) -> Result<(Clause, Variable), Error> {
        let relationship =
            entity
                .relationship(&selection.field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: selection.field.clone(),
                })?;
        match selection.kind {
            CompositeKind::Union => {
                self.union_call(node, relationship, &selection.branches)
            }
            CompositeKind::Interface => {
                self.interface_call(node, relationship, &selection.branches)
            }
        }
    }

    /// Union-typed relationship: one `UNION` branch per selected member,
    /// every branch returning the same alias, collected afterwards.
    fn union_call(
        &mut self,
        node: &Variable,
        relationship: &Relationship,
        branches: &[CompositeBranch],
    ) -> Result<(Clause, Variable), Error> {
        let shared = self.env.intermediate();
        let mut union_branches = Vec::with_capacity(branches.len());
        for branch in branches {
            let target_entity = self.entity(&branch.target)?;
            let target = self.env.variable();
            let labels = target_entity.resolve_labels(self.ctx)?;
            let pattern = self.rel_path(node, relationship, None, &target, labels);

            let mut clauses = vec![
                Clause::With(WithClause::item(Expr::var(node), None)),
                Clause::Match {
                    pattern: Pattern::Path(pattern),
                    optional: false,
                },
            ];
            let mut conjuncts = Vec::new();
            let mut pre = Vec::new();
            if let Some(filter) = &branch.filter {
                let (predicate, filter_pre) =
                    self.compile_filter(target_entity, &target, filter)?;
                conjuncts.push(predicate);
                pre = filter_pre;
            }
            self.guards(target_entity, AuthOperation::Read, &target, &mut conjuncts)?;
            attach_filter(&mut clauses, pre, conjuncts);

            let (map, nested) =
                self.compile_projection(target_entity, &target, &branch.projection)?;
            clauses.extend(nested);
            let map = inject_resolve_type(map, &branch.target);
            clauses.push(Clause::Return(ReturnClause::item(map, shared.name().to_owned())));
            union_branches.push(clauses);
        }

        let result = self.env.intermediate();
        let body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Call {
                body: vec![Clause::Union {
                    branches: union_branches,
                }],
            },
            Clause::Return(ReturnClause::item(
                Expr::Func {
                    name: "collect",
                    args: vec![Expr::var(&shared)],
                },
                result.name().to_owned(),
            )),
        ];
        Ok((Clause::Call { body }, result))
    }

    /// Interface-typed relationship: a single unlabeled match with a
    /// label-guarded `CASE` choosing the per-member projection.
    fn interface_call(
        &mut self,
        node: &Variable,
        relationship: &Relationship,
        branches: &[CompositeBranch],
    ) -> Result<(Clause, Variable), Error> {
        let target = self.env.variable();
        let pattern = self.rel_path(node, relationship, None, &target, Vec::new());

        let mut body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Match {
                pattern: Pattern::Path(pattern),
                optional: false,
            },
        ];

        let mut label_guards = Vec::with_capacity(branches.len());
        let mut case_branches = Vec::with_capacity(branches.len());
        let mut nested_calls = Vec::new();
        for branch in branches {
            let target_entity = self.entity(&branch.target)?;
            let labels = target_entity.resolve_labels(self.ctx)?;
            let has_label = Expr::HasLabel {
                owner: target.clone(),
                labels,
            };

            let mut guard = vec![has_label.clone()];
            if let Some(filter) = &branch.filter {
                let (predicate, pre) = self.compile_filter(target_entity, &target, filter)?;
                if !pre.is_empty() {
                    return Err(TranslateError::InvalidFilterValue {
                        field: relationship.name.clone(),
                        reason: "aggregate conditions cannot appear inside interface filters",
                    }
                    .into());
                }
                guard.push(predicate);
            }
            if let Some(auth) = auth::filter_predicate(
                target_entity,
                AuthOperation::Read,
                &target,
                self.ctx,
                &mut self.env,
            ) {
                guard.push(auth);
            }
            label_guards.push(Expr::and(guard));

            let (map, nested) =
                self.compile_projection(target_entity, &target, &branch.projection)?;
            nested_calls.extend(nested);
            case_branches.push((has_label, inject_resolve_type(map, &branch.target)));
        }

        body.push(Clause::Where(Expr::or(label_guards)));
        body.extend(nested_calls);

        let result = self.env.intermediate();
        body.push(Clause::Return(ReturnClause::item(
            Expr::Func {
                name: "collect",
                args: vec![Expr::Case {
                    branches: case_branches,
                    default: None,
                }],
            },
            result.name().to_owned(),
        )));
        Ok((Clause::Call { body }, result))
    }

    fn order_items(
        &self,
        entity: &Entity,
        node: &Variable,
        sort: &[SortItem],
    ) -> Vec<(Expr, crate::cypher::SortDir)> {
        sort.iter()
            .map(|item| {
                let property = entity
                    .attribute(&item.field)
                    .map(|attr| attr.property.clone())
                    .unwrap_or_else(|| item.field.clone());
                (Expr::prop(node, property), item.direction)
            })
            .collect()
    }

    /// Appends the entity's read/write guards for `operation` to the
    /// conjunct list: filter rules narrow, validate rules abort.
    fn guards(
        &mut self,
        entity: &Entity,
        operation: AuthOperation,
        node: &Variable,
        conjuncts: &mut Vec<Expr>,
    ) -> Result<(), Error> {
        if entity.authentication && !self.ctx.is_authenticated() {
            return Err(crate::error::AuthError::Unauthenticated.into());
        }
        if let Some(filter) =
            auth::filter_predicate(entity, operation, node, self.ctx, &mut self.env)
        {
            conjuncts.push(filter);
        }
        if let Some(validate) =
            auth::validate_predicate(entity, operation, node, self.ctx, &mut self.env)
                .map_err(Error::from)?
        {
            conjuncts.push(auth::validate_guard(validate));
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    fn compile_create(&mut self, op: &CreateOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let mut clauses = Vec::new();
        let mut created = Vec::with_capacity(op.inputs.len());
        for input in &op.inputs {
            let node = self.env.variable();
            self.create_node(entity, &node, input, &mut clauses)?;
            created.push(node);
        }

        match &op.projection {
            Some((alias, projection)) => {
                let mut maps = Vec::with_capacity(created.len());
                for node in &created {
                    let (map, calls) = self.compile_projection(entity, node, projection)?;
                    clauses.extend(calls);
                    maps.push(map);
                }
                clauses.push(Clause::Return(ReturnClause::item(
                    Expr::List(maps),
                    alias.clone(),
                )));
            }
            None => {
                let counts = created.iter().map(Expr::var).collect();
                clauses.push(Clause::Return(ReturnClause::item(
                    Expr::Func {
                        name: "size",
                        args: vec![Expr::List(counts)],
                    },
                    "nodesCreated",
                )));
            }
        }
        Ok(clauses)
    }

    fn create_node(
        &mut self,
        entity: &Entity,
        node: &Variable,
        input: &CreateInput,
        clauses: &mut Vec<Clause>,
    ) -> Result<(), Error> {
        let labels = entity.resolve_labels(self.ctx)?;
        clauses.push(Clause::Create {
            pattern: Pattern::Node(NodePattern::new(node.clone(), labels)),
        });

        let mut set_items = Vec::new();
        for item in &input.items {
            let attribute =
                entity
                    .attribute(&item.field)
                    .ok_or_else(|| TranslateError::UnknownField {
                        type_name: entity.name.clone(),
                        field: item.field.clone(),
                    })?;
            let param = self.env.param(item.value.to_cypher_value());
            set_items.push(SetItem {
                owner: node.clone(),
                prop: attribute.property.clone(),
                value: Expr::Param(param),
            });
        }
        self.apply_defaults(entity, node, &input.items, &mut set_items)?;
        if !set_items.is_empty() {
            clauses.push(Clause::Set(set_items));
        }

        let mut conjuncts = Vec::new();
        self.guards(entity, AuthOperation::Create, node, &mut conjuncts)?;
        if !conjuncts.is_empty() {
            let mut with = WithClause::star();
            with.filter = Some(Expr::and(conjuncts));
            clauses.push(Clause::With(with));
        }

        for cascade in &input.relationships {
            self.create_cascade(entity, node, cascade, clauses)?;
        }

        // A required singular relationship is checked once the cascades ran.
        for relationship in &entity.relationships {
            if relationship.required && !relationship.list {
                clauses.push(self.cardinality_guard(entity, node, relationship)?);
            }
        }
        Ok(())
    }

    fn apply_defaults(
        &mut self,
        entity: &Entity,
        node: &Variable,
        supplied: &[CreateItem],
        set_items: &mut Vec<SetItem>,
    ) -> Result<(), Error> {
        for attribute in &entity.attributes {
            if supplied.iter().any(|item| item.field == attribute.name) {
                continue;
            }
            if let Some(ops) = &attribute.timestamp {
                if ops.contains(&TimestampOp::Create) {
                    set_items.push(SetItem {
                        owner: node.clone(),
                        prop: attribute.property.clone(),
                        value: Expr::Func {
                            name: "datetime",
                            args: vec![],
                        },
                    });
                    continue;
                }
            }
            match &attribute.default {
                None => {}
                Some(DefaultValue::Literal(value)) => {
                    let param = self.env.param(value.clone());
                    set_items.push(SetItem {
                        owner: node.clone(),
                        prop: attribute.property.clone(),
                        value: Expr::Param(param),
                    });
                }
                Some(DefaultValue::Callback(name)) => {
                    let value = self
                        .ctx
                        .callback(name)
                        .cloned()
                        .ok_or_else(|| TranslateError::UnresolvedCallback { name: name.clone() })?;
                    let param = self.env.param(value);
                    set_items.push(SetItem {
                        owner: node.clone(),
                        prop: attribute.property.clone(),
                        value: Expr::Param(param),
                    });
                }
            }
        }
        Ok(())
    }

    fn create_cascade(
        &mut self,
        entity: &Entity,
        node: &Variable,
        cascade: &RelationshipInput,
        clauses: &mut Vec<Clause>,
    ) -> Result<(), Error> {
        let relationship =
            entity
                .relationship(&cascade.field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: cascade.field.clone(),
                })?;
        let target_entity = self.entity(&relationship.target)?;

        for step in &cascade.create {
            let target = self.env.variable();
            self.create_node(target_entity, &target, &step.node, clauses)?;
            let rel_var = self.env.variable();
            let pattern = self.rel_path(
                node,
                relationship,
                Some(rel_var.clone()),
                &target,
                Vec::new(),
            );
            clauses.push(Clause::Create {
                pattern: Pattern::Path(pattern),
            });
            self.set_edge_props(relationship, &rel_var, &step.edge, clauses)?;
        }

        for step in &cascade.connect {
            let body = self.connect_body(node, relationship, target_entity, step.filter.as_ref(), &step.edge, None)?;
            clauses.push(Clause::Call { body });
        }

        for step in &cascade.connect_or_create {
            let body = self.connect_body(
                node,
                relationship,
                target_entity,
                step.filter.as_ref(),
                &step.edge,
                Some(&step.on_create),
            )?;
            clauses.push(Clause::Call { body });
        }

        for step in &cascade.update {
            let body = self.nested_update_body(node, relationship, target_entity, step)?;
            clauses.push(Clause::Call { body });
        }

        for step in &cascade.disconnect {
            let body =
                self.detach_body(node, relationship, target_entity, step.filter.as_ref(), false)?;
            clauses.push(Clause::Call { body });
        }

        for step in &cascade.delete {
            let body =
                self.detach_body(node, relationship, target_entity, step.filter.as_ref(), true)?;
            clauses.push(Clause::Call { body });
        }
        Ok(())
    }

    fn set_edge_props(
        &mut self,
        relationship: &Relationship,
        rel_var: &Variable,
        edge: &[CreateItem],
        clauses: &mut Vec<Clause>,
    ) -> Result<(), Error> {
        if edge.is_empty() {
            return Ok(());
        }
        let properties = relationship
            .properties
            .as_deref()
            .and_then(|name| self.schema.relationship_properties(name));
        let mut items = Vec::with_capacity(edge.len());
        for item in edge {
            let prop = properties
                .and_then(|props| props.attribute(&item.field))
                .map(|attr| attr.property.clone())
                .unwrap_or_else(|| item.field.clone());
            let param = self.env.param(item.value.to_cypher_value());
            items.push(SetItem {
                owner: rel_var.clone(),
                prop,
                value: Expr::Param(param),
            });
        }
        clauses.push(Clause::Set(items));
        Ok(())
    }

    /// `CALL { WITH parent MATCH/MERGE target … MERGE relationship … }` body
    /// shared by connect and connectOrCreate.
    fn connect_body(
        &mut self,
        node: &Variable,
        relationship: &Relationship,
        target_entity: &Entity,
        filter: Option<&Filter>,
        edge: &[CreateItem],
        on_create: Option<&CreateInput>,
    ) -> Result<Vec<Clause>, Error> {
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;

        let mut body = vec![Clause::With(WithClause::item(Expr::var(node), None))];
        let mut conjuncts = Vec::new();

        match on_create {
            None => {
                body.push(Clause::Match {
                    pattern: Pattern::Node(NodePattern::new(target.clone(), labels)),
                    optional: false,
                });
                if let Some(filter) = filter {
                    let (predicate, pre) = self.compile_filter(target_entity, &target, filter)?;
                    if !pre.is_empty() {
                        return Err(TranslateError::InvalidFilterValue {
                            field: relationship.name.clone(),
                            reason: "aggregate conditions cannot appear inside connect filters",
                        }
                        .into());
                    }
                    conjuncts.push(predicate);
                }
            }
            Some(on_create) => {
                // connectOrCreate merges on the unique filter properties.
                let mut pattern = NodePattern::new(target.clone(), labels);
                if let Some(filter) = filter {
                    collect_merge_props(target_entity, filter, &mut self.env, &mut pattern.props)?;
                }
                let mut set_items = Vec::new();
                for item in &on_create.items {
                    let attribute = target_entity.attribute(&item.field).ok_or_else(|| {
                        TranslateError::UnknownField {
                            type_name: target_entity.name.clone(),
                            field: item.field.clone(),
                        }
                    })?;
                    let param = self.env.param(item.value.to_cypher_value());
                    set_items.push(SetItem {
                        owner: target.clone(),
                        prop: attribute.property.clone(),
                        value: Expr::Param(param),
                    });
                }
                body.push(Clause::Merge {
                    pattern: Pattern::Node(pattern),
                    on_create: set_items,
                });
            }
        }

        self.guards(
            target_entity,
            AuthOperation::CreateRelationship,
            &target,
            &mut conjuncts,
        )?;
        if !conjuncts.is_empty() {
            match body.last() {
                Some(Clause::Match { .. }) => body.push(Clause::Where(Expr::and(conjuncts))),
                _ => {
                    let mut with = WithClause::star();
                    with.filter = Some(Expr::and(conjuncts));
                    body.push(Clause::With(with));
                }
            }
        }

        let rel_var = self.env.variable();
        let pattern = self.rel_path(node, relationship, Some(rel_var.clone()), &target, Vec::new());
        body.push(Clause::Merge {
            pattern: Pattern::Path(pattern),
            on_create: Vec::new(),
        });
        self.set_edge_props(relationship, &rel_var, edge, &mut body)?;

        let result = self.env.intermediate();
        body.push(Clause::Return(ReturnClause::item(
            Expr::Func {
                name: "count",
                args: vec![Expr::var(&target)],
            },
            result.name().to_owned(),
        )));
        Ok(body)
    }

    fn nested_update_body(
        &mut self,
        node: &Variable,
        relationship: &Relationship,
        target_entity: &Entity,
        step: &crate::ast::mutation::NestedUpdate,
    ) -> Result<Vec<Clause>, Error> {
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;
        let pattern = self.rel_path(node, relationship, None, &target, labels);

        let mut body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Match {
                pattern: Pattern::Path(pattern),
                optional: false,
            },
        ];
        let mut conjuncts = Vec::new();
        if let Some(filter) = &step.filter {
            let (predicate, pre) = self.compile_filter(target_entity, &target, filter)?;
            if !pre.is_empty() {
                return Err(TranslateError::InvalidFilterValue {
                    field: relationship.name.clone(),
                    reason: "aggregate conditions cannot appear inside nested update filters",
                }
                .into());
            }
            conjuncts.push(predicate);
        }
        self.guards(target_entity, AuthOperation::Update, &target, &mut conjuncts)?;
        if !conjuncts.is_empty() {
            body.push(Clause::Where(Expr::and(conjuncts)));
        }

        self.apply_update(target_entity, &target, &step.update, &mut body)?;

        let result = self.env.intermediate();
        body.push(Clause::Return(ReturnClause::item(
            Expr::Func {
                name: "count",
                args: vec![Expr::var(&target)],
            },
            result.name().to_owned(),
        )));
        Ok(body)
    }

    /// `CALL { WITH parent MATCH … DELETE }` body shared by disconnect
    /// (delete the relationship) and nested delete (detach the target).
    fn detach_body(
        &mut self,
        node: &Variable,
        relationship: &Relationship,
        target_entity: &Entity,
        filter: Option<&Filter>,
        delete_target: bool,
    ) -> Result<Vec<Clause>, Error> {
        let rel_var = self.env.variable();
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;
        let pattern = self.rel_path(node, relationship, Some(rel_var.clone()), &target, labels);

        let mut body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Match {
                pattern: Pattern::Path(pattern),
                optional: false,
            },
        ];
        let mut conjuncts = Vec::new();
        if let Some(filter) = filter {
            let (predicate, pre) = self.compile_filter(target_entity, &target, filter)?;
            if !pre.is_empty() {
                return Err(TranslateError::InvalidFilterValue {
                    field: relationship.name.clone(),
                    reason: "aggregate conditions cannot appear inside cascade filters",
                }
                .into());
            }
            conjuncts.push(predicate);
        }
        let operation = if delete_target {
            AuthOperation::Delete
        } else {
            AuthOperation::DeleteRelationship
        };
        self.guards(target_entity, operation, &target, &mut conjuncts)?;
        if !conjuncts.is_empty() {
            body.push(Clause::Where(Expr::and(conjuncts)));
        }

        if delete_target {
            body.push(Clause::Delete {
                vars: vec![target.clone()],
                detach: true,
            });
        } else {
            body.push(Clause::Delete {
                vars: vec![rel_var],
                detach: false,
            });
        }

        let result = self.env.intermediate();
        body.push(Clause::Return(ReturnClause::item(
            Expr::Func {
                name: "count",
                args: vec![Expr::var(&target)],
            },
            result.name().to_owned(),
        )));
        Ok(body)
    }

    fn cardinality_guard(
        &mut self,
        entity: &Entity,
        node: &Variable,
        relationship: &Relationship,
    ) -> Result<Clause, Error> {
        let target_entity = self.entity(&relationship.target)?;
        let target = self.env.variable();
        let labels = target_entity.resolve_labels(self.ctx)?;
        let pattern = self.rel_path(node, relationship, None, &target, labels);

        let count = self.env.intermediate();
        let result = self.env.intermediate();
        let message = format!(
            "{}.{} required exactly once",
            entity.name, relationship.name
        );
        let mut with = WithClause::item(
            Expr::Func {
                name: "count",
                args: vec![Expr::var(&target)],
            },
            Some(count.name().to_owned()),
        );
        with.filter = Some(Expr::Func {
            name: "apoc.util.validatePredicate",
            args: vec![
                Expr::binary(Expr::var(&count), BinaryOp::Neq, Expr::Int(1)),
                Expr::String(message),
                Expr::List(vec![Expr::Int(0)]),
            ],
        });
        let body = vec![
            Clause::With(WithClause::item(Expr::var(node), None)),
            Clause::Match {
                pattern: Pattern::Path(pattern),
                optional: true,
            },
            Clause::With(with),
            Clause::Return(ReturnClause::item(Expr::var(&count), result.name().to_owned())),
        ];
        Ok(Clause::Call { body })
    }

    fn compile_update(&mut self, op: &UpdateOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let this = Variable::this();
        let labels = entity.resolve_labels(self.ctx)?;

        let mut clauses = vec![Clause::Match {
            pattern: Pattern::Node(NodePattern::new(this.clone(), labels)),
            optional: false,
        }];
        let mut conjuncts = Vec::new();
        let mut pre = Vec::new();
        if let Some(filter) = &op.filter {
            let (predicate, filter_pre) = self.compile_filter(entity, &this, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(entity, AuthOperation::Update, &this, &mut conjuncts)?;
        attach_filter(&mut clauses, pre, conjuncts);

        self.apply_update(entity, &this, &op.update, &mut clauses)?;

        match &op.projection {
            Some((alias, projection)) => {
                let (map, calls) = self.compile_projection(entity, &this, projection)?;
                clauses.extend(calls);
                clauses.push(Clause::Return(ReturnClause::item(
                    Expr::Func {
                        name: "collect",
                        args: vec![map],
                    },
                    alias.clone(),
                )));
            }
            None => {
                clauses.push(Clause::Return(ReturnClause::item(
                    Expr::Func {
                        name: "count",
                        args: vec![Expr::var(&this)],
                    },
                    "nodesUpdated",
                )));
            }
        }
        Ok(clauses)
    }

    /// SET assignments plus relationship cascades for one update input,
    /// ordered so disconnect precedes delete and create precedes connect.
    fn apply_update(
        &mut self,
        entity: &Entity,
        node: &Variable,
        update: &UpdateInput,
        clauses: &mut Vec<Clause>,
    ) -> Result<(), Error> {
        let mut set_items = Vec::new();
        for item in &update.items {
            set_items.push(self.update_set_item(entity, node, item)?);
        }
        for attribute in &entity.attributes {
            let stamped = attribute
                .timestamp
                .as_ref()
                .is_some_and(|ops| ops.contains(&TimestampOp::Update));
            if stamped && !update.items.iter().any(|item| item.field == attribute.name) {
                set_items.push(SetItem {
                    owner: node.clone(),
                    prop: attribute.property.clone(),
                    value: Expr::Func {
                        name: "datetime",
                        args: vec![],
                    },
                });
            }
        }
        if !set_items.is_empty() {
            clauses.push(Clause::Set(set_items));
        }

        for cascade in &update.relationships {
            let relationship =
                entity
                    .relationship(&cascade.field)
                    .ok_or_else(|| TranslateError::UnknownField {
                        type_name: entity.name.clone(),
                        field: cascade.field.clone(),
                    })?;
            let target_entity = self.entity(&relationship.target)?;

            // Dangling-reference order: disconnect, delete, create, connect,
            // connectOrCreate, nested update.
            for step in &cascade.disconnect {
                let body = self.detach_body(node, relationship, target_entity, step.filter.as_ref(), false)?;
                clauses.push(Clause::Call { body });
            }
            for step in &cascade.delete {
                let body = self.detach_body(node, relationship, target_entity, step.filter.as_ref(), true)?;
                clauses.push(Clause::Call { body });
            }
            for step in &cascade.create {
                let target = self.env.variable();
                self.create_node(target_entity, &target, &step.node, clauses)?;
                let rel_var = self.env.variable();
                let pattern = self.rel_path(node, relationship, Some(rel_var.clone()), &target, Vec::new());
                clauses.push(Clause::Create {
                    pattern: Pattern::Path(pattern),
                });
                self.set_edge_props(relationship, &rel_var, &step.edge, clauses)?;
            }
            for step in &cascade.connect {
                let body = self.connect_body(node, relationship, target_entity, step.filter.as_ref(), &step.edge, None)?;
                clauses.push(Clause::Call { body });
            }
            for step in &cascade.connect_or_create {
                let body = self.connect_body(
                    node,
                    relationship,
                    target_entity,
                    step.filter.as_ref(),
                    &step.edge,
                    Some(&step.on_create),
                )?;
                clauses.push(Clause::Call { body });
            }
            for step in &cascade.update {
                let body = self.nested_update_body(node, relationship, target_entity, step)?;
                clauses.push(Clause::Call { body });
            }

            if relationship.required && !relationship.list && !cascade.is_empty() {
                clauses.push(self.cardinality_guard(entity, node, relationship)?);
            }
        }
        Ok(())
    }

    fn update_set_item(
        &mut self,
        entity: &Entity,
        node: &Variable,
        item: &UpdateItem,
    ) -> Result<SetItem, Error> {
        let attribute =
            entity
                .attribute(&item.field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: item.field.clone(),
                })?;
        let prop = attribute.property.clone();
        let current = Expr::prop(node, prop.clone());
        let param = self.env.param(item.value.to_cypher_value());
        let value = match item.op {
            UpdateOperator::Set => Expr::Param(param),
            UpdateOperator::Push => Expr::binary(current, BinaryOp::Add, Expr::Param(param)),
            UpdateOperator::Pop => Expr::Slice {
                target: Box::new(current.clone()),
                from: Box::new(Expr::Int(0)),
                to: Box::new(Expr::binary(
                    Expr::Func {
                        name: "size",
                        args: vec![current],
                    },
                    BinaryOp::Sub,
                    Expr::Param(param),
                )),
            },
            UpdateOperator::Increment => Expr::binary(current, BinaryOp::Add, Expr::Param(param)),
            UpdateOperator::Decrement => Expr::binary(current, BinaryOp::Sub, Expr::Param(param)),
            UpdateOperator::Multiply => Expr::binary(current, BinaryOp::Mul, Expr::Param(param)),
            UpdateOperator::Divide => Expr::binary(current, BinaryOp::Div, Expr::Param(param)),
        };
        Ok(SetItem {
            owner: node.clone(),
            prop,
            value,
        })
    }

    fn compile_delete(&mut self, op: &DeleteOperation) -> Result<Vec<Clause>, Error> {
        let entity = self.entity(&op.entity)?;
        let this = Variable::this();
        let labels = entity.resolve_labels(self.ctx)?;

        let mut clauses = vec![Clause::Match {
            pattern: Pattern::Node(NodePattern::new(this.clone(), labels)),
            optional: false,
        }];
        let mut conjuncts = Vec::new();
        let mut pre = Vec::new();
        if let Some(filter) = &op.filter {
            let (predicate, filter_pre) = self.compile_filter(entity, &this, filter)?;
            conjuncts.push(predicate);
            pre = filter_pre;
        }
        self.guards(entity, AuthOperation::Delete, &this, &mut conjuncts)?;
        attach_filter(&mut clauses, pre, conjuncts);

        // Cascaded deletes run before the parent delete so their patterns
        // still resolve.
        for cascade in &op.cascades {
            let relationship =
                entity
                    .relationship(&cascade.field)
                    .ok_or_else(|| TranslateError::UnknownField {
                        type_name: entity.name.clone(),
                        field: cascade.field.clone(),
                    })?;
            let target_entity = self.entity(&relationship.target)?;
            for step in &cascade.delete {
                let body = self.detach_body(&this, relationship, target_entity, step.filter.as_ref(), true)?;
                clauses.push(Clause::Call { body });
            }
        }

        clauses.push(Clause::Delete {
            vars: vec![this],
            detach: true,
        });
        Ok(clauses)
    }
}

/// Attaches a compiled filter to the clause list: plain `WHERE` directly
/// after a MATCH, or `WITH *` + `WHERE` when aggregate `CALL` blocks had to
/// run first.
fn attach_filter(clauses: &mut Vec<Clause>, pre: Vec<Clause>, conjuncts: Vec<Expr>) {
    if pre.is_empty() {
        if !conjuncts.is_empty() {
            clauses.push(Clause::Where(Expr::and(conjuncts)));
        }
        return;
    }
    clauses.extend(pre);
    let mut with = WithClause::star();
    if !conjuncts.is_empty() {
        with.filter = Some(Expr::and(conjuncts));
    }
    clauses.push(Clause::With(with));
}

/// Prepends the `__resolveType` discriminator to a branch projection.
fn inject_resolve_type(map: Expr, type_name: &str) -> Expr {
    match map {
        Expr::MapProjection { owner, mut items } => {
            items.insert(
                0,
                ProjectionItem::Aliased {
                    alias: "__resolveType".to_owned(),
                    value: Expr::String(type_name.to_owned()),
                },
            );
            Expr::MapProjection { owner, items }
        }
        other => other,
    }
}

/// connectOrCreate merges on equality constraints; anything else in the
/// filter cannot become a MERGE property.
fn collect_merge_props(
    entity: &Entity,
    filter: &Filter,
    env: &mut Environment,
    props: &mut Vec<(String, Expr)>,
) -> Result<(), Error> {
    match filter {
        Filter::And(children) => {
            for child in children {
                collect_merge_props(entity, child, env, props)?;
            }
            Ok(())
        }
        Filter::Property {
            field,
            op: FilterOp::Eq,
            value: FilterValue::Value(value),
        } => {
            let attribute = entity
                .attribute(field)
                .ok_or_else(|| TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: field.clone(),
                })?;
            let param = env.param(value.clone());
            props.push((attribute.property.clone(), Expr::Param(param)));
            Ok(())
        }
        _ => Err(TranslateError::InvalidFilterValue {
            field: entity.name.clone(),
            reason: "connectOrCreate requires equality constraints only",
        }
        .into()),
    }
}

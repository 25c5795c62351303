//! `where` argument parsing into a boolean filter tree.
//!
//! Leaves are `field_<OPERATOR>` comparisons (with an implicit `_EQ` for
//! bare field names), relationship existence quantifiers, and relationship
//! aggregate conditions; `AND`/`OR`/`NOT` combinators form the interior
//! nodes. An `undefined` variable value drops its leaf entirely — an
//! explicit `null` is a real IS NULL constraint.

use crate::ast::arg::ArgValue;
use crate::error::TranslateError;
use crate::schema::{Entity, SchemaModel};
use crate::value::CypherValue;

/// Comparison operators on attribute values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    /// Equality (implicit for bare field names).
    Eq,
    /// Inequality.
    Neq,
    /// Greater-than.
    Gt,
    /// Greater-or-equal.
    Gte,
    /// Less-than.
    Lt,
    /// Less-or-equal.
    Lte,
    /// Membership of the attribute in a list value.
    In,
    /// Substring containment.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Membership of a value in the list attribute.
    Includes,
}

/// Relationship existence quantifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantifier {
    /// Every related node matches (and at least one exists).
    All,
    /// No related node matches.
    None,
    /// Exactly one related node matches.
    Single,
    /// At least one related node matches.
    Some,
}

/// Aggregating function used in relationship aggregate filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggFunc {
    /// Numeric minimum.
    Min,
    /// Numeric maximum.
    Max,
    /// Numeric sum.
    Sum,
    /// Numeric average.
    Avg,
    /// Shortest string by codepoint length.
    Shortest,
    /// Longest string by codepoint length.
    Longest,
}

/// What a relationship aggregate condition measures.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateTarget {
    /// Related-node count.
    Count,
    /// An aggregated attribute of the related nodes.
    Node {
        /// Attribute name on the target entity.
        field: String,
        /// Aggregating function.
        func: AggFunc,
    },
}

/// One comparison inside a relationship aggregate filter.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCondition {
    /// Measured quantity.
    pub target: AggregateTarget,
    /// Comparison operator.
    pub op: FilterOp,
    /// Compared value.
    pub value: CypherValue,
}

/// Value side of a property comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    /// A concrete value, bound as a parameter at compile time.
    Value(CypherValue),
    /// Explicit `null`.
    Null,
}

/// Boolean filter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Conjunction.
    And(Vec<Filter>),
    /// Disjunction.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
    /// Attribute comparison.
    Property {
        /// Attribute name (GraphQL name, not database property).
        field: String,
        /// Operator.
        op: FilterOp,
        /// Compared value.
        value: FilterValue,
    },
    /// Relationship existence test.
    Relationship {
        /// Relationship field name.
        field: String,
        /// Quantifier over related nodes.
        quantifier: Quantifier,
        /// Filter applied to related nodes.
        filter: Option<Box<Filter>>,
    },
    /// Relationship aggregate conditions (ANDed together).
    Aggregate {
        /// Relationship field name.
        field: String,
        /// Conditions on the aggregated values.
        conditions: Vec<AggregateCondition>,
    },
}

const PROPERTY_SUFFIXES: &[(&str, FilterOp)] = &[
    ("_STARTS_WITH", FilterOp::StartsWith),
    ("_ENDS_WITH", FilterOp::EndsWith),
    ("_CONTAINS", FilterOp::Contains),
    ("_INCLUDES", FilterOp::Includes),
    ("_GTE", FilterOp::Gte),
    ("_LTE", FilterOp::Lte),
    ("_NOT", FilterOp::Neq),
    ("_GT", FilterOp::Gt),
    ("_LT", FilterOp::Lt),
    ("_IN", FilterOp::In),
    ("_EQ", FilterOp::Eq),
];

/// Splits a comparison key into its field name and operator, defaulting to
/// equality. Used for both filter leaves and authorization conditions.
pub(crate) fn split_operator(key: &str) -> (&str, FilterOp) {
    for (suffix, op) in PROPERTY_SUFFIXES {
        if let Some(prefix) = key.strip_suffix(suffix) {
            return (prefix, *op);
        }
    }
    (key, FilterOp::Eq)
}

const QUANTIFIER_SUFFIXES: &[(&str, Quantifier)] = &[
    ("_ALL", Quantifier::All),
    ("_NONE", Quantifier::None),
    ("_SINGLE", Quantifier::Single),
    ("_SOME", Quantifier::Some),
];

/// Parses a `where` argument against `entity`.
///
/// Returns `Ok(None)` when every leaf was dropped (undefined variables) or
/// the argument itself was undefined.
pub fn parse_filter(
    schema: &SchemaModel,
    entity: &Entity,
    value: &ArgValue,
) -> Result<Option<Filter>, TranslateError> {
    match value {
        ArgValue::Undefined => Ok(None),
        ArgValue::Object(entries) => {
            let mut children = Vec::new();
            for (key, entry) in entries {
                if let Some(filter) = parse_entry(schema, entity, key, entry)? {
                    children.push(filter);
                }
            }
            if children.len() == 1 {
                Ok(children.pop())
            } else if children.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Filter::And(children)))
            }
        }
        _ => Err(TranslateError::MalformedCombinator {
            combinator: "AND",
            reason: "where must be an object",
        }),
    }
}

fn parse_entry(
    schema: &SchemaModel,
    entity: &Entity,
    key: &str,
    value: &ArgValue,
) -> Result<Option<Filter>, TranslateError> {
    if value.is_undefined() {
        return Ok(None);
    }
    match key {
        "AND" | "OR" => {
            let items = value.as_list().ok_or(TranslateError::MalformedCombinator {
                combinator: if key == "AND" { "AND" } else { "OR" },
                reason: "must hold a list of where objects",
            })?;
            let mut children = Vec::new();
            for item in items {
                if let Some(filter) = parse_filter(schema, entity, item)? {
                    children.push(filter);
                }
            }
            if children.is_empty() {
                return Ok(None);
            }
            return Ok(Some(if key == "AND" {
                Filter::And(children)
            } else {
                Filter::Or(children)
            }));
        }
        "NOT" => {
            let inner = parse_filter(schema, entity, value)?;
            return Ok(inner.map(|filter| Filter::Not(Box::new(filter))));
        }
        _ => {}
    }

    // Exact attribute name: implicit equality.
    if entity.attribute(key).is_some() {
        return property_filter(key, key, FilterOp::Eq, value).map(Some);
    }
    // Exact relationship name: SOME over the nested filter.
    if entity.relationship(key).is_some() {
        return relationship_filter(schema, entity, key, key, Quantifier::Some, value).map(Some);
    }
    // Relationship aggregate: `<rel>Aggregate`.
    if let Some(rel_name) = key.strip_suffix("Aggregate") {
        if entity.relationship(rel_name).is_some() {
            return aggregate_filter(schema, entity, rel_name, value).map(Some);
        }
    }
    // Quantifier suffixes.
    for (suffix, quantifier) in QUANTIFIER_SUFFIXES {
        if let Some(prefix) = key.strip_suffix(suffix) {
            if entity.relationship(prefix).is_some() {
                return relationship_filter(schema, entity, key, prefix, *quantifier, value)
                    .map(Some);
            }
        }
    }
    // Operator suffixes.
    for (suffix, op) in PROPERTY_SUFFIXES {
        if let Some(prefix) = key.strip_suffix(suffix) {
            if entity.attribute(prefix).is_some() {
                return property_filter(key, prefix, *op, value).map(Some);
            }
        }
    }
    Err(TranslateError::UnknownField {
        type_name: entity.name.clone(),
        field: key.to_owned(),
    })
}

fn property_filter(
    key: &str,
    field: &str,
    op: FilterOp,
    value: &ArgValue,
) -> Result<Filter, TranslateError> {
    let filter_value = match value {
        ArgValue::Null => {
            if !matches!(op, FilterOp::Eq | FilterOp::Neq) {
                return Err(TranslateError::InvalidFilterValue {
                    field: key.to_owned(),
                    reason: "null is only valid with equality operators",
                });
            }
            FilterValue::Null
        }
        ArgValue::Undefined => unreachable!("undefined leaves are dropped by the caller"),
        other => FilterValue::Value(other.to_cypher_value()),
    };
    if op == FilterOp::In {
        if let FilterValue::Value(inner) = &filter_value {
            if !matches!(inner, CypherValue::List(_)) {
                return Err(TranslateError::InvalidFilterValue {
                    field: key.to_owned(),
                    reason: "_IN requires a list value",
                });
            }
        }
    }
    Ok(Filter::Property {
        field: field.to_owned(),
        op,
        value: filter_value,
    })
}

fn relationship_filter(
    schema: &SchemaModel,
    entity: &Entity,
    key: &str,
    field: &str,
    quantifier: Quantifier,
    value: &ArgValue,
) -> Result<Filter, TranslateError> {
    let relationship = entity
        .relationship(field)
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: field.to_owned(),
        })?;
    let target = schema
        .entity(&relationship.target)
        .ok_or(TranslateError::InvalidFilterValue {
            field: key.to_owned(),
            reason: "relationship filters are only supported on concrete targets",
        })?;
    let filter = match value {
        ArgValue::Null => None,
        other => parse_filter(schema, target, other)?,
    };
    Ok(Filter::Relationship {
        field: field.to_owned(),
        quantifier,
        filter: filter.map(Box::new),
    })
}

const AGG_FUNCS: &[(&str, AggFunc)] = &[
    ("_SHORTEST", AggFunc::Shortest),
    ("_LONGEST", AggFunc::Longest),
    ("_MIN", AggFunc::Min),
    ("_MAX", AggFunc::Max),
    ("_SUM", AggFunc::Sum),
    ("_AVG", AggFunc::Avg),
];

const AGG_OPS: &[(&str, FilterOp)] = &[
    ("_GTE", FilterOp::Gte),
    ("_LTE", FilterOp::Lte),
    ("_GT", FilterOp::Gt),
    ("_LT", FilterOp::Lt),
    ("_EQ", FilterOp::Eq),
];

fn aggregate_filter(
    schema: &SchemaModel,
    entity: &Entity,
    rel_name: &str,
    value: &ArgValue,
) -> Result<Filter, TranslateError> {
    let relationship = entity
        .relationship(rel_name)
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: rel_name.to_owned(),
        })?;
    let target = schema
        .entity(&relationship.target)
        .ok_or(TranslateError::InvalidFilterValue {
            field: rel_name.to_owned(),
            reason: "aggregate filters are only supported on concrete targets",
        })?;
    let entries = value
        .as_object()
        .ok_or(TranslateError::InvalidFilterValue {
            field: rel_name.to_owned(),
            reason: "aggregate filter must be an object",
        })?;

    let mut conditions = Vec::new();
    for (key, entry) in entries {
        if entry.is_undefined() {
            continue;
        }
        if key == "count" {
            conditions.push(AggregateCondition {
                target: AggregateTarget::Count,
                op: FilterOp::Eq,
                value: entry.to_cypher_value(),
            });
            continue;
        }
        if let Some(op_suffix) = key.strip_prefix("count_") {
            let op = AGG_OPS
                .iter()
                .find(|(suffix, _)| &suffix[1..] == op_suffix)
                .map(|(_, op)| *op)
                .ok_or(TranslateError::InvalidFilterValue {
                    field: key.clone(),
                    reason: "unknown count operator",
                })?;
            conditions.push(AggregateCondition {
                target: AggregateTarget::Count,
                op,
                value: entry.to_cypher_value(),
            });
            continue;
        }
        if key == "node" {
            let node_entries = entry.as_object().ok_or(TranslateError::InvalidFilterValue {
                field: key.clone(),
                reason: "node aggregate filter must be an object",
            })?;
            for (node_key, node_value) in node_entries {
                if node_value.is_undefined() {
                    continue;
                }
                conditions.push(parse_node_aggregate(target, node_key, node_value)?);
            }
            continue;
        }
        return Err(TranslateError::InvalidFilterValue {
            field: key.clone(),
            reason: "unknown aggregate filter key",
        });
    }
    Ok(Filter::Aggregate {
        field: rel_name.to_owned(),
        conditions,
    })
}

fn parse_node_aggregate(
    target: &Entity,
    key: &str,
    value: &ArgValue,
) -> Result<AggregateCondition, TranslateError> {
    // Keys look like `age_AVG_GTE`: attribute, function, then operator.
    for (op_suffix, op) in AGG_OPS {
        if let Some(prefix) = key.strip_suffix(op_suffix) {
            for (func_suffix, func) in AGG_FUNCS {
                if let Some(field) = prefix.strip_suffix(func_suffix) {
                    if target.attribute(field).is_none() {
                        return Err(TranslateError::UnknownField {
                            type_name: target.name.clone(),
                            field: field.to_owned(),
                        });
                    }
                    return Ok(AggregateCondition {
                        target: AggregateTarget::Node {
                            field: field.to_owned(),
                            func: *func,
                        },
                        op: *op,
                        value: value.to_cypher_value(),
                    });
                }
            }
        }
    }
    Err(TranslateError::InvalidFilterValue {
        field: key.to_owned(),
        reason: "node aggregate keys use the form `<field>_<FUNC>_<OP>`",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn movie_schema() -> SchemaModel {
        schema::build(
            r#"
            type Movie @node {
                title: String!
                year: Int
                actors: [Person!]! @relationship(type: "ACTED_IN", direction: IN)
            }
            type Person @node {
                name: String!
                age: Int
            }
            "#,
        )
        .expect("valid schema")
    }

    fn object(entries: Vec<(&str, ArgValue)>) -> ArgValue {
        ArgValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        )
    }

    #[test]
    fn bare_field_is_implicit_equality() {
        let model = movie_schema();
        let entity = model.entity("Movie").unwrap();
        let filter = parse_filter(
            &model,
            entity,
            &object(vec![("title", ArgValue::Scalar("dune".into()))]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            Filter::Property {
                field: "title".into(),
                op: FilterOp::Eq,
                value: FilterValue::Value("dune".into()),
            }
        );
    }

    #[test]
    fn undefined_leaf_is_dropped_but_null_is_kept() {
        let model = movie_schema();
        let entity = model.entity("Movie").unwrap();
        let dropped = parse_filter(
            &model,
            entity,
            &object(vec![("title_EQ", ArgValue::Undefined)]),
        )
        .unwrap();
        assert_eq!(dropped, None);

        let kept = parse_filter(&model, entity, &object(vec![("title_EQ", ArgValue::Null)]))
            .unwrap()
            .unwrap();
        assert_eq!(
            kept,
            Filter::Property {
                field: "title".into(),
                op: FilterOp::Eq,
                value: FilterValue::Null,
            }
        );
    }

    #[test]
    fn combinators_nest() {
        let model = movie_schema();
        let entity = model.entity("Movie").unwrap();
        let filter = parse_filter(
            &model,
            entity,
            &object(vec![(
                "OR",
                ArgValue::List(vec![
                    object(vec![("year_GT", ArgValue::Scalar(CypherValue::Int(2000)))]),
                    object(vec![("title_STARTS_WITH", ArgValue::Scalar("D".into()))]),
                ]),
            )]),
        )
        .unwrap()
        .unwrap();
        let Filter::Or(children) = filter else {
            panic!("expected OR");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn quantifier_suffix_parses_nested_filter() {
        let model = movie_schema();
        let entity = model.entity("Movie").unwrap();
        let filter = parse_filter(
            &model,
            entity,
            &object(vec![(
                "actors_ALL",
                object(vec![("age_GTE", ArgValue::Scalar(CypherValue::Int(18)))]),
            )]),
        )
        .unwrap()
        .unwrap();
        let Filter::Relationship {
            field,
            quantifier,
            filter,
        } = filter
        else {
            panic!("expected relationship filter");
        };
        assert_eq!(field, "actors");
        assert_eq!(quantifier, Quantifier::All);
        assert!(filter.is_some());
    }

    #[test]
    fn aggregate_filter_parses_count_and_node_keys() {
        let model = movie_schema();
        let entity = model.entity("Movie").unwrap();
        let filter = parse_filter(
            &model,
            entity,
            &object(vec![(
                "actorsAggregate",
                object(vec![
                    ("count_GT", ArgValue::Scalar(CypherValue::Int(2))),
                    (
                        "node",
                        object(vec![("age_AVG_GTE", ArgValue::Scalar(CypherValue::Int(30)))]),
                    ),
                ]),
            )]),
        )
        .unwrap()
        .unwrap();
        let Filter::Aggregate { field, conditions } = filter else {
            panic!("expected aggregate filter");
        };
        assert_eq!(field, "actors");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].target, AggregateTarget::Count);
        assert_eq!(
            conditions[1].target,
            AggregateTarget::Node {
                field: "age".into(),
                func: AggFunc::Avg,
            }
        );
    }

    #[test]
    fn unknown_filter_key_is_an_error() {
        let model = movie_schema();
        let entity = model.entity("Movie").unwrap();
        let err = parse_filter(
            &model,
            entity,
            &object(vec![("rating_GT", ArgValue::Scalar(CypherValue::Int(5)))]),
        )
        .unwrap_err();
        assert_eq!(err.code(), "UnknownField");
    }
}

//! Selection-set parsing into a typed projection tree.
//!
//! Nested relationship fields carry their own filter, ordering, and
//! pagination; interface- and union-typed relationships fan out into
//! per-member branches taken from inline fragments.

use graphql_parser::query::{Field, Selection, SelectionSet};
use rustc_hash::FxHashMap;

use crate::ast::arg::ArgValue;
use crate::ast::filter::{parse_filter, Filter};
use crate::ast::pagination::Pagination;
use crate::ast::sort::{parse_sort, SortItem};
use crate::error::TranslateError;
use crate::schema::{CompositeKind, Entity, SchemaModel};

/// Named fragments of the document, looked up by fragment spreads. Bodies
/// borrow from an owned (`'static`-text) document.
pub type Fragments<'a> = FxHashMap<String, &'a SelectionSet<'static, String>>;

/// A parsed selection set.
#[derive(Clone, Debug, Default)]
pub struct Projection {
    /// Output fields in document order.
    pub fields: Vec<ProjectionField>,
}

impl Projection {
    /// True when nothing was selected (mutations may omit a payload).
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One output field of a projection.
#[derive(Clone, Debug)]
pub enum ProjectionField {
    /// Stored attribute, read straight off the node.
    Property {
        /// Output key.
        alias: String,
        /// Attribute name.
        field: String,
    },
    /// Attribute backed by a `@cypher` statement.
    Cypher {
        /// Output key.
        alias: String,
        /// Attribute name.
        field: String,
    },
    /// Relationship to a concrete entity.
    Relationship {
        /// Output key.
        alias: String,
        /// Nested read.
        selection: RelationshipSelection,
    },
    /// Relationship to an interface or union.
    Composite {
        /// Output key.
        alias: String,
        /// Per-member branches.
        selection: CompositeSelection,
    },
    /// `__typename` discriminator.
    Typename {
        /// Output key.
        alias: String,
        /// The concrete type name to emit.
        type_name: String,
    },
}

/// Nested read of a concrete relationship target.
#[derive(Clone, Debug)]
pub struct RelationshipSelection {
    /// Relationship field name on the parent entity.
    pub field: String,
    /// Target entity name.
    pub target: String,
    /// `where` filter on the related nodes.
    pub filter: Option<Filter>,
    /// Ordering keys.
    pub sort: Vec<SortItem>,
    /// SKIP/LIMIT bounds.
    pub pagination: Pagination,
    /// Projection applied to each related node.
    pub projection: Projection,
}

/// Nested read of an interface- or union-typed relationship.
#[derive(Clone, Debug)]
pub struct CompositeSelection {
    /// Relationship field name on the parent entity.
    pub field: String,
    /// Whether the target is an interface or a union.
    pub kind: CompositeKind,
    /// One branch per selected concrete member.
    pub branches: Vec<CompositeBranch>,
}

/// One concrete member of a composite selection.
#[derive(Clone, Debug)]
pub struct CompositeBranch {
    /// Concrete entity name.
    pub target: String,
    /// Member-specific filter, from `where: { <Member>: … }`.
    pub filter: Option<Filter>,
    /// Projection applied to nodes of this member.
    pub projection: Projection,
}

/// Filter/sort/pagination arguments of a read field.
#[derive(Clone, Debug, Default)]
pub struct ReadArguments {
    /// Resolved `where` argument, if present.
    pub filter_arg: ArgValue,
    /// Ordering keys.
    pub sort: Vec<SortItem>,
    /// SKIP/LIMIT bounds.
    pub pagination: Pagination,
}

/// Resolves the read arguments of `field`, rejecting documents that mix the
/// deprecated `options` argument with direct sort/pagination arguments.
pub fn read_arguments(
    entity: &Entity,
    field: &Field<'_, String>,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> Result<ReadArguments, TranslateError> {
    let mut filter_arg = ArgValue::Undefined;
    let mut options = ArgValue::Undefined;
    let mut sort_arg = ArgValue::Undefined;
    let mut limit = None;
    let mut offset = None;
    let mut direct = false;

    for (name, value) in &field.arguments {
        let resolved = ArgValue::resolve(value, variables);
        if resolved.is_undefined() {
            continue;
        }
        match name.as_str() {
            "where" => filter_arg = resolved,
            "options" => options = resolved,
            "sort" => {
                direct = true;
                sort_arg = resolved;
            }
            "limit" => {
                direct = true;
                limit = resolved.as_int();
            }
            "offset" => {
                direct = true;
                offset = resolved.as_int();
            }
            _ => {}
        }
    }

    if !options.is_undefined() && direct {
        return Err(TranslateError::AmbiguousPagination {
            field: field.name.clone(),
        });
    }

    let (sort, pagination) = if options.is_undefined() {
        (parse_sort(entity, &sort_arg)?, Pagination { limit, offset })
    } else {
        let mut nested_sort = ArgValue::Undefined;
        if let Some(entries) = options.as_object() {
            for (key, value) in entries {
                if key == "sort" {
                    nested_sort = value.clone();
                }
            }
        }
        (
            parse_sort(entity, &nested_sort)?,
            Pagination::from_options(&options),
        )
    };

    Ok(ReadArguments {
        filter_arg,
        sort,
        pagination,
    })
}

/// Parses the selection set of a read against `entity`.
pub fn parse_projection(
    schema: &SchemaModel,
    entity: &Entity,
    selection_set: &SelectionSet<'_, String>,
    fragments: &Fragments<'_>,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> Result<Projection, TranslateError> {
    let mut projection = Projection::default();
    collect_fields(
        schema,
        entity,
        selection_set,
        fragments,
        variables,
        &mut projection,
    )?;
    Ok(projection)
}

fn collect_fields(
    schema: &SchemaModel,
    entity: &Entity,
    selection_set: &SelectionSet<'_, String>,
    fragments: &Fragments<'_>,
    variables: &serde_json::Map<String, serde_json::Value>,
    out: &mut Projection,
) -> Result<(), TranslateError> {
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                out.fields
                    .push(parse_field(schema, entity, field, fragments, variables)?);
            }
            Selection::InlineFragment(fragment) => {
                let applies = fragment
                    .type_condition
                    .as_ref()
                    .map(|graphql_parser::query::TypeCondition::On(name)| name == &entity.name)
                    .unwrap_or(true);
                if applies {
                    collect_fields(
                        schema,
                        entity,
                        &fragment.selection_set,
                        fragments,
                        variables,
                        out,
                    )?;
                }
            }
            Selection::FragmentSpread(spread) => {
                let set = fragments.get(&spread.fragment_name).ok_or_else(|| {
                    TranslateError::UnknownField {
                        type_name: entity.name.clone(),
                        field: spread.fragment_name.clone(),
                    }
                })?;
                collect_fields(schema, entity, set, fragments, variables, out)?;
            }
        }
    }
    Ok(())
}

fn parse_field(
    schema: &SchemaModel,
    entity: &Entity,
    field: &Field<'_, String>,
    fragments: &Fragments<'_>,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> Result<ProjectionField, TranslateError> {
    let alias = field.alias.clone().unwrap_or_else(|| field.name.clone());

    if field.name == "__typename" {
        return Ok(ProjectionField::Typename {
            alias,
            type_name: entity.name.clone(),
        });
    }

    if let Some(attribute) = entity.attribute(&field.name) {
        if attribute.cypher.is_some() {
            return Ok(ProjectionField::Cypher {
                alias,
                field: field.name.clone(),
            });
        }
        return Ok(ProjectionField::Property {
            alias,
            field: field.name.clone(),
        });
    }

    let relationship =
        entity
            .relationship(&field.name)
            .ok_or_else(|| TranslateError::UnknownField {
                type_name: entity.name.clone(),
                field: field.name.clone(),
            })?;

    if let Some(target) = schema.entity(&relationship.target) {
        let args = read_arguments(target, field, variables)?;
        let filter = parse_filter(schema, target, &args.filter_arg)?;
        let projection =
            parse_projection(schema, target, &field.selection_set, fragments, variables)?;
        return Ok(ProjectionField::Relationship {
            alias,
            selection: RelationshipSelection {
                field: field.name.clone(),
                target: relationship.target.clone(),
                filter,
                sort: args.sort,
                pagination: args.pagination,
                projection,
            },
        });
    }

    let composite =
        schema
            .composite(&relationship.target)
            .ok_or_else(|| TranslateError::UnknownField {
                type_name: entity.name.clone(),
                field: field.name.clone(),
            })?;

    // Member filters come from `where: { <Member>: … }`.
    let mut member_filters: FxHashMap<&str, &ArgValue> = FxHashMap::default();
    let mut filter_arg = ArgValue::Undefined;
    for (name, value) in &field.arguments {
        if name == "where" {
            filter_arg = ArgValue::resolve(value, variables);
        }
    }
    if let Some(entries) = filter_arg.as_object() {
        for (member, value) in entries {
            member_filters.insert(member.as_str(), value);
        }
    }

    // Interface members inherit the top-level (non-fragment) selections.
    let mut shared = SelectionSet {
        span: field.selection_set.span,
        items: Vec::new(),
    };
    let mut typed: Vec<(&String, &SelectionSet<'_, String>)> = Vec::new();
    for selection in &field.selection_set.items {
        match selection {
            Selection::InlineFragment(fragment) => match &fragment.type_condition {
                Some(graphql_parser::query::TypeCondition::On(name)) => {
                    typed.push((name, &fragment.selection_set));
                }
                None => shared.items.extend(fragment.selection_set.items.iter().cloned()),
            },
            other => shared.items.push(other.clone()),
        }
    }

    let mut branches = Vec::new();
    for member in &composite.members {
        let member_entity = schema
            .entity(member)
            .ok_or_else(|| TranslateError::UnknownField {
                type_name: composite.name.clone(),
                field: member.clone(),
            })?;
        let typed_set = typed
            .iter()
            .find(|(name, _)| *name == member)
            .map(|(_, set)| *set);
        // Union members must be selected explicitly; interface members
        // always participate through the shared fields.
        if typed_set.is_none()
            && (composite.kind == CompositeKind::Union || shared.items.is_empty())
        {
            continue;
        }
        let mut projection = parse_projection(
            schema,
            member_entity,
            &shared,
            fragments,
            variables,
        )?;
        if let Some(set) = typed_set {
            let extra = parse_projection(schema, member_entity, set, fragments, variables)?;
            projection.fields.extend(extra.fields);
        }
        let filter = match member_filters.get(member.as_str()) {
            Some(value) => parse_filter(schema, member_entity, value)?,
            None => None,
        };
        branches.push(CompositeBranch {
            target: member.clone(),
            filter,
            projection,
        });
    }

    Ok(ProjectionField::Composite {
        alias,
        selection: CompositeSelection {
            field: field.name.clone(),
            kind: composite.kind,
            branches,
        },
    })
}

//! Mutation input parsing: create inputs, update operator maps, and the
//! nested relationship cascades hung off them.
//!
//! Cascade steps are validated against the relationship's nested-operations
//! whitelist here; ordering (disconnect before delete, connect before nested
//! update) is the compiler's job.

use crate::ast::arg::ArgValue;
use crate::ast::filter::{parse_filter, Filter};
use crate::error::TranslateError;
use crate::schema::{Attribute, Entity, NestedOperation, SchemaModel};

/// Update operators extracted from `field_<OP>` keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOperator {
    /// Replace the property.
    Set,
    /// Append to a list property.
    Push,
    /// Remove from the tail of a list property.
    Pop,
    /// Add to a numeric property.
    Increment,
    /// Subtract from a numeric property.
    Decrement,
    /// Multiply a numeric property.
    Multiply,
    /// Divide a numeric property.
    Divide,
}

const UPDATE_SUFFIXES: &[(&str, UpdateOperator)] = &[
    ("_INCREMENT", UpdateOperator::Increment),
    ("_DECREMENT", UpdateOperator::Decrement),
    ("_MULTIPLY", UpdateOperator::Multiply),
    ("_DIVIDE", UpdateOperator::Divide),
    ("_PUSH", UpdateOperator::Push),
    ("_POP", UpdateOperator::Pop),
    ("_SET", UpdateOperator::Set),
];

/// Splits an update key into its field name and operator.
///
/// Unrecognized trailing tokens are not an error: the whole key is treated
/// as a literal field name with an implicit `_SET`, matching the filter
/// grammar's leniency. `title_SOMETHING` is a field named `title_SOMETHING`.
pub fn parse_update_key<'k>(entity: &Entity, key: &'k str) -> (&'k str, UpdateOperator) {
    for (suffix, op) in UPDATE_SUFFIXES {
        if let Some(field) = key.strip_suffix(suffix) {
            if entity.attribute(field).is_some() {
                return (field, *op);
            }
        }
    }
    if entity.attribute(key).is_none() {
        tracing::warn!(key, entity = %entity.name, "update key matched no attribute or operator suffix");
    }
    (key, UpdateOperator::Set)
}

/// One attribute assignment in a create input.
#[derive(Clone, Debug)]
pub struct CreateItem {
    /// Attribute name.
    pub field: String,
    /// Supplied value.
    pub value: ArgValue,
}

/// One attribute operation in an update input.
#[derive(Clone, Debug)]
pub struct UpdateItem {
    /// Attribute name.
    pub field: String,
    /// Operator from the key suffix.
    pub op: UpdateOperator,
    /// Supplied value.
    pub value: ArgValue,
}

/// Parsed `create` input for one node.
#[derive(Clone, Debug, Default)]
pub struct CreateInput {
    /// Attribute assignments in input order.
    pub items: Vec<CreateItem>,
    /// Relationship cascades in input order.
    pub relationships: Vec<RelationshipInput>,
}

/// Parsed `update` input for one node.
#[derive(Clone, Debug, Default)]
pub struct UpdateInput {
    /// Attribute operations in input order.
    pub items: Vec<UpdateItem>,
    /// Relationship cascades in input order.
    pub relationships: Vec<RelationshipInput>,
}

/// All cascade steps supplied for one relationship field.
#[derive(Clone, Debug, Default)]
pub struct RelationshipInput {
    /// Relationship field name.
    pub field: String,
    /// `create: [{ node, edge }]` steps.
    pub create: Vec<NestedCreate>,
    /// `connect: [{ where, edge }]` steps.
    pub connect: Vec<ConnectInput>,
    /// `connectOrCreate: [{ where, onCreate, edge }]` steps.
    pub connect_or_create: Vec<ConnectOrCreateInput>,
    /// `update: [{ where, update }]` steps.
    pub update: Vec<NestedUpdate>,
    /// `disconnect: [{ where }]` steps.
    pub disconnect: Vec<NestedWhere>,
    /// `delete: [{ where }]` steps.
    pub delete: Vec<NestedWhere>,
}

impl RelationshipInput {
    /// True when no cascade step was supplied.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.connect.is_empty()
            && self.connect_or_create.is_empty()
            && self.update.is_empty()
            && self.disconnect.is_empty()
            && self.delete.is_empty()
    }
}

/// A nested node creation plus its edge properties.
#[derive(Clone, Debug)]
pub struct NestedCreate {
    /// Input for the new target node.
    pub node: CreateInput,
    /// Edge property assignments.
    pub edge: Vec<CreateItem>,
}

/// Connect an existing node matched by filter.
#[derive(Clone, Debug)]
pub struct ConnectInput {
    /// Filter over candidate target nodes.
    pub filter: Option<Filter>,
    /// Edge property assignments.
    pub edge: Vec<CreateItem>,
}

/// Merge-by-filter, creating the node when absent.
#[derive(Clone, Debug)]
pub struct ConnectOrCreateInput {
    /// Filter identifying the target node.
    pub filter: Option<Filter>,
    /// Input applied when the node has to be created.
    pub on_create: CreateInput,
    /// Edge property assignments.
    pub edge: Vec<CreateItem>,
}

/// Update of already-related nodes matched by filter.
#[derive(Clone, Debug)]
pub struct NestedUpdate {
    /// Filter over the related nodes.
    pub filter: Option<Filter>,
    /// Update applied to each match.
    pub update: UpdateInput,
}

/// A filter-only cascade step (disconnect/delete).
#[derive(Clone, Debug)]
pub struct NestedWhere {
    /// Filter over the related nodes.
    pub filter: Option<Filter>,
}

/// Parses one element of a `create` mutation's input list.
pub fn parse_create_input(
    schema: &SchemaModel,
    entity: &Entity,
    value: &ArgValue,
) -> Result<CreateInput, TranslateError> {
    let entries = value
        .as_object()
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: "<create input>".to_owned(),
        })?;
    let mut input = CreateInput::default();
    for (key, entry) in entries {
        if entry.is_undefined() {
            continue;
        }
        if let Some(attribute) = entity.attribute(key) {
            check_settable(entity, attribute, "create")?;
            if entry.is_null() && attribute.required {
                return Err(TranslateError::NonNullableNull {
                    type_name: entity.name.clone(),
                    field: key.clone(),
                });
            }
            input.items.push(CreateItem {
                field: key.clone(),
                value: entry.clone(),
            });
            continue;
        }
        if entity.relationship(key).is_some() {
            let cascade = parse_relationship_input(schema, entity, key, entry)?;
            if !cascade.is_empty() {
                input.relationships.push(cascade);
            }
            continue;
        }
        return Err(TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: key.clone(),
        });
    }
    Ok(input)
}

/// Parses an `update` mutation's input object.
pub fn parse_update_input(
    schema: &SchemaModel,
    entity: &Entity,
    value: &ArgValue,
) -> Result<UpdateInput, TranslateError> {
    let entries = value
        .as_object()
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: "<update input>".to_owned(),
        })?;
    let mut input = UpdateInput::default();
    for (key, entry) in entries {
        if entry.is_undefined() {
            continue;
        }
        if entity.relationship(key).is_some() {
            let cascade = parse_relationship_input(schema, entity, key, entry)?;
            if !cascade.is_empty() {
                input.relationships.push(cascade);
            }
            continue;
        }
        let (field, op) = parse_update_key(entity, key);
        let attribute = entity
            .attribute(field)
            .ok_or_else(|| TranslateError::UnknownField {
                type_name: entity.name.clone(),
                field: field.to_owned(),
            })?;
        check_settable(entity, attribute, "update")?;
        if entry.is_null() && attribute.required {
            return Err(TranslateError::NonNullableNull {
                type_name: entity.name.clone(),
                field: field.to_owned(),
            });
        }
        input.items.push(UpdateItem {
            field: field.to_owned(),
            op,
            value: entry.clone(),
        });
    }
    Ok(input)
}

fn check_settable(
    entity: &Entity,
    attribute: &Attribute,
    phase: &'static str,
) -> Result<(), TranslateError> {
    let blocked = !attribute.is_stored()
        || match phase {
            "create" => !attribute.settable.on_create,
            _ => !attribute.settable.on_update,
        };
    if blocked {
        return Err(TranslateError::NotSettable {
            type_name: entity.name.clone(),
            field: attribute.name.clone(),
            phase,
        });
    }
    Ok(())
}

fn parse_relationship_input(
    schema: &SchemaModel,
    entity: &Entity,
    field: &str,
    value: &ArgValue,
) -> Result<RelationshipInput, TranslateError> {
    let relationship = entity
        .relationship(field)
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: field.to_owned(),
        })?;
    let target = schema
        .entity(&relationship.target)
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: field.to_owned(),
        })?;
    let edge_entity = relationship
        .properties
        .as_deref()
        .and_then(|name| schema.relationship_properties(name));

    let entries = value
        .as_object()
        .ok_or_else(|| TranslateError::UnknownField {
            type_name: entity.name.clone(),
            field: field.to_owned(),
        })?;

    let mut input = RelationshipInput {
        field: field.to_owned(),
        ..RelationshipInput::default()
    };

    let require = |op: NestedOperation, name: &'static str| -> Result<(), TranslateError> {
        if relationship.allows(op) {
            Ok(())
        } else {
            Err(TranslateError::NestedOperationNotAllowed {
                type_name: entity.name.clone(),
                field: field.to_owned(),
                operation: name,
            })
        }
    };

    for (key, entry) in entries {
        if entry.is_undefined() {
            continue;
        }
        match key.as_str() {
            "create" => {
                require(NestedOperation::Create, "create")?;
                for element in as_step_list(entry) {
                    let mut node = ArgValue::Undefined;
                    let mut edge = ArgValue::Undefined;
                    if let Some(fields) = element.as_object() {
                        for (k, v) in fields {
                            match k.as_str() {
                                "node" => node = v.clone(),
                                "edge" => edge = v.clone(),
                                _ => {}
                            }
                        }
                    }
                    // A bare object is shorthand for `{ node: … }`.
                    if node.is_undefined() {
                        node = element.clone();
                    }
                    input.create.push(NestedCreate {
                        node: parse_create_input(schema, target, &node)?,
                        edge: parse_edge_items(edge_entity, &edge)?,
                    });
                }
            }
            "connect" => {
                require(NestedOperation::Connect, "connect")?;
                for element in as_step_list(entry) {
                    let (filter, edge) = parse_where_step(schema, target, element)?;
                    input.connect.push(ConnectInput {
                        filter,
                        edge: parse_edge_items(edge_entity, &edge)?,
                    });
                }
            }
            "connectOrCreate" => {
                require(NestedOperation::ConnectOrCreate, "connectOrCreate")?;
                for element in as_step_list(entry) {
                    let (filter, edge) = parse_where_step(schema, target, element)?;
                    let mut on_create = ArgValue::Undefined;
                    if let Some(fields) = element.as_object() {
                        for (k, v) in fields {
                            if k == "onCreate" {
                                on_create = v.clone();
                            }
                        }
                    }
                    let on_create = if on_create.is_undefined() {
                        CreateInput::default()
                    } else {
                        parse_create_input(schema, target, &on_create)?
                    };
                    input.connect_or_create.push(ConnectOrCreateInput {
                        filter,
                        on_create,
                        edge: parse_edge_items(edge_entity, &edge)?,
                    });
                }
            }
            "update" => {
                require(NestedOperation::Update, "update")?;
                for element in as_step_list(entry) {
                    let mut where_arg = ArgValue::Undefined;
                    let mut update_arg = ArgValue::Undefined;
                    if let Some(fields) = element.as_object() {
                        for (k, v) in fields {
                            match k.as_str() {
                                "where" => where_arg = v.clone(),
                                "update" | "node" => update_arg = v.clone(),
                                _ => {}
                            }
                        }
                    }
                    input.update.push(NestedUpdate {
                        filter: parse_step_filter(schema, target, &where_arg)?,
                        update: parse_update_input(schema, target, &update_arg)?,
                    });
                }
            }
            "disconnect" => {
                require(NestedOperation::Disconnect, "disconnect")?;
                for element in as_step_list(entry) {
                    let (filter, _) = parse_where_step(schema, target, element)?;
                    input.disconnect.push(NestedWhere { filter });
                }
            }
            "delete" => {
                require(NestedOperation::Delete, "delete")?;
                for element in as_step_list(entry) {
                    let (filter, _) = parse_where_step(schema, target, element)?;
                    input.delete.push(NestedWhere { filter });
                }
            }
            _ => {
                return Err(TranslateError::UnknownField {
                    type_name: entity.name.clone(),
                    field: key.clone(),
                });
            }
        }
    }
    Ok(input)
}

// Cascade steps accept both a single object and a list of objects.
fn as_step_list(value: &ArgValue) -> std::slice::Iter<'_, ArgValue> {
    match value {
        ArgValue::List(items) => items.iter(),
        other => std::slice::from_ref(other).iter(),
    }
}

// Extracts `where` (unwrapping the `{ node: … }` envelope) and `edge` from a
// connect-style step.
fn parse_where_step(
    schema: &SchemaModel,
    target: &Entity,
    element: &ArgValue,
) -> Result<(Option<Filter>, ArgValue), TranslateError> {
    let mut where_arg = ArgValue::Undefined;
    let mut edge = ArgValue::Undefined;
    if let Some(fields) = element.as_object() {
        for (k, v) in fields {
            match k.as_str() {
                "where" => where_arg = v.clone(),
                "edge" => edge = v.clone(),
                _ => {}
            }
        }
    }
    Ok((parse_step_filter(schema, target, &where_arg)?, edge))
}

pub(crate) fn parse_step_filter(
    schema: &SchemaModel,
    target: &Entity,
    where_arg: &ArgValue,
) -> Result<Option<Filter>, TranslateError> {
    if where_arg.is_undefined() || where_arg.is_null() {
        return Ok(None);
    }
    // `where: { node: … }` and a bare filter object are both accepted.
    let filter_value = where_arg
        .as_object()
        .and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k == "node")
                .map(|(_, v)| v)
        })
        .unwrap_or(where_arg);
    parse_filter(schema, target, filter_value)
}

fn parse_edge_items(
    edge_entity: Option<&crate::schema::RelationshipProperties>,
    edge: &ArgValue,
) -> Result<Vec<CreateItem>, TranslateError> {
    if edge.is_undefined() || edge.is_null() {
        return Ok(Vec::new());
    }
    let Some(edge_entity) = edge_entity else {
        return Ok(Vec::new());
    };
    let Some(entries) = edge.as_object() else {
        return Ok(Vec::new());
    };
    let mut items = Vec::new();
    for (key, value) in entries {
        if value.is_undefined() {
            continue;
        }
        if edge_entity.attributes.iter().all(|attr| &attr.name != key) {
            return Err(TranslateError::UnknownField {
                type_name: edge_entity.name.clone(),
                field: key.clone(),
            });
        }
        items.push(CreateItem {
            field: key.clone(),
            value: value.clone(),
        });
    }
    Ok(items)
}

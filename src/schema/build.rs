//! Schema model builder: SDL document → immutable [`SchemaModel`].
//!
//! The builder collects every structural problem it can find instead of
//! stopping at the first, and never returns a partial model.

use graphql_parser::parse_schema;
use graphql_parser::schema::{Definition, Directive, Field, Type, TypeDefinition};
use tracing::debug;

use super::directive::{
    self, LabelSpec, MutationOp, QueryAnnotation, SettableAnnotation,
};
use super::model::{
    Attribute, CompositeEntity, CompositeKind, Entity, OperationBinding, OperationKind,
    Relationship, RelationshipProperties, SchemaModel,
};
use super::naming::{self, NameRegistry};
use crate::error::{Error, SchemaError, SchemaErrors};

type SdlField<'a> = Field<'a, String>;
type SdlDirective<'a> = Directive<'a, String>;

/// Builds the executable schema model from an SDL document.
///
/// Fails with [`SchemaErrors`] enumerating every structural problem found;
/// on success the returned model is immutable and safe to share across
/// concurrent requests.
pub fn build(type_defs: &str) -> Result<SchemaModel, Error> {
    let document =
        parse_schema::<String>(type_defs).map_err(|err| Error::Parse(err.to_string()))?;

    let mut errors: Vec<SchemaError> = Vec::new();
    let mut model = SchemaModel::default();
    let mut query_toggles: Vec<(String, QueryAnnotation)> = Vec::new();
    let mut mutation_toggles: Vec<(String, Vec<MutationOp>)> = Vec::new();

    // First pass: build descriptors with targets held by name only.
    for definition in &document.definitions {
        let Definition::TypeDefinition(type_def) = definition else {
            continue;
        };
        match type_def {
            TypeDefinition::Object(object) => {
                if has_directive(&object.directives, "relationshipProperties") {
                    let attributes =
                        build_attributes(&object.name, &object.fields, true, &mut errors);
                    model.rel_properties.insert(
                        object.name.clone(),
                        RelationshipProperties {
                            name: object.name.clone(),
                            attributes,
                        },
                    );
                    continue;
                }
                let entity = build_entity(
                    &object.name,
                    &object.directives,
                    &object.fields,
                    &mut query_toggles,
                    &mut mutation_toggles,
                    &mut errors,
                );
                model.entities.insert(object.name.clone(), entity);
            }
            TypeDefinition::Interface(interface) => {
                model.composites.insert(
                    interface.name.clone(),
                    CompositeEntity {
                        name: interface.name.clone(),
                        kind: CompositeKind::Interface,
                        members: Vec::new(),
                        shared_fields: interface
                            .fields
                            .iter()
                            .map(|field| field.name.clone())
                            .collect(),
                    },
                );
            }
            TypeDefinition::Union(union_type) => {
                model.composites.insert(
                    union_type.name.clone(),
                    CompositeEntity {
                        name: union_type.name.clone(),
                        kind: CompositeKind::Union,
                        members: union_type.types.clone(),
                        shared_fields: Vec::new(),
                    },
                );
            }
            TypeDefinition::Scalar(_) | TypeDefinition::Enum(_) | TypeDefinition::InputObject(_) => {}
        }
    }

    // Interface membership comes from the implementing side.
    for definition in &document.definitions {
        let Definition::TypeDefinition(TypeDefinition::Object(object)) = definition else {
            continue;
        };
        if !model.entities.contains_key(&object.name) {
            continue;
        }
        for interface in &object.implements_interfaces {
            if let Some(composite) = model.composites.get_mut(interface) {
                composite.members.push(object.name.clone());
            }
        }
    }

    // Second pass: resolve relationship targets and properties types.
    for entity in model.entities.values() {
        for relationship in &entity.relationships {
            let target_exists = model.entities.contains_key(&relationship.target)
                || model.composites.contains_key(&relationship.target);
            if !target_exists {
                errors.push(SchemaError::UnknownRelationshipTarget {
                    type_name: entity.name.clone(),
                    field: relationship.name.clone(),
                    target: relationship.target.clone(),
                });
            }
            if let Some(properties) = &relationship.properties {
                if !model.rel_properties.contains_key(properties) {
                    errors.push(SchemaError::DirectiveShape {
                        directive: "relationship".to_owned(),
                        location: format!("{}.{}", entity.name, relationship.name),
                        reason: format!(
                            "properties type '{properties}' is not declared with @relationshipProperties"
                        ),
                    });
                }
            }
        }
    }

    // Generated-name table with collision detection.
    let mut registry = NameRegistry::new();
    let mut entity_names: Vec<&String> = model.entities.keys().collect();
    entity_names.sort();
    for name in entity_names {
        let entity = &model.entities[name.as_str()];
        for generated in naming::generated_names(name) {
            if let Err(err) = registry.claim(&generated, name) {
                errors.push(err);
            }
        }
        for index in &entity.vector {
            if let Err(err) = registry.claim(&index.query_name, name) {
                errors.push(err);
            }
        }
    }

    if !errors.is_empty() {
        return Err(Error::Schema(SchemaErrors(errors)));
    }

    // Operation bindings, honoring @query/@mutation toggles.
    let query_lookup: rustc_hash::FxHashMap<&str, &QueryAnnotation> = query_toggles
        .iter()
        .map(|(name, annotation)| (name.as_str(), annotation))
        .collect();
    let mutation_lookup: rustc_hash::FxHashMap<&str, &Vec<MutationOp>> = mutation_toggles
        .iter()
        .map(|(name, operations)| (name.as_str(), operations))
        .collect();
    let default_query = QueryAnnotation::default();
    let default_mutations = MutationOp::all();
    let mut bindings: Vec<(String, OperationBinding)> = Vec::new();
    for (name, entity) in &model.entities {
        let query = query_lookup.get(name.as_str()).copied().unwrap_or(&default_query);
        let mutations = mutation_lookup
            .get(name.as_str())
            .copied()
            .unwrap_or(&default_mutations);
        let plural = naming::plural_field(name);
        let plural_upper = naming::plural_type(name);
        if query.read {
            bindings.push((plural.clone(), binding(name, OperationKind::Read)));
            bindings.push((
                format!("{plural}Connection"),
                binding(name, OperationKind::Connection),
            ));
        }
        if query.aggregate {
            bindings.push((
                format!("{plural}Aggregate"),
                binding(name, OperationKind::Aggregate),
            ));
        }
        for op in mutations {
            let (prefix, kind) = match op {
                MutationOp::Create => ("create", OperationKind::Create),
                MutationOp::Update => ("update", OperationKind::Update),
                MutationOp::Delete => ("delete", OperationKind::Delete),
            };
            bindings.push((format!("{prefix}{plural_upper}"), binding(name, kind)));
        }
        for index in &entity.vector {
            bindings.push((
                index.query_name.clone(),
                OperationBinding {
                    entity: name.clone(),
                    kind: OperationKind::VectorRead,
                    vector_index: Some(index.index_name.clone()),
                },
            ));
        }
    }
    for (field, b) in bindings {
        model.operations.insert(field, b);
    }

    debug!(
        entities = model.entities.len(),
        composites = model.composites.len(),
        operations = model.operations.len(),
        "schema model built"
    );
    Ok(model)
}

fn binding(entity: &str, kind: OperationKind) -> OperationBinding {
    OperationBinding {
        entity: entity.to_owned(),
        kind,
        vector_index: None,
    }
}

fn has_directive(directives: &[SdlDirective<'_>], name: &str) -> bool {
    directives.iter().any(|d| d.name == name)
}

fn find_directive<'a, 'd>(
    directives: &'d [SdlDirective<'a>],
    name: &str,
) -> Option<&'d SdlDirective<'a>> {
    directives.iter().find(|d| d.name == name)
}

/// Decomposed GraphQL type shape.
struct TypeShape {
    name: String,
    list: bool,
    required: bool,
    element_required: bool,
}

fn unwrap_type(ty: &Type<'_, String>) -> TypeShape {
    match ty {
        Type::NamedType(name) => TypeShape {
            name: name.clone(),
            list: false,
            required: false,
            element_required: false,
        },
        Type::NonNullType(inner) => {
            let mut shape = unwrap_type(inner);
            if shape.list {
                // NonNull applied outside a list wrapper.
                shape.required = true;
            } else {
                shape.required = true;
                shape.element_required = true;
            }
            shape
        }
        Type::ListType(inner) => {
            let inner_shape = unwrap_type(inner);
            TypeShape {
                name: inner_shape.name,
                list: true,
                required: false,
                element_required: inner_shape.required,
            }
        }
    }
}

fn build_entity(
    name: &str,
    directives: &[SdlDirective<'_>],
    fields: &[SdlField<'_>],
    query_toggles: &mut Vec<(String, QueryAnnotation)>,
    mutation_toggles: &mut Vec<(String, Vec<MutationOp>)>,
    errors: &mut Vec<SchemaError>,
) -> Entity {
    let mut entity = Entity {
        name: name.to_owned(),
        plural: naming::plural_field(name),
        labels: vec![LabelSpec::Literal(name.to_owned())],
        attributes: Vec::new(),
        relationships: Vec::new(),
        authorization: None,
        authentication: false,
        fulltext: Vec::new(),
        vector: Vec::new(),
        subscription_events: Vec::new(),
    };

    for d in directives {
        let result = match d.name.as_str() {
            "node" => directive::parse_node(&d.arguments, name).map(|annotation| {
                if !annotation.labels.is_empty() {
                    entity.labels = annotation.labels;
                }
                entity.labels.extend(annotation.additional_labels);
            }),
            "authorization" => directive::parse_authorization(&d.arguments, name)
                .map(|annotation| entity.authorization = Some(annotation)),
            "authentication" => {
                entity.authentication = true;
                Ok(())
            }
            "fulltext" => directive::parse_fulltext(&d.arguments, name)
                .map(|indexes| entity.fulltext = indexes),
            "vector" => {
                directive::parse_vector(&d.arguments, name).map(|indexes| entity.vector = indexes)
            }
            "query" => directive::parse_query(&d.arguments, name)
                .map(|annotation| query_toggles.push((name.to_owned(), annotation))),
            "mutation" => directive::parse_mutation(&d.arguments, name)
                .map(|operations| mutation_toggles.push((name.to_owned(), operations))),
            "subscription" => directive::parse_subscription(&d.arguments, name)
                .map(|events| entity.subscription_events = events),
            _ => Ok(()),
        };
        if let Err(err) = result {
            errors.push(err);
        }
    }

    let mut seen = rustc_hash::FxHashSet::default();
    for field in fields {
        if !seen.insert(field.name.clone()) {
            errors.push(SchemaError::DuplicateField {
                type_name: name.to_owned(),
                field: field.name.clone(),
            });
            continue;
        }
        if let Some(rel_directive) = find_directive(&field.directives, "relationship") {
            let location = format!("{name}.{}", field.name);
            match directive::parse_relationship(&rel_directive.arguments, &location) {
                Ok(annotation) => {
                    let shape = unwrap_type(&field.field_type);
                    if shape.list && !(shape.required && shape.element_required) {
                        errors.push(SchemaError::UnsupportedListShape {
                            type_name: name.to_owned(),
                            field: field.name.clone(),
                        });
                    }
                    entity.relationships.push(Relationship {
                        name: field.name.clone(),
                        rel_type: annotation.rel_type,
                        direction: annotation.direction,
                        target: shape.name,
                        list: shape.list,
                        required: !shape.list && shape.required,
                        properties: annotation.properties,
                        nested_operations: annotation.nested_operations,
                    });
                }
                Err(err) => errors.push(err),
            }
        } else if let Some(attribute) = build_attribute(name, field, false, errors) {
            entity.attributes.push(attribute);
        }
    }

    entity
}

fn build_attributes(
    type_name: &str,
    fields: &[SdlField<'_>],
    edge_properties: bool,
    errors: &mut Vec<SchemaError>,
) -> Vec<Attribute> {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut attributes = Vec::new();
    for field in fields {
        if !seen.insert(field.name.clone()) {
            errors.push(SchemaError::DuplicateField {
                type_name: type_name.to_owned(),
                field: field.name.clone(),
            });
            continue;
        }
        if edge_properties && has_directive(&field.directives, "relationship") {
            errors.push(SchemaError::DirectiveShape {
                directive: "relationship".to_owned(),
                location: format!("{type_name}.{}", field.name),
                reason: "relationship fields are not allowed on @relationshipProperties types"
                    .to_owned(),
            });
            continue;
        }
        if let Some(attribute) = build_attribute(type_name, field, edge_properties, errors) {
            attributes.push(attribute);
        }
    }
    attributes
}

fn build_attribute(
    type_name: &str,
    field: &SdlField<'_>,
    edge_properties: bool,
    errors: &mut Vec<SchemaError>,
) -> Option<Attribute> {
    let location = format!("{type_name}.{}", field.name);
    let shape = unwrap_type(&field.field_type);
    if shape.list && !(shape.required && shape.element_required) {
        errors.push(SchemaError::UnsupportedListShape {
            type_name: type_name.to_owned(),
            field: field.name.clone(),
        });
    }

    let mut attribute = Attribute {
        name: field.name.clone(),
        type_name: shape.name,
        list: shape.list,
        required: shape.required,
        property: field.name.clone(),
        id: false,
        unique: false,
        default: None,
        computed: None,
        timestamp: None,
        settable: SettableAnnotation::default(),
        cypher: None,
        private: false,
    };

    let mut failed = false;
    for d in &field.directives {
        let result = match d.name.as_str() {
            "id" => {
                attribute.id = true;
                attribute.unique = true;
                Ok(())
            }
            "unique" => {
                attribute.unique = true;
                Ok(())
            }
            "alias" => directive::parse_alias(&d.arguments, &location)
                .map(|property| attribute.property = property),
            "default" => directive::parse_default(&d.arguments, &location)
                .map(|value| attribute.default = Some(value)),
            "computed" => directive::parse_computed(&d.arguments, &location)
                .map(|from| attribute.computed = Some(from)),
            "cypher" => directive::parse_cypher(&d.arguments, &location)
                .map(|annotation| attribute.cypher = Some(annotation)),
            "timestamp" => directive::parse_timestamp(&d.arguments, &location)
                .map(|operations| attribute.timestamp = Some(operations)),
            "settable" => directive::parse_settable(&d.arguments, &location)
                .map(|annotation| attribute.settable = annotation),
            "private" => {
                attribute.private = true;
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            errors.push(err);
            failed = true;
        }
    }

    if attribute.cypher.is_some() {
        if attribute.property != attribute.name {
            errors.push(SchemaError::MutuallyExclusive {
                location: location.clone(),
                first: "@cypher",
                second: "@alias",
            });
            failed = true;
        }
        if attribute.default.is_some() {
            errors.push(SchemaError::MutuallyExclusive {
                location: location.clone(),
                first: "@cypher",
                second: "@default",
            });
            failed = true;
        }
    }
    if attribute.computed.is_some() && attribute.default.is_some() {
        errors.push(SchemaError::MutuallyExclusive {
            location: location.clone(),
            first: "@computed",
            second: "@default",
        });
        failed = true;
    }
    if edge_properties && attribute.cypher.is_some() {
        errors.push(SchemaError::DirectiveShape {
            directive: "cypher".to_owned(),
            location,
            reason: "@cypher fields are not allowed on @relationshipProperties types".to_owned(),
        });
        failed = true;
    }

    if failed {
        None
    } else {
        Some(attribute)
    }
}

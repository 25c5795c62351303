//! Immutable schema model: entities, attributes, relationships, and the
//! generated-operation table.
//!
//! Entities reference each other only by name; relationship targets are
//! validated during the build's second pass and resolved through the model
//! registry at translation time, which keeps the Entity↔Relationship cycle
//! out of the object graph entirely. A built model is frozen: a schema
//! reload produces a brand-new model value.

use rustc_hash::FxHashMap;

use super::directive::{
    AuthorizationAnnotation, CypherAnnotation, DefaultValue, FulltextIndex, LabelSpec,
    NestedOperation, RelDirection, SettableAnnotation, TimestampOp, VectorIndex,
};
use crate::context::RequestContext;
use crate::error::TranslateError;

/// A stored (or computed) field of an entity.
#[derive(Clone, Debug)]
pub struct Attribute {
    /// GraphQL field name, unique within the entity.
    pub name: String,
    /// GraphQL scalar/enum type name.
    pub type_name: String,
    /// List-valued field.
    pub list: bool,
    /// Non-nullable field.
    pub required: bool,
    /// Database property name; differs from `name` under `@alias`.
    pub property: String,
    /// `@id` marker.
    pub id: bool,
    /// `@unique` marker.
    pub unique: bool,
    /// `@default` spec applied when a create omits the attribute.
    pub default: Option<DefaultValue>,
    /// `@computed(from:)` dependencies; a computed attribute is not stored.
    pub computed: Option<Vec<String>>,
    /// `@timestamp` phases stamped server-side.
    pub timestamp: Option<Vec<TimestampOp>>,
    /// `@settable` visibility for mutation input.
    pub settable: SettableAnnotation,
    /// `@cypher` backing fragment, if this is a raw-Cypher field.
    pub cypher: Option<CypherAnnotation>,
    /// `@private` — invisible to the whole API surface.
    pub private: bool,
}

impl Attribute {
    /// True when the attribute is a plain stored property (not computed,
    /// not `@cypher`-backed).
    pub fn is_stored(&self) -> bool {
        self.computed.is_none() && self.cypher.is_none()
    }

    /// True when the attribute's GraphQL type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self.type_name.as_str(), "Int" | "Float" | "BigInt")
    }

    /// True when the attribute's GraphQL type is string-like.
    pub fn is_string(&self) -> bool {
        matches!(self.type_name.as_str(), "String" | "ID")
    }
}

/// A relationship field of an entity.
#[derive(Clone, Debug)]
pub struct Relationship {
    /// GraphQL field name.
    pub name: String,
    /// Relationship type label.
    pub rel_type: String,
    /// Direction relative to the declaring entity.
    pub direction: RelDirection,
    /// Target type name: a concrete entity, interface, or union. Resolved
    /// through the model registry, never held as an object reference.
    pub target: String,
    /// List cardinality (`[Person!]!` vs `Person`).
    pub list: bool,
    /// Required singular relationship (`Person!`).
    pub required: bool,
    /// Relationship-properties type name, if edge attributes exist.
    pub properties: Option<String>,
    /// Whitelisted nested mutation steps.
    pub nested_operations: Vec<NestedOperation>,
}

impl Relationship {
    /// True when `operation` is whitelisted for this relationship.
    pub fn allows(&self, operation: NestedOperation) -> bool {
        self.nested_operations.contains(&operation)
    }
}

/// A node type built from the annotated schema.
#[derive(Clone, Debug)]
pub struct Entity {
    /// Type name.
    pub name: String,
    /// Camel-cased plural used in generated operation names.
    pub plural: String,
    /// Labels; defaults to `[name]` without `@node(labels:)`.
    pub labels: Vec<LabelSpec>,
    /// Ordered attribute list.
    pub attributes: Vec<Attribute>,
    /// Relationship fields.
    pub relationships: Vec<Relationship>,
    /// `@authorization` rules.
    pub authorization: Option<AuthorizationAnnotation>,
    /// `@authentication` — every operation requires a decoded JWT.
    pub authentication: bool,
    /// `@fulltext` index declarations.
    pub fulltext: Vec<FulltextIndex>,
    /// `@vector` index declarations.
    pub vector: Vec<VectorIndex>,
    /// `@subscription(events:)` — stored for the external transport.
    pub subscription_events: Vec<String>,
}

impl Entity {
    /// Looks up a visible attribute by GraphQL name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name && !attr.private)
    }

    /// Looks up a relationship by field name.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|rel| rel.name == name)
    }

    /// Resolves the entity's labels against the request context, escaping
    /// deferred to the Cypher builder.
    pub fn resolve_labels(&self, ctx: &RequestContext) -> Result<Vec<String>, TranslateError> {
        self.labels
            .iter()
            .map(|label| match label {
                LabelSpec::Literal(text) => Ok(text.clone()),
                LabelSpec::Template(template) => ctx
                    .resolve(template)
                    .and_then(|value| value.as_str().map(str::to_owned))
                    .ok_or_else(|| TranslateError::UnresolvedTemplate {
                        token: template.token(),
                    }),
            })
            .collect()
    }

    /// The fulltext index with the given name, if declared.
    pub fn fulltext_index(&self, name: &str) -> Option<&FulltextIndex> {
        self.fulltext.iter().find(|index| index.name == name)
    }
}

/// Interface or union over concrete entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeKind {
    /// GraphQL interface; members share the declared fields.
    Interface,
    /// GraphQL union; members share nothing.
    Union,
}

/// An abstract (interface/union) relationship target.
#[derive(Clone, Debug)]
pub struct CompositeEntity {
    /// Type name.
    pub name: String,
    /// Interface or union.
    pub kind: CompositeKind,
    /// Concrete member entity names, in declaration order.
    pub members: Vec<String>,
    /// Fields declared on the interface itself (empty for unions).
    pub shared_fields: Vec<String>,
}

/// Descriptor for edge attributes (`@relationshipProperties` types).
#[derive(Clone, Debug)]
pub struct RelationshipProperties {
    /// Type name.
    pub name: String,
    /// Edge attributes.
    pub attributes: Vec<Attribute>,
}

impl RelationshipProperties {
    /// Looks up an edge attribute by GraphQL name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name && !attr.private)
    }
}

/// Kind of a generated root operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Plural read field.
    Read,
    /// Relay-style connection field.
    Connection,
    /// Aggregate field.
    Aggregate,
    /// `create<Plural>` mutation.
    Create,
    /// `update<Plural>` mutation.
    Update,
    /// `delete<Plural>` mutation.
    Delete,
    /// `@vector(queryName:)` generated read field.
    VectorRead,
}

impl OperationKind {
    /// True for the mutation kinds.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            OperationKind::Create | OperationKind::Update | OperationKind::Delete
        )
    }
}

/// Binding from a generated root field to its entity and kind.
#[derive(Clone, Debug)]
pub struct OperationBinding {
    /// Entity the operation targets.
    pub entity: String,
    /// What the operation does.
    pub kind: OperationKind,
    /// For [`OperationKind::VectorRead`], the backing index name.
    pub vector_index: Option<String>,
}

/// The immutable executable schema model.
///
/// Built once, shared read-only by every request; nothing ever mutates it
/// in place.
#[derive(Clone, Debug, Default)]
pub struct SchemaModel {
    pub(crate) entities: FxHashMap<String, Entity>,
    pub(crate) composites: FxHashMap<String, CompositeEntity>,
    pub(crate) rel_properties: FxHashMap<String, RelationshipProperties>,
    pub(crate) operations: FxHashMap<String, OperationBinding>,
}

impl SchemaModel {
    /// Looks up a concrete entity by type name.
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Looks up an interface/union by type name.
    pub fn composite(&self, name: &str) -> Option<&CompositeEntity> {
        self.composites.get(name)
    }

    /// Looks up a relationship-properties descriptor by type name.
    pub fn relationship_properties(&self, name: &str) -> Option<&RelationshipProperties> {
        self.rel_properties.get(name)
    }

    /// Resolves a generated root field name to its binding.
    pub fn operation(&self, field: &str) -> Option<&OperationBinding> {
        self.operations.get(field)
    }

    /// Number of declared concrete entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}
